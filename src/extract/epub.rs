use std::io::{Cursor, Read};

use log::debug;
use roxmltree::ParsingOptions;
use zip::ZipArchive;

use super::{markup, ExtractError, FragmentSource};
use crate::document::{Document, DocumentFormat};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const DOCUMENT_MEDIA_TYPE: &str = "application/xhtml+xml";

/// One fragment per content document, in manifest order. Navigation
/// documents are skipped.
pub struct EpubSource;

impl FragmentSource for EpubSource {
    fn fragments(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        let mut archive = ZipArchive::new(Cursor::new(document.bytes()))
            .map_err(|err| ExtractError::parse(DocumentFormat::Epub, err))?;

        let container = read_utf8(&mut archive, CONTAINER_PATH)?;
        let opf_path = rootfile_path(&container)?;
        let opf = read_utf8(&mut archive, &opf_path)?;
        let base_dir = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        let hrefs = document_hrefs(&opf)?;
        debug!("{} lists {} content documents", document.name(), hrefs.len());

        let mut fragments = Vec::with_capacity(hrefs.len());
        for href in hrefs {
            let path = resolve_href(base_dir, &href);
            let xhtml = read_utf8(&mut archive, &path)?;
            fragments.push(markup::visible_text(&xhtml));
        }
        Ok(fragments)
    }
}

fn read_utf8(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, ExtractError> {
    let mut entry = archive.by_name(name).map_err(|err| {
        ExtractError::with_details(DocumentFormat::Epub, format!("missing entry {name}"), err.to_string())
    })?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|err| ExtractError::parse(DocumentFormat::Epub, err))?;
    String::from_utf8(bytes).map_err(|err| {
        ExtractError::with_details(
            DocumentFormat::Epub,
            format!("{name} is not valid UTF-8"),
            err.to_string(),
        )
    })
}

fn parse_xml(source: &str) -> Result<roxmltree::Document<'_>, ExtractError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(source, options)
        .map_err(|err| ExtractError::parse(DocumentFormat::Epub, err))
}

fn rootfile_path(container: &str) -> Result<String, ExtractError> {
    let xml = parse_xml(container)?;
    xml.descendants()
        .find(|node| node.has_tag_name("rootfile"))
        .and_then(|node| node.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| {
            ExtractError::parse(DocumentFormat::Epub, "container.xml does not name a package document")
        })
}

fn document_hrefs(opf: &str) -> Result<Vec<String>, ExtractError> {
    let xml = parse_xml(opf)?;
    let manifest = xml
        .descendants()
        .find(|node| node.has_tag_name("manifest"))
        .ok_or_else(|| ExtractError::parse(DocumentFormat::Epub, "package document has no manifest"))?;

    Ok(manifest
        .children()
        .filter(|node| node.has_tag_name("item"))
        .filter(|item| item.attribute("media-type") == Some(DOCUMENT_MEDIA_TYPE))
        .filter(|item| {
            !item
                .attribute("properties")
                .map(|props| props.split_whitespace().any(|prop| prop == "nav"))
                .unwrap_or(false)
        })
        .filter_map(|item| item.attribute("href"))
        .map(str::to_string)
        .collect())
}

fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut parts: Vec<&str> = base_dir.split('/').filter(|part| !part.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/").replace("%20", " ")
}
