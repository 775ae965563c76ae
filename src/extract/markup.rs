//! Reduces (X)HTML content documents to the text a listener should hear.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Node, ParsingOptions};

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "td", "blockquote",
    "section", "article", "pre", "dt", "dd",
];

const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "title"];

static HIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<head\b.*?</head>|<script\b.*?</script>|<style\b.*?</style>|<!--.*?-->")
        .expect("valid regex")
});
static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|br|h[1-6]|li|tr|td|blockquote|section|article|pre|dt|dd)\b[^>]*>")
        .expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([A-Za-z][A-Za-z0-9]{1,7}));")
        .expect("valid regex")
});

/// Visible body text of a markup document with whitespace collapsed.
///
/// Well-formed XHTML is walked as a tree. Anything the XML parser rejects
/// (MOBI record text, sloppy HTML) goes through a tag-stripping fallback.
pub fn visible_text(markup: &str) -> String {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let raw = match roxmltree::Document::parse_with_options(markup, options) {
        Ok(document) => {
            let root = document
                .descendants()
                .find(|node| node.is_element() && node.tag_name().name() == "body")
                .unwrap_or_else(|| document.root());
            let mut out = String::new();
            push_text(root, &mut out);
            out
        }
        Err(err) => {
            debug!("Markup is not well-formed XML ({err}), stripping tags");
            strip_tags(markup)
        }
    };
    collapse_whitespace(&raw)
}

fn push_text(node: Node<'_, '_>, out: &mut String) {
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or_default());
        } else if child.is_element() {
            let name = child.tag_name().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push(' ');
            }
            push_text(child, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn strip_tags(markup: &str) -> String {
    let visible = HIDDEN_RE.replace_all(markup, " ");
    let spaced = BLOCK_TAG_RE.replace_all(&visible, " ");
    let text = TAG_RE.replace_all(&spaced, "");
    decode_entities(&text)
}

/// Decodes numeric character references and common named entities in a
/// single pass. Unknown names are left as written.
fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let decoded = if let Some(decimal) = caps.get(1) {
                decimal.as_str().parse().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|name| named_entity(name.as_str()))
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let decoded = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "copy" => '\u{a9}',
        _ => return None,
    };
    Some(decoded)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_body_text_only() {
        let xhtml = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
  <head><title>Chapter</title><style>p { color: red }</style></head>
  <body>
    <h1>One</h1>
    <p>First <em>line</em>.</p><p>Second</p>
  </body>
</html>"#;
        assert_eq!(visible_text(xhtml), "One First line. Second");
    }

    #[test]
    fn falls_back_for_html_soup() {
        let html = "<html><head><title>x</title></head><body><p>Tom &amp; Jerry<br>ran<mbp:pagebreak/></p><p>away</body>";
        assert_eq!(visible_text(html), "Tom & Jerry ran away");
    }

    #[test]
    fn fallback_decodes_character_references() {
        let html = "<p>It&#8217;s late&#x2026; she said &ldquo;go&rdquo; &mdash; then left</p><p>&amp;lt; stays &foo; &#xD800;</p>";
        assert_eq!(
            visible_text(html),
            "It\u{2019}s late\u{2026} she said \u{201c}go\u{201d} \u{2014} then left &lt; stays &foo; &#xD800;"
        );
    }

    #[test]
    fn plain_fragment_without_markup() {
        assert_eq!(visible_text("  just   words \n here "), "just words here");
    }
}
