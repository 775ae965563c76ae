use std::{
    io::Write,
    process::Command,
};

use log::{error, info};
use serde::Deserialize;
use shlex::Shlex;

use super::{ExtractError, FragmentSource};
use crate::document::{Document, DocumentFormat};

pub const ERROR_IMPORTER_FAILED: &str = "IMPORTER_FAILED";

/// Delegates extraction to a helper process.
///
/// The command line is split with shell rules and the path of a temporary
/// copy of the payload is appended as the last argument. The helper prints
/// `{"ok": true, "pages": [{"text": "..."}]}` on success or
/// `{"ok": false, "code": "...", "message": "..."}` on failure. The temporary
/// copy is removed when extraction returns, whatever the outcome.
pub struct ExternalImporter {
    format: DocumentFormat,
    command: String,
}

#[derive(Debug, Deserialize)]
struct ImporterOutput {
    ok: bool,
    #[serde(default)]
    pages: Vec<ImportedPage>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportedPage {
    #[serde(default)]
    text: String,
}

impl ExternalImporter {
    pub fn new(format: DocumentFormat, command: impl Into<String>) -> Self {
        Self {
            format,
            command: command.into(),
        }
    }

    fn build_command(&self) -> Result<Command, ExtractError> {
        let mut parts: Vec<String> = Shlex::new(&self.command).collect();
        if parts.is_empty() {
            return Err(ExtractError::parse(self.format, "importer command is empty"));
        }
        let mut command = Command::new(parts.remove(0));
        command.args(parts);
        Ok(command)
    }
}

impl FragmentSource for ExternalImporter {
    fn fragments(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        let mut command = self.build_command()?;

        let mut payload = tempfile::Builder::new()
            .prefix("narrator-upload-")
            .suffix(&format!(".{}", self.format.extension()))
            .tempfile()
            .map_err(|err| ExtractError::parse(self.format, err))?;
        payload
            .write_all(document.bytes())
            .and_then(|_| payload.flush())
            .map_err(|err| ExtractError::parse(self.format, err))?;

        info!("Running importer '{}' on {}", self.command, document.name());
        let output = command.arg(payload.path()).output().map_err(|err| {
            error!("Could not launch importer '{}': {err}", self.command);
            ExtractError::with_details(self.format, "failed to launch importer", err.to_string())
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Importer exited with {}: {stderr}", output.status);
            return Err(ExtractError::with_details(
                self.format,
                format!("importer exited with {}", output.status),
                stderr,
            ));
        }

        let parsed: ImporterOutput = serde_json::from_slice(&output.stdout).map_err(|err| {
            ExtractError::with_details(self.format, "importer printed invalid JSON", err.to_string())
        })?;
        if !parsed.ok {
            return Err(ExtractError::with_details(
                self.format,
                parsed
                    .message
                    .unwrap_or_else(|| "importer reported a failure".to_string()),
                parsed
                    .code
                    .unwrap_or_else(|| ERROR_IMPORTER_FAILED.to_string()),
            ));
        }

        Ok(parsed.pages.into_iter().map(|page| page.text).collect())
    }
}
