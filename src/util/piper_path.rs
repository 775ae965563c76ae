use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use shlex::Shlex;
use thiserror::Error;

/// How the Piper engine is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PiperCommand {
    /// A user supplied command line, already split into words.
    Configured(Vec<String>),
    Executable(PathBuf),
    PythonModule,
}

#[derive(Debug, Error)]
pub enum PiperPathError {
    #[error("the configured Piper command is empty")]
    EmptyCommand,
    #[error("no piper binary in {0} and python is not on PATH to run 'python -m piper'")]
    Unavailable(PathBuf),
}

/// Resolution order: configured command line, bundled binary under
/// `<runtime>/piper/`, then `python -m piper`.
pub fn resolve(configured: Option<&str>, runtime_dir: &Path) -> Result<PiperCommand, PiperPathError> {
    if let Some(raw) = configured {
        let parts: Vec<String> = Shlex::new(raw).collect();
        if parts.is_empty() {
            return Err(PiperPathError::EmptyCommand);
        }
        return Ok(PiperCommand::Configured(parts));
    }

    let candidate =
        runtime_dir
            .join("piper")
            .join(if cfg!(windows) { "piper.exe" } else { "piper" });
    if candidate.exists() {
        return Ok(PiperCommand::Executable(candidate));
    }

    if which::which("python").is_ok() || which::which("python3").is_ok() {
        return Ok(PiperCommand::PythonModule);
    }

    Err(PiperPathError::Unavailable(runtime_dir.join("piper")))
}

pub fn command_to_args(cmd: &PiperCommand) -> (OsString, Vec<OsString>) {
    match cmd {
        PiperCommand::Configured(parts) => {
            let mut words = parts.iter().map(OsString::from);
            let program = words.next().unwrap_or_default();
            (program, words.collect())
        }
        PiperCommand::Executable(path) => (path.as_os_str().into(), vec![]),
        PiperCommand::PythonModule => {
            let python = if which::which("python").is_ok() { "python" } else { "python3" };
            (OsString::from(python), vec!["-m".into(), "piper".into()])
        }
    }
}
