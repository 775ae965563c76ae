use std::path::PathBuf;

use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

const BASENAME: &str = "narrator";

/// Starts file logging under `logs/` once per process. `RUST_LOG` overrides
/// `default_spec`; info lines are mirrored to stderr.
pub fn init(default_spec: &str) -> anyhow::Result<()> {
    LOGGER.get_or_try_init(|| -> anyhow::Result<()> {
        let log_dir = log_dir();
        std::fs::create_dir_all(&log_dir)?;
        Logger::try_with_env_or_str(default_spec)?
            .duplicate_to_stderr(Duplicate::Info)
            .log_to_file(
                FileSpec::default()
                    .directory(&log_dir)
                    .basename(BASENAME)
                    .suffix("log")
                    .suppress_timestamp(),
            )
            .rotate(
                Criterion::AgeOrSize(Age::Day, 10_000_000),
                Naming::Numbers,
                Cleanup::KeepLogFiles(7),
            )
            .start()?;
        Ok(())
    })?;
    Ok(())
}

/// The file currently written to. Rotation renames it to
/// `narrator_r00000.log`, `narrator_r00001.log` and so on.
pub fn current_log_file() -> PathBuf {
    log_dir().join(format!("{BASENAME}_rCURRENT.log"))
}

fn log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn logs_land_in_current_file() {
        let temp = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp.path()).unwrap();
        let started = init("info");
        log::warn!("logging smoke line");
        std::env::set_current_dir(original_dir).unwrap();

        started.unwrap();
        assert!(temp.path().join(current_log_file()).exists());
    }
}
