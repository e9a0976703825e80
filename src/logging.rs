use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Routes tracing output to the configured log file. The terminal belongs to
/// the UI, so nothing is written to stdout or stderr. `RUST_LOG` wins over
/// the configured level.
pub fn init(config: &LogConfig) -> Result<Option<PathBuf>> {
    let Some(path) = config.file.clone() else {
        return Ok(None);
    };
    let file = open_log_file(&path)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("logging: {err}"))?;

    tracing::info!(
        version = crate::VERSION,
        file = %path.display(),
        "logging initialized"
    );
    Ok(Some(path))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("logging: failed to open {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn disabled_without_file() {
        let config = LogConfig {
            level: "debug".into(),
            file: None,
        };
        assert_eq!(init(&config).unwrap(), None);
    }

    #[test]
    fn log_file_and_parents_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("booru-view.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
