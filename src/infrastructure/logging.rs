use crate::infrastructure::error::InfraError;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const COMMAND_LOG_FILE: &str = "commands.log";
const DEFAULT_FILTER: &str = "info";

pub fn init_logging(logs_dir: &Path) -> Result<PathBuf, InfraError> {
    fs::create_dir_all(logs_dir)?;
    let path = logs_dir.join(COMMAND_LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .try_init();
    if installed.is_err() {
        tracing::debug!(path = %path.display(), "log subscriber already installed");
    }
    Ok(path)
}
