//! Tracing subscriber setup.

#[cfg(feature = "tui")]
use anyhow::{Context, Result};
#[cfg(feature = "tui")]
use std::path::Path;
#[cfg(feature = "tui")]
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tui")]
const LOG_FILE: &str = "papers-please.log";

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log to stderr for headless runs.
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Log to a file under `data_dir` so the alternate screen stays clean.
#[cfg(feature = "tui")]
pub fn init_file(data_dir: &Path) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create {}", data_dir.display()))?;
    let path = data_dir.join(LOG_FILE);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("info"))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(path)
}
