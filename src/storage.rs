//! Durable storage for the cached rendering and export helpers.

use crate::model::AnalysisResponse;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "papers-please";

/// Default data directory (`<data_local_dir>/papers-please`).
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

/// Synchronous key-value store for text blobs.
pub trait RenderingStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, text: &str) -> Result<()>;
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl RenderingStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Write to a sibling temp file and rename it over the slot, so a reader sees
    /// either the old blob or the new one.
    fn save(&self, key: &str, text: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        std::fs::write(&tmp, text).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

pub fn export_json(path: &Path, response: &AnalysisResponse) -> Result<()> {
    let json = serde_json::to_string_pretty(response).context("serialize response")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

pub fn export_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))
}
