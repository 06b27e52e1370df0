//! Report persistence to the local filesystem

use std::path::{Path, PathBuf};

use research_assistant_sdk::async_trait;
use tokio::fs;

use crate::research::backend::ReportSink;
use crate::research::error::{ResearchError, Result};

/// Writes reports as UTF-8 files, relative destinations resolved against `root`
#[derive(Debug, Clone, Default)]
pub struct FileSink {
    root: Option<PathBuf>,
}

impl FileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, destination: &str) -> PathBuf {
        let path = Path::new(destination);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn save(&self, report: &str, destination: &str) -> Result<()> {
        let path = self.resolve(destination);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                ResearchError::Persistence(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        fs::write(&path, report.as_bytes()).await.map_err(|e| {
            ResearchError::Persistence(format!("failed to write {}: {}", path.display(), e))
        })
    }
}
