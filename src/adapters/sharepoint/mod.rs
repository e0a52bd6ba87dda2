//! Export handoff targets
//!
//! Finalized CSV files can be handed off to a delivery point after a job
//! completes. The only built-in target copies files into a watched drop
//! directory that an external sync agent picks up.

use crate::domain::{MeridianError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Destination for finalized export files
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Delivers a finalized file. The source file is left in place.
    async fn deliver(&self, file: &Path) -> Result<()>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Copies finalized exports into a local drop directory
pub struct LocalDropTarget {
    directory: PathBuf,
}

impl LocalDropTarget {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl UploadTarget for LocalDropTarget {
    async fn deliver(&self, file: &Path) -> Result<()> {
        let name = file.file_name().ok_or_else(|| {
            MeridianError::Export(format!("Invalid export path: {}", file.display()))
        })?;

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| {
                MeridianError::Export(format!(
                    "Failed to create drop directory '{}': {e}",
                    self.directory.display()
                ))
            })?;

        let dest = self.directory.join(name);
        tokio::fs::copy(file, &dest).await.map_err(|e| {
            MeridianError::Export(format!(
                "Failed to deliver '{}' to '{}': {e}",
                file.display(),
                dest.display()
            ))
        })?;

        tracing::info!(
            file = %file.display(),
            dest = %dest.display(),
            "Delivered export to drop directory"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("drop directory '{}'", self.directory.display())
    }
}
