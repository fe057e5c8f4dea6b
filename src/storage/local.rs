//! Local filesystem artifact storage.
//!
//! ## Storage Layout
//!
//! ```text
//! {output_dir}/posts_{subject}_{stamp}.json   # Ordered output units
//! {stats_dir}/stats_{subject}_{stamp}.txt     # Run statistics
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{OutputUnit, PathsConfig};
use crate::storage::{ArtifactStorage, write_atomic};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    output_dir: PathBuf,
    stats_dir: PathBuf,
}

impl LocalStorage {
    /// Create a LocalStorage writing into the given directories.
    pub fn new(output_dir: impl Into<PathBuf>, stats_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stats_dir: stats_dir.into(),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(&paths.output_dir, &paths.stats_dir)
    }

    /// Output artifact path for a run.
    pub fn units_path(&self, subject: &str, stamp: &str) -> PathBuf {
        self.output_dir
            .join(format!("posts_{}_{}.json", sanitize(subject), stamp))
    }

    /// Statistics report path for a run.
    pub fn stats_path(&self, subject: &str, stamp: &str) -> PathBuf {
        self.stats_dir
            .join(format!("stats_{}_{}.txt", sanitize(subject), stamp))
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(path, &bytes).await
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn write_units(
        &self,
        subject: &str,
        stamp: &str,
        units: &[OutputUnit],
    ) -> Result<String> {
        let path = self.units_path(subject, stamp);
        self.write_json(&path, units).await?;
        log::info!("{} units written to {}", units.len(), path.display());
        Ok(path.display().to_string())
    }

    async fn write_stats(&self, subject: &str, stamp: &str, report: &str) -> Result<String> {
        let path = self.stats_path(subject, stamp);
        write_atomic(&path, report.as_bytes()).await?;
        Ok(path.display().to_string())
    }
}

/// Keep subject names safe for use inside a file name.
fn sanitize(subject: &str) -> String {
    subject
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
