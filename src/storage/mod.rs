//! Storage abstractions for harvest state and artifacts.
//!
//! ## Directory Structure
//!
//! ```text
//! ./
//! ├── cursors.json                          # Resumption tokens per subject
//! ├── json/
//! │   └── posts_{subject}_{stamp}.json      # Ordered output units
//! └── scrape_logs/
//!     └── stats_{subject}_{stamp}.txt       # Run statistics
//! ```

pub mod cursor;
pub mod local;

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::OutputUnit;

// Re-export for convenience
pub use cursor::{CursorBook, FileCursorStore};
pub use local::LocalStorage;

/// Persists one opaque resumption token per subject.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last saved token for `subject`, or an empty string when none exists.
    async fn load(&self, subject: &str) -> Result<String>;

    /// Durably replace the token for `subject`.
    async fn save(&self, subject: &str, token: &str) -> Result<()>;
}

/// Writes the per-run output and statistics artifacts.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Write the ordered units; returns the artifact location.
    async fn write_units(&self, subject: &str, stamp: &str, units: &[OutputUnit])
    -> Result<String>;

    /// Write the human-readable statistics report; returns its location.
    async fn write_stats(&self, subject: &str, stamp: &str, report: &str) -> Result<String>;
}

/// Write bytes atomically (write to temp, then rename).
///
/// A failed write leaves any previous file at `path` untouched.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let context = path.display().to_string();
    let wrap = |e: std::io::Error| AppError::persistence(context.clone(), e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await.map_err(wrap)?;
    file.write_all(bytes).await.map_err(wrap)?;
    file.sync_all().await.map_err(wrap)?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(wrap)?;
    Ok(())
}
