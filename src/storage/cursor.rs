//! File-backed cursor store.
//!
//! The file is a pretty-printed JSON object mapping subject to token. A
//! missing file is a valid, empty initial state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::storage::{CursorStore, write_atomic};

/// Subject → opaque resumption token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorBook(BTreeMap<String, String>);

impl CursorBook {
    /// Token for `subject`, empty when absent.
    pub fn get(&self, subject: &str) -> &str {
        self.0.get(subject).map(String::as_str).unwrap_or("")
    }

    /// Set the token; an empty token removes the entry.
    pub fn set(&mut self, subject: &str, token: &str) {
        if token.is_empty() {
            self.0.remove(subject);
        } else {
            self.0.insert(subject.to_string(), token.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Cursor store persisted as a single JSON document.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole book, treating a missing file as empty.
    pub async fn load_book(&self) -> Result<CursorBook> {
        let context = self.path.display().to_string();
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CursorBook::default()),
            Err(e) => return Err(AppError::persistence(context, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(CursorBook::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::persistence(context, format!("corrupt cursor file: {e}")))
    }

    async fn store_book(&self, book: &CursorBook) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(book)?;
        write_atomic(&self.path, &bytes).await
    }

    /// Forget the token for `subject`.
    pub async fn clear(&self, subject: &str) -> Result<()> {
        let mut book = self.load_book().await?;
        book.set(subject, "");
        self.store_book(&book).await
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self, subject: &str) -> Result<String> {
        Ok(self.load_book().await?.get(subject).to_string())
    }

    async fn save(&self, subject: &str, token: &str) -> Result<()> {
        let mut book = self.load_book().await?;
        book.set(subject, token);
        self.store_book(&book).await?;
        log::debug!("Saved cursor for {} to {}", subject, self.path.display());
        Ok(())
    }
}
