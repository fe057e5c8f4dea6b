// src/services/source.rs

//! The external harvesting capability.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Credential, RawRecord, TimelinePage};

/// Platform access used by the reconciliation engine.
///
/// `authenticate` takes `&mut self`, so switching identity can never overlap
/// a call that is still in flight under the previous one.
#[async_trait]
pub trait HarvestSource: Send + Sync {
    /// Switch the identity used by subsequent calls.
    fn authenticate(&mut self, credential: &Credential) -> Result<()>;

    /// Fetch one page of the subject's timeline starting at `cursor`
    /// (empty for the newest page).
    async fn timeline_page(&self, subject: &str, cursor: &str, count: usize)
    -> Result<TimelinePage>;

    /// Fetch a conversation with its ordered member list.
    async fn thread_detail(&self, conversation_id: &str) -> Result<RawRecord>;
}
