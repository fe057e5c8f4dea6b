// src/services/tracker.rs

//! Per-run deduplication of emitted posts and threads.
//!
//! Scoped to one subject and one run; nothing is persisted. Resuming from a
//! cursor avoids re-fetching old pages but a fresh tracker may re-emit posts
//! that an earlier run already wrote.

use std::collections::HashSet;

/// Remembers which post IDs and conversation IDs have been emitted.
#[derive(Debug, Clone, Default)]
pub struct DedupTracker {
    subject: String,
    posts: HashSet<String>,
    threads: HashSet<String>,
}

impl DedupTracker {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn is_post(&self, id: &str) -> bool {
        self.posts.contains(id)
    }

    pub fn is_thread(&self, conversation_id: &str) -> bool {
        self.threads.contains(conversation_id)
    }

    pub fn mark_post(&mut self, id: &str) {
        self.posts.insert(id.to_string());
    }

    /// Mark a resolved thread: the root and every member become processed
    /// posts and the root becomes a processed thread.
    pub fn mark_thread<I, S>(&mut self, root_id: &str, member_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.threads.insert(root_id.to_string());
        self.posts.insert(root_id.to_string());
        self.posts.extend(member_ids.into_iter().map(Into::into));
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Processed post IDs, sorted.
    pub fn posts(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.posts.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Processed conversation IDs, sorted.
    pub fn threads(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.threads.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
