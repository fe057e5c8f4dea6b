// src/pipeline/stream.rs

//! Paged timeline stream with delayed cursor commit.
//!
//! The stream hands out buffered records one at a time. A page's
//! continuation token only becomes the committed cursor once every record of
//! that page has been handed out and the next one is asked for, so a run that
//! stops mid-page resumes from the start of that page.

use std::collections::VecDeque;

use crate::models::{RawRecord, TimelinePage};

#[derive(Debug)]
pub struct TimelineStream {
    subject: String,
    page_size: usize,
    buffer: VecDeque<RawRecord>,
    committed: String,
    pending: Option<String>,
    has_more: bool,
    pages: usize,
}

impl TimelineStream {
    pub fn new(subject: impl Into<String>, start_cursor: impl Into<String>, page_size: usize) -> Self {
        Self {
            subject: subject.into(),
            page_size,
            buffer: VecDeque::new(),
            committed: start_cursor.into(),
            pending: None,
            has_more: true,
            pages: 0,
        }
    }

    /// Next buffered record.
    ///
    /// Returns `None` when the buffer is drained, committing the cursor of
    /// the page that was just consumed.
    pub fn pop(&mut self) -> Option<RawRecord> {
        if let Some(record) = self.buffer.pop_front() {
            return Some(record);
        }
        self.settle();
        None
    }

    /// Commit the pending cursor if the current page has been fully consumed.
    pub fn settle(&mut self) {
        if self.buffer.is_empty() {
            if let Some(next) = self.pending.take() {
                self.committed = next;
            }
        }
    }

    /// Buffer a freshly fetched page.
    ///
    /// An empty page, a missing continuation token, or a token that does not
    /// move the cursor ends the stream.
    pub fn absorb(&mut self, page: TimelinePage) {
        self.pages += 1;
        if page.records.is_empty() {
            self.has_more = false;
            return;
        }

        let advances = !page.next_cursor.is_empty() && page.next_cursor != self.committed;
        self.has_more = page.has_more && advances;
        self.pending = advances.then_some(page.next_cursor);
        self.buffer.extend(page.records);
    }

    /// Stop requesting further pages.
    pub fn end(&mut self) {
        self.has_more = false;
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Cursor to request the next page with, and to persist.
    pub fn cursor(&self) -> &str {
        &self.committed
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
