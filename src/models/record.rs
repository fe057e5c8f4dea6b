//! Raw records as delivered by the platform.

use serde::{Deserialize, Serialize};

/// Engagement counters of a post.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub replies: u64,
    #[serde(default)]
    pub views: u64,
}

/// A media attachment reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    #[serde(default)]
    pub url: String,
}

/// One post as received from the timeline or a thread-detail call.
///
/// A record whose `id` differs from its `conversation_id` is a member of a
/// conversation that must be expanded with a thread-detail fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRecord {
    pub id: String,

    #[serde(default)]
    pub conversation_id: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub metrics: Metrics,

    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub photos: Vec<MediaRef>,

    #[serde(default)]
    pub videos: Vec<MediaRef>,

    #[serde(default)]
    pub permanent_url: String,

    /// Unix seconds
    #[serde(default)]
    pub timestamp: i64,

    /// Embedded quoted post
    #[serde(default)]
    pub quoted: Option<Box<RawRecord>>,

    /// Ordered self-authored replies, populated by thread-detail calls
    #[serde(default)]
    pub thread: Vec<RawRecord>,

    #[serde(default)]
    pub is_self_thread: bool,

    /// Per-record failure reported by the platform
    #[serde(default)]
    pub error: Option<String>,
}

impl RawRecord {
    /// Not a member of somebody else's conversation root.
    ///
    /// An empty conversation ID is treated as the record's own.
    pub fn is_standalone(&self) -> bool {
        self.conversation_id.is_empty() || self.id == self.conversation_id
    }

    /// Conversation this record belongs to.
    pub fn conversation(&self) -> &str {
        if self.conversation_id.is_empty() {
            &self.id
        } else {
            &self.conversation_id
        }
    }

    /// Photo URLs in order.
    pub fn photo_urls(&self) -> Vec<String> {
        self.photos.iter().map(|p| p.url.clone()).collect()
    }

    /// Video URLs, skipping entries without one.
    pub fn video_urls(&self) -> Vec<String> {
        self.videos
            .iter()
            .filter(|v| !v.url.is_empty())
            .map(|v| v.url.clone())
            .collect()
    }

    /// IDs of the thread members, in order.
    pub fn member_ids(&self) -> Vec<String> {
        self.thread.iter().map(|m| m.id.clone()).collect()
    }
}

/// One page of the subject's timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelinePage {
    #[serde(default)]
    pub records: Vec<RawRecord>,

    #[serde(default)]
    pub next_cursor: String,

    #[serde(default)]
    pub has_more: bool,
}
