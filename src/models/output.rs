//! Output units written to the harvest artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Metrics, RawRecord};

/// Exactly one unit exists per standalone post or per resolved self-thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputUnit {
    Standalone(PostSummary),
    Thread(ThreadUnit),
}

impl OutputUnit {
    /// Build a standalone unit from a record.
    pub fn standalone(record: &RawRecord) -> Self {
        Self::Standalone(PostSummary::from(record))
    }

    /// Build a thread unit from a thread-detail record.
    pub fn thread(detail: &RawRecord) -> Self {
        Self::Thread(ThreadUnit::from(detail))
    }

    /// ID of the post (or thread root) this unit represents.
    pub fn id(&self) -> &str {
        match self {
            Self::Standalone(post) => &post.id,
            Self::Thread(thread) => &thread.root.id,
        }
    }

    pub fn is_thread(&self) -> bool {
        matches!(self, Self::Thread(_))
    }
}

/// Fields shared by standalone posts and thread roots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostSummary {
    pub id: String,
    pub user_name: String,
    pub text: String,
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_urls: Vec<String>,
    pub post_url: String,
    pub time_parsed: Option<DateTime<Utc>>,
    pub time_stamp: i64,
    pub is_quoted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_post: Option<QuotedSummary>,
}

impl From<&RawRecord> for PostSummary {
    fn from(record: &RawRecord) -> Self {
        let quoted_post = record.quoted.as_deref().map(QuotedSummary::from);
        Self {
            id: record.id.clone(),
            user_name: record.username.clone(),
            text: record.text.clone(),
            metrics: record.metrics,
            urls: record.urls.clone(),
            photos: record.photo_urls(),
            video_urls: record.video_urls(),
            post_url: record.permanent_url.clone(),
            time_parsed: DateTime::from_timestamp(record.timestamp, 0),
            time_stamp: record.timestamp,
            is_quoted: quoted_post.is_some(),
            quoted_post,
        }
    }
}

/// A resolved self-thread: root fields plus ordered members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadUnit {
    #[serde(flatten)]
    pub root: PostSummary,
    pub thread_posts: Vec<ThreadMember>,
}

impl From<&RawRecord> for ThreadUnit {
    fn from(detail: &RawRecord) -> Self {
        Self {
            root: PostSummary::from(detail),
            thread_posts: detail.thread.iter().map(ThreadMember::from).collect(),
        }
    }
}

/// Condensed view of a thread member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadMember {
    pub id: String,
    pub text: String,
    pub likes: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,
}

impl From<&RawRecord> for ThreadMember {
    fn from(record: &RawRecord) -> Self {
        Self {
            id: record.id.clone(),
            text: record.text.clone(),
            likes: record.metrics.likes,
            photos: record.photo_urls(),
            videos: record.video_urls(),
        }
    }
}

/// Condensed view of a quoted post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotedSummary {
    pub id: String,
    pub user_name: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,
    pub post_url: String,
}

impl From<&RawRecord> for QuotedSummary {
    fn from(record: &RawRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_name: record.username.clone(),
            text: record.text.clone(),
            photos: record.photo_urls(),
            videos: record.video_urls(),
            post_url: record.permanent_url.clone(),
        }
    }
}
