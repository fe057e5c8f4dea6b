//! Scripted in-memory platform for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Credential, HarvestConfig, RawRecord, TimelinePage};
use crate::services::{CallTally, HarvestSource, SessionPool};

/// A call observed by the fake, tagged with the auth token that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Timeline { auth: String, cursor: String },
    Thread { auth: String, conversation: String },
}

#[derive(Default)]
pub struct FakeSource {
    /// Pages keyed by the cursor that requests them
    pub pages: HashMap<String, TimelinePage>,
    pub threads: HashMap<String, RawRecord>,
    /// Conversations whose detail call always fails
    pub broken_threads: HashSet<String>,
    /// Cursors whose page fetch always fails
    pub broken_pages: HashSet<String>,
    /// Cursors whose page fetch fails the given number of times first
    pub flaky_pages: Mutex<HashMap<String, u32>>,
    /// Auth tokens the platform refuses
    pub refused: HashSet<String>,
    /// Auth tokens refused on thread-detail calls only
    pub refused_threads: HashSet<String>,
    /// Cancel this token and hang when the given conversation is fetched
    pub cancel_on_thread: Option<(String, CancellationToken)>,
    active: Option<Credential>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeSource {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn with_page(mut self, cursor: &str, page: TimelinePage) -> Self {
        self.pages.insert(cursor.to_string(), page);
        self
    }

    pub fn with_thread(mut self, detail: RawRecord) -> Self {
        self.threads.insert(detail.id.clone(), detail);
        self
    }

    fn auth(&self) -> Result<String> {
        let credential = self
            .active
            .as_ref()
            .ok_or_else(|| AppError::authentication("anonymous", "not authenticated"))?;
        if self.refused.contains(&credential.auth_token) {
            return Err(AppError::authentication(
                credential.fingerprint(),
                "HTTP 401 Unauthorized",
            ));
        }
        Ok(credential.auth_token.clone())
    }
}

#[async_trait]
impl HarvestSource for FakeSource {
    fn authenticate(&mut self, credential: &Credential) -> Result<()> {
        self.active = Some(credential.clone());
        Ok(())
    }

    async fn timeline_page(
        &self,
        _subject: &str,
        cursor: &str,
        _count: usize,
    ) -> Result<TimelinePage> {
        let auth = self.auth();
        self.calls.lock().unwrap().push(Call::Timeline {
            auth: self.active.as_ref().map(|c| c.auth_token.clone()).unwrap_or_default(),
            cursor: cursor.to_string(),
        });
        auth?;

        if self.broken_pages.contains(cursor) {
            return Err(AppError::fetch("timeline", "HTTP 500"));
        }
        if let Some(remaining) = self.flaky_pages.lock().unwrap().get_mut(cursor) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::fetch("timeline", "HTTP 502"));
            }
        }
        Ok(self.pages.get(cursor).cloned().unwrap_or_default())
    }

    async fn thread_detail(&self, conversation_id: &str) -> Result<RawRecord> {
        let auth = self.auth();
        self.calls.lock().unwrap().push(Call::Thread {
            auth: self.active.as_ref().map(|c| c.auth_token.clone()).unwrap_or_default(),
            conversation: conversation_id.to_string(),
        });
        let auth = auth?;
        if self.refused_threads.contains(&auth) {
            return Err(AppError::authentication(auth, "HTTP 403 Forbidden"));
        }

        if let Some((target, token)) = &self.cancel_on_thread {
            if target == conversation_id {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
        if self.broken_threads.contains(conversation_id) {
            return Err(AppError::fetch(format!("thread {conversation_id}"), "HTTP 503"));
        }
        self.threads
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| AppError::fetch(format!("thread {conversation_id}"), "HTTP 404"))
    }
}

/// A record `id` belonging to conversation `conversation`.
pub fn post(id: &str, conversation: &str) -> RawRecord {
    RawRecord {
        id: id.to_string(),
        conversation_id: conversation.to_string(),
        username: "subject".to_string(),
        text: format!("post {id}"),
        permanent_url: format!("https://social.example/subject/status/{id}"),
        timestamp: 1_700_000_000,
        ..Default::default()
    }
}

/// A self-thread detail rooted at `root` with the given members.
pub fn self_thread(root: &str, members: &[&str]) -> RawRecord {
    RawRecord {
        is_self_thread: true,
        thread: members.iter().map(|m| post(m, root)).collect(),
        ..post(root, root)
    }
}

pub fn page(records: Vec<RawRecord>, next_cursor: &str, has_more: bool) -> TimelinePage {
    TimelinePage {
        records,
        next_cursor: next_cursor.to_string(),
        has_more,
    }
}

/// Harvest settings without delays.
pub fn fast_config() -> HarvestConfig {
    HarvestConfig {
        subject: "subject".to_string(),
        page_delay_ms: 0,
        thread_delay_ms: 0,
        max_page_retries: 2,
        ..HarvestConfig::default()
    }
}

pub fn pool(sessions: usize) -> SessionPool {
    let credentials: Vec<_> = (0..sessions)
        .map(|i| Credential::new(format!("auth-{i}"), format!("csrf-{i}")))
        .collect();
    SessionPool::new(&credentials, None, Arc::new(CallTally::new())).unwrap()
}
