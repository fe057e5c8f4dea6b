// src/services/accounting.rs

//! Call accounting.
//!
//! Counts timeline-page and thread-detail calls globally and per session.
//! Increments are safe from any thread; the report is read once at the end
//! of a run.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::SessionKey;

/// Kind of outbound call being accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Timeline,
    ThreadDetail,
}

#[derive(Debug, Default, Clone, Copy)]
struct AccountCounts {
    calls: u64,
    rejections: u64,
}

/// Process-scoped call tally.
#[derive(Debug, Default)]
pub struct CallTally {
    timeline: AtomicU64,
    thread: AtomicU64,
    accounts: Mutex<BTreeMap<SessionKey, AccountCounts>>,
}

impl CallTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session so it shows up in the report even when idle.
    pub fn register(&self, key: &SessionKey) {
        self.with_account(key, |_| {});
    }

    pub fn bump_timeline(&self) {
        self.timeline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_thread(&self) {
        self.thread.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump(&self, kind: CallKind) {
        match kind {
            CallKind::Timeline => self.bump_timeline(),
            CallKind::ThreadDetail => self.bump_thread(),
        }
    }

    pub fn bump_account(&self, key: &SessionKey) {
        self.with_account(key, |counts| counts.calls += 1);
    }

    /// Flag that the platform rejected the session.
    pub fn flag_account(&self, key: &SessionKey) {
        self.with_account(key, |counts| counts.rejections += 1);
    }

    fn with_account(&self, key: &SessionKey, update: impl FnOnce(&mut AccountCounts)) {
        // A poisoned lock only means another thread panicked mid-increment
        let mut accounts = match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(accounts.entry(key.clone()).or_default());
    }

    pub fn timeline_calls(&self) -> u64 {
        self.timeline.load(Ordering::Relaxed)
    }

    pub fn thread_calls(&self) -> u64 {
        self.thread.load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u64 {
        self.timeline_calls() + self.thread_calls()
    }

    /// Per-session call counts, ordered by session key.
    pub fn account_calls(&self) -> Vec<(SessionKey, u64)> {
        self.snapshot()
            .into_iter()
            .map(|(key, counts)| (key, counts.calls))
            .collect()
    }

    /// Sessions the platform rejected at least once.
    pub fn rejected_accounts(&self) -> Vec<SessionKey> {
        self.snapshot()
            .into_iter()
            .filter(|(_, counts)| counts.rejections > 0)
            .map(|(key, _)| key)
            .collect()
    }

    fn snapshot(&self) -> Vec<(SessionKey, AccountCounts)> {
        let accounts = match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Render aggregate and per-session totals.
    pub fn report(&self, sink: &mut impl Write) -> io::Result<()> {
        writeln!(sink)?;
        writeln!(sink, "API Call Statistics:")?;
        writeln!(sink, "Timeline API Calls: {}", self.timeline_calls())?;
        writeln!(sink, "Thread Detail API Calls: {}", self.thread_calls())?;
        writeln!(sink, "Total API Calls: {}", self.total_calls())?;
        writeln!(sink)?;
        writeln!(sink, "Per Session API Calls:")?;
        for (key, counts) in self.snapshot() {
            if counts.rejections > 0 {
                writeln!(
                    sink,
                    "Session {}: {} calls (REJECTED {} times)",
                    key, counts.calls, counts.rejections
                )?;
            } else {
                writeln!(sink, "Session {}: {} calls", key, counts.calls)?;
            }
        }
        Ok(())
    }
}
