// src/pipeline/reconcile.rs

//! Timeline reconciliation engine.
//!
//! Walks the subject's timeline, expands conversation members into whole
//! self-threads, and emits each post or thread exactly once per run. A
//! thread root that was emitted as a standalone post before its thread
//! resolved is replaced in place by the thread unit.
//!
//! Every outbound call rotates to the next pool session first. Cancellation
//! is observed between records, during delays, and while a call is in
//! flight.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::models::{HarvestConfig, OutputUnit, RawRecord};
use crate::pipeline::stream::TimelineStream;
use crate::services::{CallKind, DedupTracker, HarvestSource, SessionPool};

/// Pacing and limits for one run.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub page_size: usize,
    pub max_units: Option<usize>,
    pub page_delay: Duration,
    pub thread_delay: Duration,
    pub max_page_retries: u32,
}

impl From<&HarvestConfig> for HarvestSettings {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_units: config.unit_cap(),
            page_delay: config.page_delay(),
            thread_delay: config.thread_delay(),
            max_page_retries: config.max_page_retries,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The timeline has no further pages
    Exhausted,
    /// The configured unit cap was reached
    UnitCap,
    /// The cancellation token fired
    Cancelled,
    /// No session is left in rotation
    SessionsRejected,
    /// A timeline page failed on every attempt
    PageFailures,
}

impl StopReason {
    /// Whether the run stopped on its own terms rather than on a failure.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Exhausted | Self::UnitCap | Self::Cancelled)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Exhausted => "timeline exhausted",
            Self::UnitCap => "unit cap reached",
            Self::Cancelled => "cancelled",
            Self::SessionsRejected => "all sessions rejected",
            Self::PageFailures => "timeline page failures",
        };
        f.write_str(text)
    }
}

/// Counters collected while reconciling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub records_seen: usize,
    pub errored_records: usize,
    pub duplicates_skipped: usize,
    pub standalone_units: usize,
    pub thread_units: usize,
    pub threads_replaced: usize,
    pub foreign_conversations: usize,
    pub thread_fetches: usize,
    pub thread_failures: usize,
    pub page_fetches: usize,
    pub page_failures: usize,
}

/// Result of one reconciliation run.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub units: Vec<OutputUnit>,
    /// Last committed cursor, safe to persist
    pub cursor: String,
    pub stop: StopReason,
    pub stats: ReconcileStats,
    pub tracker: DedupTracker,
}

/// Ordered output with an index for in-place replacement.
///
/// Replaced standalone units leave a hole that is dropped on finish, so the
/// remaining units keep their emission order.
#[derive(Debug, Default)]
struct OutputLedger {
    slots: Vec<Option<OutputUnit>>,
    standalone_at: HashMap<String, usize>,
    live: usize,
}

impl OutputLedger {
    fn len(&self) -> usize {
        self.live
    }

    fn push_standalone(&mut self, record: &RawRecord) {
        self.standalone_at.insert(record.id.clone(), self.slots.len());
        self.slots.push(Some(OutputUnit::standalone(record)));
        self.live += 1;
    }

    /// Emit a resolved thread. Returns true if it replaced the root's
    /// standalone unit.
    fn resolve_thread(&mut self, detail: &RawRecord) -> bool {
        let unit = OutputUnit::thread(detail);

        // Members emitted standalone earlier are now covered by the thread
        for member in &detail.thread {
            if member.id == detail.id {
                continue;
            }
            if let Some(index) = self.standalone_at.remove(&member.id) {
                if self.slots[index].take().is_some() {
                    self.live -= 1;
                }
            }
        }

        match self.standalone_at.remove(&detail.id) {
            Some(index) => {
                if self.slots[index].replace(unit).is_none() {
                    self.live += 1;
                }
                true
            }
            None => {
                self.slots.push(Some(unit));
                self.live += 1;
                false
            }
        }
    }

    fn into_units(self) -> Vec<OutputUnit> {
        self.slots.into_iter().flatten().collect()
    }
}

enum Pull {
    Record(RawRecord),
    Done(StopReason),
}

enum Step {
    Continue,
    Stop(StopReason),
    /// Stopped before the current record was processed
    Interrupted(StopReason),
}

/// Drives one harvest run over a [`HarvestSource`].
pub struct Reconciler<'a, S: HarvestSource + ?Sized> {
    source: &'a mut S,
    pool: &'a mut SessionPool,
    settings: HarvestSettings,
    cancel: CancellationToken,
    ledger: OutputLedger,
    stats: ReconcileStats,
}

impl<'a, S: HarvestSource + ?Sized> Reconciler<'a, S> {
    pub fn new(
        source: &'a mut S,
        pool: &'a mut SessionPool,
        settings: HarvestSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            pool,
            settings,
            cancel,
            ledger: OutputLedger::default(),
            stats: ReconcileStats::default(),
        }
    }

    /// Harvest `subject` starting at `start_cursor` (empty for the newest
    /// page).
    ///
    /// Never fails: every error is either absorbed per record or turned
    /// into a [`StopReason`].
    pub async fn run(mut self, subject: &str, start_cursor: &str) -> HarvestOutcome {
        let mut stream = TimelineStream::new(subject, start_cursor, self.settings.page_size);
        let mut tracker = DedupTracker::new(subject);
        let mut interrupted = false;

        log::info!(
            "Harvesting {} from {}",
            subject,
            if start_cursor.is_empty() { "the newest page" } else { "saved cursor" }
        );

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self
                .settings
                .max_units
                .is_some_and(|cap| self.ledger.len() >= cap)
            {
                break StopReason::UnitCap;
            }

            let record = match self.pull(&mut stream).await {
                Pull::Record(record) => record,
                Pull::Done(reason) => break reason,
            };

            match self.process(record, &mut tracker).await {
                Step::Continue => {}
                Step::Stop(reason) => break reason,
                Step::Interrupted(reason) => {
                    interrupted = true;
                    break reason;
                }
            }
        };

        if !interrupted {
            stream.settle();
        }

        log::info!(
            "Stopped harvesting {} ({}): {} units, {} pages",
            subject,
            stop,
            self.ledger.len(),
            stream.pages_fetched()
        );

        HarvestOutcome {
            units: self.ledger.into_units(),
            cursor: stream.cursor().to_string(),
            stop,
            stats: self.stats,
            tracker,
        }
    }

    /// Next record, fetching pages as the buffer drains.
    async fn pull(&mut self, stream: &mut TimelineStream) -> Pull {
        loop {
            if let Some(record) = stream.pop() {
                return Pull::Record(record);
            }
            if !stream.has_more() {
                return Pull::Done(StopReason::Exhausted);
            }
            if let Err(reason) = self.fetch_page(stream).await {
                return Pull::Done(reason);
            }
        }
    }

    /// Fetch the next page.
    ///
    /// Rejected sessions are rotated past without spending the retry budget,
    /// which only counts transient failures.
    async fn fetch_page(&mut self, stream: &mut TimelineStream) -> Result<(), StopReason> {
        let attempts = self.settings.max_page_retries.max(1);
        let mut failures = 0;
        let mut tried = false;

        loop {
            if (stream.pages_fetched() > 0 || tried)
                && !self.pause(self.settings.page_delay).await
            {
                return Err(StopReason::Cancelled);
            }
            tried = true;

            let session = match self.pool.next() {
                Ok(session) => session,
                Err(e) => {
                    log::error!("Cannot fetch timeline page: {}", e);
                    return Err(StopReason::SessionsRejected);
                }
            };
            if let Err(e) = self.source.authenticate(&session.credential) {
                self.pool.reject(&session, &e.to_string());
                continue;
            }
            self.pool.record(&session, CallKind::Timeline);

            let cancel = self.cancel.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.source.timeline_page(
                    stream.subject(),
                    stream.cursor(),
                    stream.page_size(),
                ) => Some(result),
            };

            match result {
                None => return Err(StopReason::Cancelled),
                Some(Ok(page)) => {
                    log::info!(
                        "Fetched timeline page {} ({} records) with session {}",
                        stream.pages_fetched() + 1,
                        page.records.len(),
                        session.key
                    );
                    stream.absorb(page);
                    self.stats.page_fetches += 1;
                    return Ok(());
                }
                Some(Err(e)) if e.is_authentication() => {
                    self.stats.page_failures += 1;
                    self.pool.reject(&session, &e.to_string());
                }
                Some(Err(e)) => {
                    self.stats.page_failures += 1;
                    failures += 1;
                    log::warn!(
                        "Timeline page attempt {}/{} failed: {}",
                        failures,
                        attempts,
                        e
                    );
                    if failures >= attempts {
                        break;
                    }
                }
            }
        }

        log::error!("Giving up on timeline after {} failed attempts", attempts);
        stream.end();
        Err(StopReason::PageFailures)
    }

    async fn process(&mut self, record: RawRecord, tracker: &mut DedupTracker) -> Step {
        self.stats.records_seen += 1;

        if let Some(error) = &record.error {
            log::warn!("Skipping errored record {}: {}", record.id, error);
            self.stats.errored_records += 1;
            return Step::Continue;
        }
        if record.id.is_empty() {
            log::warn!("Skipping record without an ID");
            self.stats.errored_records += 1;
            return Step::Continue;
        }
        if tracker.is_post(&record.id) {
            log::debug!("Skipping already processed post {}", record.id);
            self.stats.duplicates_skipped += 1;
            return Step::Continue;
        }

        if record.is_standalone() {
            self.ledger.push_standalone(&record);
            tracker.mark_post(&record.id);
            self.stats.standalone_units += 1;
            log::info!("Harvested post {}", record.id);
            return Step::Continue;
        }

        let conversation = record.conversation().to_string();
        if tracker.is_thread(&conversation) {
            log::debug!(
                "Skipping post {} of already processed thread {}",
                record.id,
                conversation
            );
            self.stats.duplicates_skipped += 1;
            return Step::Continue;
        }

        self.expand_thread(&record, &conversation, tracker).await
    }

    /// Fetch and merge the thread behind `record`, moving on to the next
    /// session whenever the current one is rejected.
    async fn expand_thread(
        &mut self,
        record: &RawRecord,
        conversation: &str,
        tracker: &mut DedupTracker,
    ) -> Step {
        loop {
            let session = match self.pool.next() {
                Ok(session) => session,
                Err(e) => {
                    log::error!("Cannot fetch thread {}: {}", conversation, e);
                    return Step::Interrupted(StopReason::SessionsRejected);
                }
            };
            if let Err(e) = self.source.authenticate(&session.credential) {
                self.pool.reject(&session, &e.to_string());
                continue;
            }
            self.pool.record(&session, CallKind::ThreadDetail);
            self.stats.thread_fetches += 1;

            let cancel = self.cancel.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.source.thread_detail(conversation) => Some(result),
            };

            let rejected = match result {
                None => return Step::Interrupted(StopReason::Cancelled),
                Some(Ok(detail)) => {
                    self.merge_thread(record, conversation, detail, tracker);
                    false
                }
                Some(Err(e)) if e.is_authentication() => {
                    log::warn!("Thread {} refused, retrying: {}", conversation, e);
                    self.pool.reject(&session, &e.to_string());
                    true
                }
                Some(Err(e)) => {
                    log::warn!("Error fetching thread {}: {}", conversation, e);
                    self.stats.thread_failures += 1;
                    false
                }
            };

            if !self.pause(self.settings.thread_delay).await {
                // A refused record was never processed and must be seen again
                return if rejected {
                    Step::Interrupted(StopReason::Cancelled)
                } else {
                    Step::Stop(StopReason::Cancelled)
                };
            }
            if !rejected {
                return Step::Continue;
            }
        }
    }

    fn merge_thread(
        &mut self,
        record: &RawRecord,
        conversation: &str,
        mut detail: RawRecord,
        tracker: &mut DedupTracker,
    ) {
        if !detail.is_self_thread || detail.thread.is_empty() {
            log::info!(
                "Conversation {} is not a self-thread, keeping post {} standalone",
                conversation,
                record.id
            );
            self.ledger.push_standalone(record);
            tracker.mark_post(&record.id);
            self.stats.standalone_units += 1;
            self.stats.foreign_conversations += 1;
            return;
        }

        if detail.id.is_empty() {
            detail.id = conversation.to_string();
        }

        let replaced = self.ledger.resolve_thread(&detail);
        tracker.mark_thread(&detail.id, detail.member_ids());
        if detail.id != conversation {
            tracker.mark_thread(conversation, [record.id.as_str()]);
        }
        self.stats.thread_units += 1;
        if replaced {
            self.stats.threads_replaced += 1;
        }

        log::info!(
            "Resolved thread {} with {} posts{}",
            detail.id,
            detail.thread.len(),
            if replaced { " (replaced standalone root)" } else { "" }
        );
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
