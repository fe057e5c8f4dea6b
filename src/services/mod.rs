//! Service layer for the harvester.
//!
//! This module contains:
//! - The platform capability (`HarvestSource`) and its HTTP client (`ApiClient`)
//! - Session rotation (`SessionPool`)
//! - Per-run deduplication (`DedupTracker`)
//! - Call accounting (`CallTally`)

mod accounting;
mod client;
mod pool;
mod source;
mod tracker;

pub use accounting::{CallKind, CallTally};
pub use client::ApiClient;
pub use pool::{ActiveSession, SessionPool};
pub use source::HarvestSource;
pub use tracker::DedupTracker;
