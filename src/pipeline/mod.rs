//! Harvest pipeline.
//!
//! - `stream`: paged timeline buffering with delayed cursor commit
//! - `reconcile`: thread expansion, deduplication and unit emission
//! - `harvest`: run orchestration around cursor and artifact storage

pub mod harvest;
pub mod reconcile;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use harvest::{HarvestReport, prepare_client, run_harvest, run_harvest_with};
pub use reconcile::{HarvestOutcome, HarvestSettings, ReconcileStats, Reconciler, StopReason};
pub use stream::TimelineStream;
