// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod output;
mod record;
mod session;

// Re-export all public types
pub use config::{Config, HarvestConfig, HttpConfig, PathsConfig, ProxyConfig};
pub use output::{OutputUnit, PostSummary, QuotedSummary, ThreadMember, ThreadUnit};
pub use record::{MediaRef, Metrics, RawRecord, TimelinePage};
pub use session::{Credential, Session, SessionKey};
