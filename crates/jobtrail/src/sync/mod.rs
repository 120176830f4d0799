//! The sync pipeline: one run fetches focus-matching mail, classifies and
//! deduplicates it into applications, and reconciles follow-up tasks.

pub mod engine;
pub mod stats;

pub use engine::SyncEngine;
pub use stats::{SyncOutcome, SyncStats};
