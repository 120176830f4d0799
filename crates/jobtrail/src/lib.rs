//! jobtrail — keeps a job-application pipeline in sync with a mailbox.
//!
//! The crate mines an inbox for application-related emails (confirmation
//! receipts, interview invites, rejections, offers), classifies each message
//! with ordered keyword rules backed by an optional local AI model, and
//! deduplicates everything into one [`db::application_repo::ApplicationRow`]
//! per `(sender domain, normalized subject key)` group. A follow-up task is
//! derived per application and kept idempotently in sync.
//!
//! [`sync::SyncEngine::run`] is the main entry point; everything else is the
//! machinery behind it.

pub mod ai;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod followup;
pub mod identity;
pub mod mail;
pub mod normalize;
pub mod status;
pub mod sync;

pub use classifier::{classify, Classification};
pub use config::{load_settings, AiSettings, ConfigError, FileSettings, Settings, SettingsProvider, StaticSettings};
pub use error::{JobtrailError, Result};
pub use status::{ApplicationStatus, EventType};
pub use sync::{SyncEngine, SyncOutcome, SyncStats};
