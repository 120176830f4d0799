use thiserror::Error;

/// Umbrella error for crate-level entry points. Subsystems keep their own
/// error enums and convert on the way up.
#[derive(Error, Debug)]
pub enum JobtrailError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Mailbox error: {0}")]
    Mail(#[from] crate::mail::MailError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("AI extraction error: {0}")]
    Extract(#[from] crate::ai::ExtractError),
}

pub type Result<T> = std::result::Result<T, JobtrailError>;
