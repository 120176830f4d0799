use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl MailError {
    /// Rate limits end a run early but leave it successful-partial; every
    /// other error is handled where it occurs.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MailError::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
