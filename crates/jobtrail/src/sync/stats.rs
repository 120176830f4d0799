use serde::Serialize;

/// Counters for one sync run.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Candidate messages the mailbox query matched.
    pub scanned: u64,
    /// New messages ingested this run.
    pub imported_emails: u64,
    pub applications_created: u64,
    pub applications_updated: u64,
    pub statuses_updated: u64,
    /// Messages whose status came from the no-match fallback.
    pub needs_review: u64,
    /// Messages with a confident AI extraction.
    pub ai_processed: u64,
    /// AI unavailable, failed, or below the confidence floor.
    pub ai_fallback_used: u64,
    /// Messages the AI explicitly excluded from the tracker.
    pub ai_skipped: u64,
    /// Messages skipped before ingestion (noise domain, no focus phrase).
    pub skipped: u64,
    /// Per-message failures that were absorbed.
    pub errors: u64,
}

/// Result of one sync run. `ok` is false only when the run could not start
/// at all; partial runs (rate limit, cancellation) stay `ok` with a reason.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub stats: SyncStats,
}

impl SyncOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        SyncOutcome {
            ok: false,
            reason: Some(reason.into()),
            stats: SyncStats::default(),
        }
    }

    pub fn completed(stats: SyncStats, reason: Option<String>) -> Self {
        SyncOutcome {
            ok: true,
            reason,
            stats,
        }
    }
}
