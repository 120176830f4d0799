//! Prompting and parsing around the text generator: one email in, one
//! structured [`Extraction`] out. Network and timeout failures propagate
//! immediately; a malformed model response gets exactly one retry before
//! the extraction is reported as failed.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::generator::{GenerateError, TextGenerator};
use crate::config::AiSettings;

const MAX_PROMPT_BODY_CHARS: usize = 4000;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("AI extraction is disabled")]
    Disabled,

    #[error("model request timed out")]
    Timeout,

    #[error("model request failed: {0}")]
    Request(String),

    #[error("model returned invalid output: {0}")]
    InvalidOutput(String),
}

impl ExtractError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExtractError::Timeout)
    }
}

/// Structured fields the model extracts from one email. All fields are
/// optional on the wire; absent fields fall back to the rule pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Extraction {
    /// Whether the mail belongs in the tracker at all.
    pub include: bool,
    pub company_name: Option<String>,
    pub company_domain: Option<String>,
    pub role_title: Option<String>,
    /// One of the application status values; validated downstream, an
    /// unknown value just falls back to the rule classification.
    pub status: Option<String>,
    /// Grouping key suggestion so reworded subjects land in one group.
    pub normalized_subject_key: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.0
}

pub struct Extractor {
    generator: Arc<dyn TextGenerator>,
    settings: AiSettings,
}

impl Extractor {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: AiSettings) -> Self {
        Extractor {
            generator,
            settings,
        }
    }

    pub async fn extract(
        &self,
        subject: &str,
        body: &str,
        from_address: &str,
        from_display_name: &str,
        sender_domain: &str,
    ) -> Result<Extraction, ExtractError> {
        if !self.settings.enabled {
            return Err(ExtractError::Disabled);
        }

        let prompt = build_prompt(subject, body, from_address, from_display_name, sender_domain);
        let mut last_reason = String::new();

        for attempt in 1..=2 {
            let raw = self
                .generator
                .generate(&self.settings.model, &prompt)
                .await
                .map_err(|e| match e {
                    GenerateError::Timeout => ExtractError::Timeout,
                    other => ExtractError::Request(other.to_string()),
                })?;

            match parse_extraction(&raw) {
                Ok(extraction) => {
                    if attempt > 1 {
                        debug!("model output parsed on retry");
                    }
                    return Ok(extraction);
                }
                Err(reason) => {
                    warn!("model output invalid (attempt {attempt}): {reason}");
                    last_reason = reason;
                }
            }
        }

        Err(ExtractError::InvalidOutput(last_reason))
    }
}

fn build_prompt(
    subject: &str,
    body: &str,
    from_address: &str,
    from_display_name: &str,
    sender_domain: &str,
) -> String {
    let body = truncate_chars(body, MAX_PROMPT_BODY_CHARS);
    format!(
        "You are an assistant that extracts job-application data from one email.\n\
         Respond with ONLY a single JSON object, no prose, using this schema:\n\
         {{\n\
           \"include\": boolean (true only if this email is about a job application of the recipient),\n\
           \"companyName\": string or null,\n\
           \"companyDomain\": string or null (the employer's web domain, not the mail provider's),\n\
           \"roleTitle\": string or null,\n\
           \"status\": one of \"submitted\", \"received\", \"rejected\", \"interview\", \"assessment\", \"offer\", \"withdrawn\", or null,\n\
           \"normalizedSubjectKey\": short lowercase dash-separated key identifying this application thread,\n\
           \"confidence\": number between 0 and 1\n\
         }}\n\
         An application confirmation (\"thanks for applying\") has status \"received\".\n\
         Use the same normalizedSubjectKey for reworded emails about the same application.\n\n\
         From: {from_display_name} <{from_address}>\n\
         Sender domain: {sender_domain}\n\
         Subject: {subject}\n\
         Body:\n{body}\n"
    )
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parses model output into an [`Extraction`]. Tolerates a markdown code
/// fence around the JSON, rejects anything that is not a single object.
fn parse_extraction(raw: &str) -> Result<Extraction, String> {
    let trimmed = strip_code_fence(raw.trim());
    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| format!("not valid JSON: {e}"))?;
    if !value.is_object() {
        return Err("expected a JSON object".to_string());
    }
    let mut extraction: Extraction =
        serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))?;
    extraction.confidence = extraction.confidence.clamp(0.0, 1.0);
    if let Some(status) = &mut extraction.status {
        *status = status.trim().to_lowercase();
    }
    Ok(extraction)
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim().trim_end_matches("```").trim()
}
