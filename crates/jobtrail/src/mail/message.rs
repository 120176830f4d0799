//! Turns a provider [`RawMessage`] into a [`ParsedMessage`]: header lookup,
//! recursive part walk with base64url decoding, and a first-pass role guess
//! from the subject/body. Parsing degrades instead of failing; a message
//! with a broken part still yields whatever could be read.

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;

use super::provider::{MessagePart, RawMessage};
use crate::normalize;

/// Placeholder when no role could be extracted anywhere.
pub const UNKNOWN_ROLE: &str = "unknown-role";

#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub message_id: String,
    pub from_address: String,
    pub from_display_name: String,
    pub to_address: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub internal_at: DateTime<Utc>,
    /// All headers, lowercased names, first occurrence wins.
    pub headers: HashMap<String, String>,
    pub sender_domain: String,
    /// Regex-derived role guess; `unknown-role` when nothing matched.
    pub role_guess: String,
}

impl ParsedMessage {
    /// The body used for classification and extraction: plain text when
    /// present, otherwise the HTML part stripped to text.
    pub fn inference_body(&self) -> String {
        if !self.text_body.trim().is_empty() {
            self.text_body.clone()
        } else {
            normalize::strip_html(&self.html_body)
        }
    }
}

pub struct MessageParser {
    role_patterns: Vec<Regex>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    pub fn new() -> Self {
        // Ordered by specificity; the first capture of 3+ characters wins.
        let patterns = [
            r"(?i)application for (?:the )?([A-Za-z0-9 /&+#.'-]{3,80})",
            r"(?i)interview for (?:the )?([A-Za-z0-9 /&+#.'-]{3,80})",
            r"(?i)position of ([A-Za-z0-9 /&+#.'-]{3,80})",
            r"(?i)role of ([A-Za-z0-9 /&+#.'-]{3,80})",
            r"(?i)for the ([A-Za-z0-9 /&+#.'-]{3,80}?) position",
        ];
        MessageParser {
            role_patterns: patterns.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        }
    }

    pub fn parse(&self, raw: &RawMessage) -> ParsedMessage {
        let mut headers = HashMap::new();
        let mut text_body = String::new();
        let mut html_body = String::new();

        if let Some(payload) = &raw.payload {
            collect_headers(payload, &mut headers);
            collect_bodies(payload, &mut text_body, &mut html_body);
        }

        let from_raw = headers.get("from").cloned().unwrap_or_default();
        let (from_display_name, from_address) = normalize::display_name_and_address(&from_raw);
        let to_address = headers.get("to").cloned().unwrap_or_default();
        let subject = headers.get("subject").cloned().unwrap_or_default();

        let internal_at = DateTime::from_timestamp_millis(raw.internal_date_ms())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let sender_domain = normalize::sender_domain(&from_address).unwrap_or_default();
        let role_guess = self.extract_role(&subject, &text_body);

        ParsedMessage {
            message_id: raw.id.clone(),
            from_address,
            from_display_name,
            to_address,
            subject,
            text_body,
            html_body,
            internal_at,
            headers,
            sender_domain,
            role_guess,
        }
    }

    fn extract_role(&self, subject: &str, body: &str) -> String {
        let text = format!("{}\n{}", subject, body);
        for pattern in &self.role_patterns {
            if let Some(m) = pattern.captures(&text).and_then(|c| c.get(1)) {
                let role = m
                    .as_str()
                    .trim()
                    .trim_matches(|c: char| ",.!?:;".contains(c))
                    .trim();
                if role.len() >= 3 {
                    return role.to_string();
                }
            }
        }
        UNKNOWN_ROLE.to_string()
    }
}

fn collect_headers(part: &MessagePart, out: &mut HashMap<String, String>) {
    for header in &part.headers {
        out.entry(header.name.to_lowercase())
            .or_insert_with(|| header.value.clone());
    }
    for child in &part.parts {
        collect_headers(child, out);
    }
}

fn collect_bodies(part: &MessagePart, text: &mut String, html: &mut String) {
    if part.parts.is_empty() {
        let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) else {
            return;
        };
        let Some(decoded) = decode_base64url(data) else {
            return;
        };
        let target = if part.mime_type.eq_ignore_ascii_case("text/plain") {
            text
        } else if part.mime_type.eq_ignore_ascii_case("text/html") {
            html
        } else {
            return;
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(&decoded);
    } else {
        for child in &part.parts {
            collect_bodies(child, text, html);
        }
    }
}

/// Gmail encodes bodies as unpadded base64url; some providers pad. Trailing
/// padding is stripped so both decode.
fn decode_base64url(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim().trim_end_matches('='))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
