//! Gmail REST client implementing [`MailboxProvider`]. Talks to the
//! `users/me` endpoints with a bearer token; pagination is followed until
//! `max_results` is reached. Quota exhaustion (Gmail reports it as 403 or
//! 429) surfaces as [`MailError::RateLimited`] so the engine can finish the
//! run with what it has.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::{MailError, Result};
use super::provider::{ChangeSet, MailboxProvider, RawMessage};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const PAGE_SIZE: u32 = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
    timeout: Duration,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ListResponse {
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ProfileResponse {
    history_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
    history_id: Option<String>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct HistoryEntry {
    messages_added: Vec<HistoryMessage>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct HistoryMessage {
    message: MessageRef,
}

impl GmailClient {
    pub fn new(access_token: SecretString) -> Self {
        Self::with_base_url(access_token, GMAIL_API_BASE)
    }

    /// Base URL override for tests and proxies.
    pub fn with_base_url(access_token: SecretString, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        GmailClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(self.access_token.expose_secret())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            401 => {
                return Err(MailError::AuthenticationFailed(
                    "access token rejected".to_string(),
                ))
            }
            403 | 429 => return Err(MailError::RateLimited(format!("HTTP {status}"))),
            _ => return Err(MailError::Status(status)),
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MailError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MailboxProvider for GmailClient {
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let url = format!("{}/messages", self.base_url);
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("q", query)])
                .query(&[("maxResults", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = self.send(request).await?;
            for message in page.messages {
                if !message.id.is_empty() {
                    ids.push(message.id);
                }
            }
            if ids.len() as u32 >= max_results {
                ids.truncate(max_results as usize);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("mailbox query matched {} message(s)", ids.len());
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage> {
        let url = format!("{}/messages/{id}", self.base_url);
        let request = self.client.get(&url).query(&[("format", "full")]);
        self.send(request).await
    }

    async fn changes_since(&self, checkpoint: &str) -> Result<ChangeSet> {
        let url = format!("{}/history", self.base_url);
        let mut change_set = ChangeSet::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("startHistoryId", checkpoint)])
                .query(&[("historyTypes", "messageAdded")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: HistoryResponse = self.send(request).await?;
            for entry in page.history {
                for added in entry.messages_added {
                    if !added.message.id.is_empty() {
                        change_set.ids.push(added.message.id);
                    }
                }
            }
            if page.history_id.is_some() {
                change_set.checkpoint = page.history_id;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(change_set)
    }

    async fn latest_checkpoint(&self) -> Result<Option<String>> {
        let url = format!("{}/profile", self.base_url);
        let profile: ProfileResponse = self.send(self.client.get(&url)).await?;
        Ok(profile.history_id)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> MailError {
    if e.is_timeout() {
        MailError::Timeout
    } else {
        MailError::Network(e.to_string())
    }
}
