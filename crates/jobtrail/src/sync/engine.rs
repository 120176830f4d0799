//! The sync orchestrator. One run:
//!
//! 1. re-reads settings and prunes rows past the lookback window,
//! 2. lists candidate ids — incrementally from the stored provider
//!    checkpoint when one exists, otherwise via a full focus-phrase
//!    query — and drops already imported ids,
//! 3. fetches the remainder oldest-first with a delay between fetches,
//! 4. per message: parse, noise-filter, rule-classify, AI-extract (behind
//!    a circuit breaker), resolve identity, then write email record,
//!    application upsert, event, rule log and follow-up in one transaction,
//! 5. persists the provider checkpoint, even when nothing new arrived.
//!
//! Per-message failures are counted and absorbed; a provider rate limit
//! ends the run early as a successful partial. `ok: false` means the run
//! could not start (no connected account).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::ai::{AiCircuitBreaker, ExtractError, Extraction, Extractor, TextGenerator};
use crate::classifier;
use crate::config::{Settings, SettingsProvider};
use crate::db::application_repo::{self, ApplicationRow};
use crate::db::email_repo::{self, EmailRecordRow};
use crate::db::event_repo::{self, ApplicationEventRow};
use crate::db::rule_log_repo::{self, RuleLogRow};
use crate::db::{sync_state_repo, Database, DatabaseError};
use crate::followup;
use crate::identity::{self, CompanyInput, IdentityResolver};
use crate::mail::message::UNKNOWN_ROLE;
use crate::mail::{MailboxProvider, MessageParser, RawMessage};
use crate::normalize;
use crate::status::{ApplicationStatus, EventType};
use crate::sync::stats::{SyncOutcome, SyncStats};

/// Upper bound on candidate ids per run; one run never ingests more.
const MAX_LIST_RESULTS: u32 = 500;

/// Consecutive AI timeouts before extraction is skipped for the rest of
/// the run.
const BREAKER_TIMEOUT_THRESHOLD: u32 = 2;

pub struct SyncEngine {
    db: Database,
    provider: Option<Arc<dyn MailboxProvider>>,
    generator: Arc<dyn TextGenerator>,
    settings: Arc<dyn SettingsProvider>,
    account: String,
    run_lock: tokio::sync::Mutex<()>,
    cancelled: AtomicBool,
}

struct TxOutcome {
    created: bool,
    status_changed: bool,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        provider: Option<Arc<dyn MailboxProvider>>,
        generator: Arc<dyn TextGenerator>,
        settings: Arc<dyn SettingsProvider>,
        account: impl Into<String>,
    ) -> Self {
        SyncEngine {
            db,
            provider,
            generator,
            settings,
            account: account.into(),
            run_lock: tokio::sync::Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Requests the current run to stop after the in-flight message. The
    /// flag is checked between messages only, so no partial writes happen.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs one sync. Concurrent calls serialize; the second waits for the
    /// first and then runs against the updated state (and dedups to a
    /// no-op).
    pub async fn run(&self) -> SyncOutcome {
        let _run_guard = self.run_lock.lock().await;
        self.cancelled.store(false, Ordering::SeqCst);

        let span = info_span!("sync_run", account = %self.account);
        self.run_locked().instrument(span).await
    }

    async fn run_locked(&self) -> SyncOutcome {
        let Some(provider) = self.provider.clone() else {
            warn!("sync requested without a connected account");
            return SyncOutcome::failed("no connected account");
        };

        let settings = self.settings.current();
        let mut stats = SyncStats::default();
        let mut reason: Option<String> = None;

        let cutoff = (Utc::now() - Duration::days(settings.sync_lookback_days)).to_rfc3339();
        if let Err(e) = self.prune(&cutoff) {
            error!("prune before sync failed: {e}");
        }

        let phrases = normalize::expand_focus_phrases(&settings.focus_phrases);
        let query = build_focus_query(&phrases, settings.sync_lookback_days);
        debug!("mailbox query: {query}");

        let checkpoint = self
            .db
            .with_conn(|conn| {
                Ok(sync_state_repo::get(conn, &self.account)?.and_then(|s| s.checkpoint))
            })
            .unwrap_or_else(|e| {
                warn!("failed to read stored checkpoint: {e}");
                None
            });

        // With a checkpoint from a previous run, ask the provider only for
        // messages added since. The per-message focus re-check filters the
        // unrelated ones; an expired checkpoint falls back to the full query.
        let mut ids: Option<Vec<String>> = None;
        if let Some(checkpoint) = checkpoint {
            match provider.changes_since(&checkpoint).await {
                Ok(mut set) => {
                    set.ids.truncate(MAX_LIST_RESULTS as usize);
                    debug!("incremental fetch: {} candidate(s) since checkpoint", set.ids.len());
                    ids = Some(set.ids);
                }
                Err(e) => {
                    warn!("incremental fetch failed: {e}; falling back to the full query");
                }
            }
        }
        let ids = match ids {
            Some(ids) => ids,
            None => match provider.list_message_ids(&query, MAX_LIST_RESULTS).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!("mailbox query failed: {e}");
                    return SyncOutcome::completed(
                        stats,
                        Some(format!("mailbox query failed: {e}")),
                    );
                }
            },
        };
        stats.scanned = ids.len() as u64;

        let unseen = match self.filter_unseen(ids) {
            Ok(unseen) => unseen,
            Err(e) => {
                error!("dedup lookup failed: {e}");
                return SyncOutcome::completed(stats, Some(format!("dedup lookup failed: {e}")));
            }
        };
        info!(
            "{} candidate message(s), {} not yet imported",
            stats.scanned,
            unseen.len()
        );

        let mut messages: Vec<RawMessage> = Vec::new();
        for (index, id) in unseen.iter().enumerate() {
            if index > 0 && settings.fetch_delay_ms > 0 {
                tokio::time::sleep(StdDuration::from_millis(settings.fetch_delay_ms)).await;
            }
            match provider.get_message(id).await {
                Ok(message) => messages.push(message),
                Err(e) if e.is_rate_limited() => {
                    warn!("provider rate limit after {index} fetch(es); finishing with what we have");
                    reason = Some("partial: provider rate limit".to_string());
                    break;
                }
                Err(e) => {
                    warn!("failed to fetch message {id}: {e}");
                    stats.errors += 1;
                }
            }
        }

        // Oldest first, so status updates replay in mailbox order.
        messages.sort_by_key(|m| m.internal_date_ms());

        let parser = MessageParser::new();
        let resolver = IdentityResolver::new();
        let extractor = Extractor::new(self.generator.clone(), settings.ai.clone());
        let mut breaker = AiCircuitBreaker::new(BREAKER_TIMEOUT_THRESHOLD);

        for raw in &messages {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("sync cancelled; stopping before the next message");
                reason.get_or_insert_with(|| "cancelled".to_string());
                break;
            }
            let message_span = info_span!("ingest_message", id = %raw.id);
            if let Err(e) = self
                .process_message(raw, &parser, &resolver, &extractor, &mut breaker, &phrases, &settings, &mut stats)
                .instrument(message_span)
                .await
            {
                error!("failed to process message {}: {e}", raw.id);
                stats.errors += 1;
            }
        }

        match provider.latest_checkpoint().await {
            Ok(checkpoint) => {
                if let Err(e) = self.store_checkpoint(checkpoint.as_deref()) {
                    error!("failed to persist checkpoint: {e}");
                }
            }
            Err(e) => warn!("failed to read provider checkpoint: {e}"),
        }

        info!(
            "sync finished: {} imported, {} created, {} updated, {} errors",
            stats.imported_emails, stats.applications_created, stats.applications_updated, stats.errors
        );
        SyncOutcome::completed(stats, reason)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_message(
        &self,
        raw: &RawMessage,
        parser: &MessageParser,
        resolver: &IdentityResolver,
        extractor: &Extractor,
        breaker: &mut AiCircuitBreaker,
        phrases: &[String],
        settings: &Settings,
        stats: &mut SyncStats,
    ) -> Result<(), DatabaseError> {
        let parsed = parser.parse(raw);
        let body = parsed.inference_body();

        // The mailbox query is advisory; re-check the focus phrases against
        // what we actually parsed.
        let haystack = format!("{} {}", parsed.subject, body).to_lowercase();
        if !phrases.iter().any(|p| haystack.contains(p)) {
            debug!("message {} matches no focus phrase; skipping", raw.id);
            stats.skipped += 1;
            return Ok(());
        }

        if parsed.sender_domain.is_empty() || normalize::is_noise_domain(&parsed.sender_domain) {
            debug!(
                "message {} from noise or empty domain '{}'; skipping",
                raw.id, parsed.sender_domain
            );
            stats.skipped += 1;
            return Ok(());
        }

        let classification = classifier::classify(&parsed.subject, &body);

        let mut ai_result: Option<Extraction> = None;
        let mut ai_error: Option<String> = None;
        if breaker.is_open() {
            ai_error = Some("ai circuit breaker open".to_string());
            stats.ai_fallback_used += 1;
        } else {
            match extractor
                .extract(
                    &parsed.subject,
                    &body,
                    &parsed.from_address,
                    &parsed.from_display_name,
                    &parsed.sender_domain,
                )
                .await
            {
                Ok(extraction) => {
                    breaker.record_non_timeout();
                    ai_result = Some(extraction);
                }
                Err(e) => {
                    if e.is_timeout() {
                        breaker.record_timeout();
                    } else {
                        breaker.record_non_timeout();
                    }
                    match &e {
                        ExtractError::Disabled => debug!("AI extraction disabled"),
                        other => warn!("AI extraction failed for {}: {other}", raw.id),
                    }
                    ai_error = Some(e.to_string());
                    stats.ai_fallback_used += 1;
                }
            }
        }

        let confident = ai_result
            .as_ref()
            .filter(|e| e.confidence >= settings.ai.min_confidence);
        match confident {
            Some(_) => stats.ai_processed += 1,
            None if ai_result.is_some() => stats.ai_fallback_used += 1,
            None => {}
        }

        if let Some(extraction) = confident {
            if !extraction.include {
                debug!("AI excluded message {} from the tracker", raw.id);
                stats.ai_skipped += 1;
                return Ok(());
            }
        }

        let candidates = identity::subject_candidates(&parsed.subject);
        let ai_company_name = confident.and_then(|e| e.company_name.clone());
        let ai_company_domain = confident.and_then(|e| e.company_domain.clone());
        let ai_role_title = confident.and_then(|e| e.role_title.clone());
        let ai_status = confident.and_then(|e| e.status.clone());
        let ai_subject_key = confident.and_then(|e| e.normalized_subject_key.clone());

        let resolved = resolver.resolve(&CompanyInput {
            subject: &parsed.subject,
            subject_company_candidate: candidates.company.as_deref(),
            body: &body,
            sender_domain: &parsed.sender_domain,
            sender_display_name: &parsed.from_display_name,
            ai_company_name: ai_company_name.as_deref(),
            ai_company_domain: ai_company_domain.as_deref(),
        });

        let mut company_name = resolved.company_name.clone();
        let company_domain = if resolved.company_domain.is_empty() {
            parsed.sender_domain.clone()
        } else {
            resolved.company_domain.clone()
        };
        if company_domain.is_empty() {
            warn!("no usable domain for message {}; skipping", raw.id);
            stats.skipped += 1;
            return Ok(());
        }

        // Grouping is anchored to the literal sending domain, not the
        // resolved company domain, so ATS mail groups consistently.
        let group_sender_domain = parsed.sender_domain.clone();
        let raw_key = ai_subject_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| normalize::normalize_subject_key(&parsed.subject));
        let mut group_subject_key = normalize::slug_key(&raw_key);
        if group_subject_key.is_empty() {
            group_subject_key = normalize::FALLBACK_SUBJECT_KEY.to_string();
        }

        // Every role source must pass the vocabulary check; the parser's
        // regex in particular over-captures on prose like "the position at
        // our office".
        let mut role_title = ai_role_title
            .filter(|r| normalize::looks_like_role_title(r))
            .or_else(|| {
                candidates
                    .role
                    .clone()
                    .filter(|r| normalize::looks_like_role_title(r))
            })
            .or_else(|| {
                Some(parsed.role_guess.clone()).filter(|r| normalize::looks_like_role_title(r))
            })
            .unwrap_or_else(|| UNKNOWN_ROLE.to_string());
        identity::correct_company_role_swap(&mut company_name, &mut role_title, &parsed.sender_domain);
        let normalized_role = normalize::normalize_role(&role_title);

        let status = ai_status
            .as_deref()
            .and_then(ApplicationStatus::parse)
            .unwrap_or(match classification.predicted_status {
                ApplicationStatus::Unclassified => ApplicationStatus::Received,
                other => other,
            });
        let used_ai = confident.is_some();
        if classification.needs_review && !used_ai {
            stats.needs_review += 1;
        }

        let received_at = parsed.internal_at.to_rfc3339();
        let now = Utc::now().to_rfc3339();
        let ai_json = ai_result
            .as_ref()
            .and_then(|e| serde_json::to_string(e).ok());
        let ai_confidence = ai_result.as_ref().map(|e| f64::from(e.confidence));

        let outcome = self.db.with_tx(|tx| {
            email_repo::upsert(
                tx,
                &EmailRecordRow {
                    id: Uuid::new_v4().to_string(),
                    message_id: raw.id.clone(),
                    application_id: None,
                    direction: "inbound".to_string(),
                    from_address: parsed.from_address.clone(),
                    to_address: parsed.to_address.clone(),
                    subject: parsed.subject.clone(),
                    text_body: parsed.text_body.clone(),
                    html_body: parsed.html_body.clone(),
                    received_at: received_at.clone(),
                    headers_json: serde_json::to_string(&parsed.headers).ok(),
                    sender_domain: parsed.sender_domain.clone(),
                    parsed_role: parsed.role_guess.clone(),
                    normalized_role: normalized_role.clone(),
                    classification: status.as_str().to_string(),
                    group_sender_domain: group_sender_domain.clone(),
                    group_subject_key: group_subject_key.clone(),
                    ai_extraction_json: ai_json.clone(),
                    ai_confidence,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                },
            )?;

            let existing =
                application_repo::find_by_group_key(tx, &group_sender_domain, &group_subject_key)?;
            let (application, event_type, created, status_changed) = match existing {
                None => {
                    let application = ApplicationRow {
                        id: Uuid::new_v4().to_string(),
                        company_name: company_name.clone(),
                        company_domain: company_domain.clone(),
                        role_title: role_title.clone(),
                        normalized_role_title: normalized_role.clone(),
                        status: status.as_str().to_string(),
                        group_sender_domain: group_sender_domain.clone(),
                        group_subject_key: group_subject_key.clone(),
                        first_seen_at: received_at.clone(),
                        last_activity_at: received_at.clone(),
                        manual_status_locked: false,
                        notes: None,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    application_repo::insert(tx, &application)?;
                    (application, EventType::ApplicationReceived, true, false)
                }
                Some(mut application) => {
                    let mut status_changed = false;
                    if !application.manual_status_locked && application.status != status.as_str() {
                        application.status = status.as_str().to_string();
                        status_changed = true;
                    }
                    // Backfill identity fields only when they genuinely
                    // improve on a placeholder.
                    if identity::is_placeholder_company(&application.company_name)
                        && !identity::is_placeholder_company(&company_name)
                    {
                        application.company_name = company_name.clone();
                        application.company_domain = company_domain.clone();
                    }
                    if application.role_title == UNKNOWN_ROLE && role_title != UNKNOWN_ROLE {
                        application.role_title = role_title.clone();
                        application.normalized_role_title = normalized_role.clone();
                    }
                    application.last_activity_at = received_at.clone();
                    application.updated_at = now.clone();
                    application_repo::update(tx, &application)?;

                    let event_type = if status_changed {
                        EventType::StatusChanged
                    } else {
                        EventType::EmailReceived
                    };
                    (application, event_type, false, status_changed)
                }
            };

            let details = serde_json::json!({
                "messageId": raw.id,
                "subject": parsed.subject,
                "groupSenderDomain": group_sender_domain,
                "groupSubjectKey": group_subject_key,
                "resolvedStatus": status.as_str(),
                "companySource": resolved.source.as_str(),
                "subjectCandidates": {
                    "company": candidates.company,
                    "role": candidates.role,
                },
                "rule": {
                    "matched": classification.matched_rule,
                    "predicted": classification.predicted_status.as_str(),
                    "confidence": classification.confidence,
                },
                "ai": {
                    "used": used_ai,
                    "confidence": ai_confidence,
                    "error": ai_error,
                },
            });
            event_repo::insert(
                tx,
                &ApplicationEventRow {
                    id: Uuid::new_v4().to_string(),
                    application_id: application.id.clone(),
                    event_type: event_type.as_str().to_string(),
                    details_json: Some(details.to_string()),
                    created_at: now.clone(),
                },
            )?;

            email_repo::link_application(tx, &raw.id, &application.id)?;

            rule_log_repo::insert(
                tx,
                &RuleLogRow {
                    id: Uuid::new_v4().to_string(),
                    message_id: raw.id.clone(),
                    matched_rule: classification.matched_rule.clone(),
                    predicted_status: classification.predicted_status.as_str().to_string(),
                    confidence: f64::from(classification.confidence),
                    used_ai,
                    ai_error: ai_error.clone(),
                    created_at: now.clone(),
                },
            )?;

            followup::refresh_followup(tx, &application, settings.followup_after_days)?;

            Ok(TxOutcome {
                created,
                status_changed,
            })
        })?;

        stats.imported_emails += 1;
        if outcome.created {
            stats.applications_created += 1;
        } else {
            stats.applications_updated += 1;
        }
        if outcome.status_changed {
            stats.statuses_updated += 1;
        }
        Ok(())
    }

    fn filter_unseen(&self, ids: Vec<String>) -> Result<Vec<String>, DatabaseError> {
        self.db.with_conn(|conn| {
            let seen = email_repo::existing_message_ids(conn, &ids)?;
            let seen: HashSet<&str> = seen.iter().map(String::as_str).collect();
            Ok(ids
                .iter()
                .filter(|id| !seen.contains(id.as_str()))
                .cloned()
                .collect())
        })
    }

    fn prune(&self, cutoff: &str) -> Result<(), DatabaseError> {
        self.db.with_tx(|tx| {
            let applications = application_repo::delete_inactive_before(tx, cutoff)?;
            let emails = email_repo::delete_orphans_received_before(tx, cutoff)?;
            if applications + emails > 0 {
                info!("pruned {applications} application(s) and {emails} orphan email record(s)");
            }
            Ok(())
        })
    }

    fn store_checkpoint(&self, checkpoint: Option<&str>) -> Result<(), DatabaseError> {
        let synced_at = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            sync_state_repo::upsert_checkpoint(conn, &self.account, checkpoint, &synced_at)
        })
    }
}

/// Mailbox query for the expanded focus phrases, bounded by the lookback
/// window. Gmail syntax: quoted phrases OR-ed together.
fn build_focus_query(phrases: &[String], lookback_days: i64) -> String {
    let quoted: Vec<String> = phrases.iter().map(|p| format!("\"{p}\"")).collect();
    format!("({}) newer_than:{}d", quoted.join(" OR "), lookback_days.max(1))
}
