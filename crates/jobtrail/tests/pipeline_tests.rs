//! End-to-end pipeline tests: a mock mailbox provider and a scripted text
//! generator drive the real engine against an in-memory database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;

use jobtrail::ai::{GenerateError, TextGenerator};
use jobtrail::config::{AiSettings, Settings, StaticSettings};
use jobtrail::db::{
    application_repo, email_repo, event_repo, followup_repo, sync_state_repo, Database,
};
use jobtrail::mail::error::{MailError, Result as MailResult};
use jobtrail::mail::{ChangeSet, Header, MailboxProvider, MessagePart, PartBody, RawMessage};
use jobtrail::sync::SyncEngine;

const ACCOUNT: &str = "me@example.com";

// Fixed epoch-milliseconds base inside the lookback window used by tests.
const TS_BASE: i64 = 1_760_000_000_000;

struct MockProvider {
    messages: Vec<RawMessage>,
    checkpoint: Option<String>,
    /// After this many successful fetches, further fetches are rate
    /// limited.
    rate_limit_after: Option<usize>,
    /// Full queries return nothing; only the history path sees the
    /// messages.
    list_empty: bool,
    /// The history endpoint rejects the checkpoint, as with an expired one.
    history_fails: bool,
    fetches: Mutex<usize>,
}

impl MockProvider {
    fn new(messages: Vec<RawMessage>) -> Self {
        MockProvider {
            messages,
            checkpoint: Some("hist-1".to_string()),
            rate_limit_after: None,
            list_empty: false,
            history_fails: false,
            fetches: Mutex::new(0),
        }
    }
}

#[async_trait]
impl MailboxProvider for MockProvider {
    async fn list_message_ids(&self, _query: &str, _max_results: u32) -> MailResult<Vec<String>> {
        if self.list_empty {
            return Ok(vec![]);
        }
        Ok(self.messages.iter().map(|m| m.id.clone()).collect())
    }

    async fn get_message(&self, id: &str) -> MailResult<RawMessage> {
        let mut fetches = self.fetches.lock().unwrap();
        if let Some(limit) = self.rate_limit_after {
            if *fetches >= limit {
                return Err(MailError::RateLimited("quota exceeded".to_string()));
            }
        }
        *fetches += 1;
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(MailError::Status(404))
    }

    async fn changes_since(&self, _checkpoint: &str) -> MailResult<ChangeSet> {
        if self.history_fails {
            return Err(MailError::Status(404));
        }
        Ok(ChangeSet {
            ids: self.messages.iter().map(|m| m.id.clone()).collect(),
            checkpoint: self.checkpoint.clone(),
        })
    }

    async fn latest_checkpoint(&self) -> MailResult<Option<String>> {
        Ok(self.checkpoint.clone())
    }
}

struct ScriptedGenerator {
    responses: Mutex<Vec<Result<String, GenerateError>>>,
    calls: Mutex<u32>,
}

impl ScriptedGenerator {
    fn new(responses: Vec<Result<String, GenerateError>>) -> Self {
        ScriptedGenerator {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
        }
    }

    fn unused() -> Self {
        Self::new(vec![])
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _model: &str, _prompt: &str) -> Result<String, GenerateError> {
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(GenerateError::Network("no scripted response".to_string()))
        } else {
            responses.remove(0)
        }
    }
}

fn plain_message(id: &str, from: &str, subject: &str, body: &str, ts_offset_ms: i64) -> RawMessage {
    let data = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body);
    RawMessage {
        id: id.to_string(),
        history_id: None,
        internal_date: Some((TS_BASE + ts_offset_ms).to_string()),
        payload: Some(MessagePart {
            mime_type: "text/plain".to_string(),
            headers: vec![
                Header {
                    name: "From".to_string(),
                    value: from.to_string(),
                },
                Header {
                    name: "To".to_string(),
                    value: ACCOUNT.to_string(),
                },
                Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
            ],
            body: Some(PartBody {
                data: Some(data),
                size: body.len() as i64,
            }),
            parts: vec![],
        }),
    }
}

fn test_settings(ai_enabled: bool) -> Settings {
    Settings {
        focus_phrases: vec!["thanks for applying".to_string()],
        sync_lookback_days: 3650,
        followup_after_days: 5,
        fetch_delay_ms: 0,
        ai: AiSettings {
            enabled: ai_enabled,
            ..AiSettings::default()
        },
    }
}

fn seeded_application(
    domain: &str,
    subject_key: &str,
    status: &str,
    locked: bool,
) -> jobtrail::db::application_repo::ApplicationRow {
    let now = chrono::Utc::now().to_rfc3339();
    jobtrail::db::application_repo::ApplicationRow {
        id: uuid::Uuid::new_v4().to_string(),
        company_name: "Acme".to_string(),
        company_domain: domain.to_string(),
        role_title: "Software Engineer".to_string(),
        normalized_role_title: "software-engineer".to_string(),
        status: status.to_string(),
        group_sender_domain: domain.to_string(),
        group_subject_key: subject_key.to_string(),
        first_seen_at: now.clone(),
        last_activity_at: now.clone(),
        manual_status_locked: locked,
        notes: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn engine(
    provider: Option<MockProvider>,
    generator: Arc<ScriptedGenerator>,
    settings: Settings,
) -> SyncEngine {
    let db = Database::open_in_memory().unwrap();
    SyncEngine::new(
        db,
        provider.map(|p| Arc::new(p) as Arc<dyn MailboxProvider>),
        generator,
        Arc::new(StaticSettings(settings)),
        ACCOUNT,
    )
}

#[tokio::test]
async fn fails_without_connected_account() {
    let engine = engine(None, Arc::new(ScriptedGenerator::unused()), test_settings(false));
    let outcome = engine.run().await;
    assert!(!outcome.ok);
    assert_eq!(outcome.reason.as_deref(), Some("no connected account"));
}

#[tokio::test]
async fn confirmation_then_interview_yields_one_application() {
    let messages = vec![
        plain_message(
            "m1",
            "\"Acme Careers\" <jobs@acme.com>",
            "Thanks for applying to Acme",
            "Thank you for applying to Acme. We received your application for Software Engineer.",
            0,
        ),
        plain_message(
            "m2",
            "\"Acme Careers\" <jobs@acme.com>",
            "Your interview with Acme",
            "Hi! Thanks for applying to Acme. We would like to schedule an interview with you.",
            60_000,
        ),
    ];
    let extraction = |status: &str| {
        format!(
            r#"{{"include": true, "companyName": "Acme", "companyDomain": "acme.com",
                "roleTitle": "Software Engineer", "status": "{status}",
                "normalizedSubjectKey": "acme", "confidence": 0.92}}"#
        )
    };
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(extraction("received")),
        Ok(extraction("interview")),
    ]));
    let engine = engine(Some(MockProvider::new(messages)), generator, test_settings(true));

    let outcome = engine.run().await;
    assert!(outcome.ok, "reason: {:?}", outcome.reason);
    assert_eq!(outcome.stats.scanned, 2);
    assert_eq!(outcome.stats.imported_emails, 2);
    assert_eq!(outcome.stats.applications_created, 1);
    assert_eq!(outcome.stats.applications_updated, 1);
    assert_eq!(outcome.stats.statuses_updated, 1);
    assert_eq!(outcome.stats.ai_processed, 2);
    assert_eq!(outcome.stats.errors, 0);

    engine
        .database()
        .with_conn(|conn| {
            assert_eq!(application_repo::count(conn)?, 1);
            let app = application_repo::find_by_group_key(conn, "acme.com", "acme")?.unwrap();
            assert_eq!(app.status, "interview");
            assert_eq!(app.company_name, "Acme");
            assert_eq!(app.role_title, "Software Engineer");

            // Both emails imported and linked to the one application.
            assert_eq!(email_repo::count(conn)?, 2);
            for id in ["m1", "m2"] {
                let record = email_repo::find_by_message_id(conn, id)?.unwrap();
                assert_eq!(record.application_id.as_deref(), Some(app.id.as_str()));
            }

            let events = event_repo::list_for_application(conn, &app.id)?;
            let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
            assert_eq!(kinds, vec!["application_received", "status_changed"]);

            // Event details carry the subject-candidate split for debugging.
            let details: serde_json::Value =
                serde_json::from_str(events[0].details_json.as_deref().unwrap()).unwrap();
            assert_eq!(details["subjectCandidates"]["company"], "Acme");
            assert!(details["subjectCandidates"]["role"].is_null());

            assert_eq!(followup_repo::count_open_for_application(conn, &app.id)?, 1);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn rerunning_the_same_mailbox_is_idempotent() {
    let messages = vec![plain_message(
        "m1",
        "jobs@acme.com",
        "Thanks for applying to Acme",
        "Thanks for applying! We received your application.",
        0,
    )];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    let first = engine.run().await;
    assert!(first.ok);
    assert_eq!(first.stats.imported_emails, 1);
    assert_eq!(first.stats.applications_created, 1);

    let second = engine.run().await;
    assert!(second.ok);
    assert_eq!(second.stats.scanned, 1, "candidate is still listed");
    assert_eq!(second.stats.imported_emails, 0, "but not re-imported");
    assert_eq!(second.stats.applications_created, 0);

    engine
        .database()
        .with_conn(|conn| {
            assert_eq!(application_repo::count(conn)?, 1);
            assert_eq!(email_repo::count(conn)?, 1);
            let app = application_repo::find_by_group_key(conn, "acme.com", "acme")?.unwrap();
            assert_eq!(followup_repo::count_open_for_application(conn, &app.id)?, 1);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn reworded_subjects_converge_to_one_group_without_ai() {
    let messages = vec![
        plain_message(
            "m1",
            "jobs@acme.com",
            "Thanks for applying to Acme - Software Engineer",
            "Thanks for applying! We received your application.",
            0,
        ),
        plain_message(
            "m2",
            "jobs@acme.com",
            "RE: Thanks for applying for Acme, Software Engineer!",
            "Just following up: thanks for applying, we are still reviewing.",
            60_000,
        ),
    ];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.applications_created, 1);
    assert_eq!(outcome.stats.applications_updated, 1);

    engine
        .database()
        .with_conn(|conn| {
            assert_eq!(application_repo::count(conn)?, 1);
            let app =
                application_repo::find_by_group_key(conn, "acme.com", "acme-software-engineer")?
                    .unwrap();
            assert_eq!(email_repo::count_for_application(conn, &app.id)?, 2);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn manual_status_lock_survives_conflicting_classification() {
    let messages = vec![plain_message(
        "m1",
        "jobs@acme.com",
        "Re: Thanks for applying to Acme",
        "Unfortunately we will not be moving forward. Thanks for applying anyway.",
        0,
    )];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    // Seed the application the user already curated by hand.
    let seeded = engine
        .database()
        .with_conn(|conn| {
            let app = seeded_application("acme.com", "acme", "interview", true);
            application_repo::insert(conn, &app)?;
            Ok(app)
        })
        .unwrap();

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.imported_emails, 1);
    assert_eq!(outcome.stats.applications_updated, 1);
    assert_eq!(outcome.stats.statuses_updated, 0, "locked status untouched");

    engine
        .database()
        .with_conn(|conn| {
            let app = application_repo::find_by_id(conn, &seeded.id)?.unwrap();
            assert_eq!(app.status, "interview");
            assert_ne!(app.last_activity_at, seeded.last_activity_at, "activity still bumps");

            let events = event_repo::list_for_application(conn, &app.id)?;
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].event_type, "email_received");
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn noise_domain_mail_is_skipped() {
    let messages = vec![plain_message(
        "m1",
        "Recruiter <someone@gmail.com>",
        "Thanks for applying!",
        "Thanks for applying, I have an amazing opportunity for you.",
        0,
    )];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.imported_emails, 0);

    engine
        .database()
        .with_conn(|conn| {
            assert_eq!(application_repo::count(conn)?, 0);
            assert_eq!(email_repo::count(conn)?, 0);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn messages_without_focus_phrase_are_skipped() {
    let messages = vec![plain_message(
        "m1",
        "news@acme.com",
        "Acme product newsletter",
        "All the latest from Acme engineering.",
        0,
    )];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.imported_emails, 0);
}

#[tokio::test]
async fn rate_limit_mid_run_is_a_successful_partial() {
    let messages = vec![
        plain_message(
            "m1",
            "jobs@acme.com",
            "Thanks for applying to Acme",
            "Thanks for applying! We received your application.",
            0,
        ),
        plain_message(
            "m2",
            "jobs@globex.com",
            "Thanks for applying to Globex",
            "Thanks for applying! We received your application.",
            60_000,
        ),
    ];
    let mut provider = MockProvider::new(messages);
    provider.rate_limit_after = Some(1);

    let engine = engine(
        Some(provider),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );
    let outcome = engine.run().await;

    assert!(outcome.ok, "rate limit must not fail the run");
    assert!(outcome.reason.as_deref().unwrap_or("").contains("rate limit"));
    assert_eq!(outcome.stats.imported_emails, 1);
    assert_eq!(outcome.stats.applications_created, 1);
}

#[tokio::test]
async fn checkpoint_is_persisted_even_with_no_new_mail() {
    let mut provider = MockProvider::new(vec![]);
    provider.checkpoint = Some("hist-777".to_string());

    let engine = engine(
        Some(provider),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );
    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.imported_emails, 0);

    engine
        .database()
        .with_conn(|conn| {
            let state = sync_state_repo::get(conn, ACCOUNT)?.unwrap();
            assert_eq!(state.checkpoint.as_deref(), Some("hist-777"));
            assert!(state.last_synced_at.is_some());
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn ai_exclusion_keeps_mail_out_of_the_tracker() {
    let messages = vec![plain_message(
        "m1",
        "store@acme.com",
        "Thanks for applying the discount code",
        "Thanks for applying the code, your order shipped.",
        0,
    )];
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
        r#"{"include": false, "confidence": 0.95}"#.to_string(),
    )]));
    let engine = engine(Some(MockProvider::new(messages)), generator, test_settings(true));

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.ai_skipped, 1);
    assert_eq!(outcome.stats.imported_emails, 0);

    engine
        .database()
        .with_conn(|conn| {
            assert_eq!(application_repo::count(conn)?, 0);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn two_ai_timeouts_open_the_breaker_for_the_rest_of_the_run() {
    let messages = vec![
        plain_message("m1", "jobs@acme.com", "Thanks for applying to Acme",
            "Thanks for applying! We received your application.", 0),
        plain_message("m2", "jobs@acme.com", "RE: Thanks for applying to Acme",
            "Thanks for applying! Still under review.", 60_000),
        plain_message("m3", "jobs@acme.com", "RE: RE: Thanks for applying to Acme",
            "Thanks for applying! Still under review.", 120_000),
    ];
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerateError::Timeout),
        Err(GenerateError::Timeout),
        Ok("never reached".to_string()),
    ]));
    let engine = engine(
        Some(MockProvider::new(messages)),
        generator.clone(),
        test_settings(true),
    );

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(generator.calls(), 2, "third message must not hit the model");
    assert_eq!(outcome.stats.ai_fallback_used, 3);
    assert_eq!(outcome.stats.imported_emails, 3, "fallback still ingests");

    engine
        .database()
        .with_conn(|conn| {
            // All three replies share one group.
            assert_eq!(application_repo::count(conn)?, 1);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn prose_role_captures_fall_back_to_unknown_role() {
    let messages = vec![plain_message(
        "m1",
        "jobs@acme.com",
        "Thanks for applying to Acme",
        "Thanks for applying! We received your application for the position at our office.",
        0,
    )];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.applications_created, 1);

    engine
        .database()
        .with_conn(|conn| {
            let app = application_repo::find_by_group_key(conn, "acme.com", "acme")?.unwrap();
            assert_eq!(app.role_title, "unknown-role");
            assert_eq!(app.normalized_role_title, "unknown-role");
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn real_role_backfills_over_unknown_role_later() {
    let messages = vec![
        plain_message(
            "m1",
            "jobs@acme.com",
            "Thanks for applying to Acme",
            "Thanks for applying! We received your application for the position at our office.",
            0,
        ),
        plain_message(
            "m2",
            "jobs@acme.com",
            "Re: Thanks for applying to Acme",
            "Thanks for applying! We received your application for Software Engineer.",
            60_000,
        ),
    ];
    let engine = engine(
        Some(MockProvider::new(messages)),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.applications_created, 1);
    assert_eq!(outcome.stats.applications_updated, 1);

    engine
        .database()
        .with_conn(|conn| {
            let app = application_repo::find_by_group_key(conn, "acme.com", "acme")?.unwrap();
            assert_eq!(app.role_title, "Software Engineer");
            assert_eq!(app.normalized_role_title, "software-engineer");
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn stored_checkpoint_switches_to_incremental_fetch() {
    let mut provider = MockProvider::new(vec![plain_message(
        "m1",
        "jobs@acme.com",
        "Thanks for applying to Acme",
        "Thanks for applying! We received your application.",
        0,
    )]);
    provider.list_empty = true;

    let engine = engine(
        Some(provider),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );
    engine
        .database()
        .with_conn(|conn| {
            sync_state_repo::upsert_checkpoint(
                conn,
                ACCOUNT,
                Some("hist-0"),
                "2026-01-01T00:00:00+00:00",
            )
        })
        .unwrap();

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.imported_emails, 1, "id came via the history path");
    assert_eq!(outcome.stats.applications_created, 1);
}

#[tokio::test]
async fn expired_checkpoint_falls_back_to_the_full_query() {
    let mut provider = MockProvider::new(vec![plain_message(
        "m1",
        "jobs@acme.com",
        "Thanks for applying to Acme",
        "Thanks for applying! We received your application.",
        0,
    )]);
    provider.history_fails = true;

    let engine = engine(
        Some(provider),
        Arc::new(ScriptedGenerator::unused()),
        test_settings(false),
    );
    engine
        .database()
        .with_conn(|conn| {
            sync_state_repo::upsert_checkpoint(
                conn,
                ACCOUNT,
                Some("hist-stale"),
                "2026-01-01T00:00:00+00:00",
            )
        })
        .unwrap();

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.imported_emails, 1);
}

#[tokio::test]
async fn ai_fallback_counts_low_confidence_extractions() {
    let messages = vec![plain_message(
        "m1",
        "jobs@acme.com",
        "Thanks for applying to Acme",
        "Thanks for applying! We received your application.",
        0,
    )];
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
        r#"{"include": true, "status": "offer", "confidence": 0.2}"#.to_string(),
    )]));
    let engine = engine(Some(MockProvider::new(messages)), generator, test_settings(true));

    let outcome = engine.run().await;
    assert!(outcome.ok);
    assert_eq!(outcome.stats.ai_fallback_used, 1);
    assert_eq!(outcome.stats.ai_processed, 0);

    engine
        .database()
        .with_conn(|conn| {
            // The low-confidence "offer" is ignored; the rules decide.
            let app = application_repo::find_by_group_key(conn, "acme.com", "acme")?.unwrap();
            assert_eq!(app.status, "received");
            Ok(())
        })
        .unwrap();
}
