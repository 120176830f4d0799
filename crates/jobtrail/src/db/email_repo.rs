//! Repository for `email_records`: one row per provider message, unique on
//! `message_id`. Re-ingesting a message refreshes the derived fields but
//! keeps its identity and application link.

use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension, Row};

use super::error::Result;

/// SQLite caps bound parameters; dedup lookups chunk their IN clauses.
const IN_CLAUSE_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct EmailRecordRow {
    pub id: String,
    pub message_id: String,
    pub application_id: Option<String>,
    pub direction: String,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub received_at: String,
    pub headers_json: Option<String>,
    pub sender_domain: String,
    pub parsed_role: String,
    pub normalized_role: String,
    pub classification: String,
    pub group_sender_domain: String,
    pub group_subject_key: String,
    pub ai_extraction_json: Option<String>,
    pub ai_confidence: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

fn from_row(row: &Row<'_>) -> std::result::Result<EmailRecordRow, rusqlite::Error> {
    Ok(EmailRecordRow {
        id: row.get("id")?,
        message_id: row.get("message_id")?,
        application_id: row.get("application_id")?,
        direction: row.get("direction")?,
        from_address: row.get("from_address")?,
        to_address: row.get("to_address")?,
        subject: row.get("subject")?,
        text_body: row.get("text_body")?,
        html_body: row.get("html_body")?,
        received_at: row.get("received_at")?,
        headers_json: row.get("headers_json")?,
        sender_domain: row.get("sender_domain")?,
        parsed_role: row.get("parsed_role")?,
        normalized_role: row.get("normalized_role")?,
        classification: row.get("classification")?,
        group_sender_domain: row.get("group_sender_domain")?,
        group_subject_key: row.get("group_subject_key")?,
        ai_extraction_json: row.get("ai_extraction_json")?,
        ai_confidence: row.get("ai_confidence")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const COLUMNS: &str = "id, message_id, application_id, direction, from_address, to_address, \
                       subject, text_body, html_body, received_at, headers_json, sender_domain, \
                       parsed_role, normalized_role, classification, group_sender_domain, \
                       group_subject_key, ai_extraction_json, ai_confidence, created_at, updated_at";

/// Inserts the record, or refreshes the derived fields when the message was
/// already imported. `id`, `application_id` and `created_at` survive the
/// conflict path.
pub fn upsert(conn: &Connection, row: &EmailRecordRow) -> Result<()> {
    conn.execute(
        "INSERT INTO email_records (id, message_id, application_id, direction, from_address, \
         to_address, subject, text_body, html_body, received_at, headers_json, sender_domain, \
         parsed_role, normalized_role, classification, group_sender_domain, group_subject_key, \
         ai_extraction_json, ai_confidence, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
                 ?18, ?19, ?20, ?21) \
         ON CONFLICT (message_id) DO UPDATE SET \
             direction = excluded.direction, \
             from_address = excluded.from_address, \
             to_address = excluded.to_address, \
             subject = excluded.subject, \
             text_body = excluded.text_body, \
             html_body = excluded.html_body, \
             received_at = excluded.received_at, \
             headers_json = excluded.headers_json, \
             sender_domain = excluded.sender_domain, \
             parsed_role = excluded.parsed_role, \
             normalized_role = excluded.normalized_role, \
             classification = excluded.classification, \
             group_sender_domain = excluded.group_sender_domain, \
             group_subject_key = excluded.group_subject_key, \
             ai_extraction_json = excluded.ai_extraction_json, \
             ai_confidence = excluded.ai_confidence, \
             updated_at = excluded.updated_at",
        params![
            row.id,
            row.message_id,
            row.application_id,
            row.direction,
            row.from_address,
            row.to_address,
            row.subject,
            row.text_body,
            row.html_body,
            row.received_at,
            row.headers_json,
            row.sender_domain,
            row.parsed_role,
            row.normalized_role,
            row.classification,
            row.group_sender_domain,
            row.group_subject_key,
            row.ai_extraction_json,
            row.ai_confidence,
            row.created_at,
            row.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_message_id(conn: &Connection, message_id: &str) -> Result<Option<EmailRecordRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM email_records WHERE message_id = ?1"),
            params![message_id],
            from_row,
        )
        .optional()?;
    Ok(row)
}

/// Which of the given provider message ids are already imported. Queries
/// in batches of [`IN_CLAUSE_BATCH`].
pub fn existing_message_ids(conn: &Connection, ids: &[String]) -> Result<Vec<String>> {
    let mut existing = Vec::new();
    for chunk in ids.chunks(IN_CLAUSE_BATCH) {
        let placeholders = (1..=chunk.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT message_id FROM email_records WHERE message_id IN ({placeholders})"
        );
        let params: Vec<SqlValue> = chunk.iter().map(|id| SqlValue::from(id.clone())).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        existing.extend(rows);
    }
    Ok(existing)
}

pub fn link_application(conn: &Connection, message_id: &str, application_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE email_records SET application_id = ?2 WHERE message_id = ?1",
        params![message_id, application_id],
    )?;
    Ok(())
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM email_records", [], |r| r.get(0))?)
}

pub fn count_for_application(conn: &Connection, application_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM email_records WHERE application_id = ?1",
        params![application_id],
        |r| r.get(0),
    )?)
}

/// Prunes unlinked records older than `cutoff`. Linked records live and die
/// with their application.
pub fn delete_orphans_received_before(conn: &Connection, cutoff: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM email_records WHERE application_id IS NULL AND received_at < ?1",
        params![cutoff],
    )?)
}

pub fn delete_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM email_records", [])?)
}

#[cfg(test)]
pub fn test_row(message_id: &str) -> EmailRecordRow {
    let now = chrono::Utc::now().to_rfc3339();
    EmailRecordRow {
        id: uuid::Uuid::new_v4().to_string(),
        message_id: message_id.to_string(),
        application_id: None,
        direction: "inbound".to_string(),
        from_address: "jobs@acme.com".to_string(),
        to_address: "me@example.com".to_string(),
        subject: "Thanks for applying to Acme".to_string(),
        text_body: "We received your application.".to_string(),
        html_body: String::new(),
        received_at: now.clone(),
        headers_json: None,
        sender_domain: "acme.com".to_string(),
        parsed_role: "unknown-role".to_string(),
        normalized_role: "unknown-role".to_string(),
        classification: "received".to_string(),
        group_sender_domain: "acme.com".to_string(),
        group_subject_key: "acme".to_string(),
        ai_extraction_json: None,
        ai_confidence: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{application_repo, Database};

    #[test]
    fn upsert_is_idempotent_on_message_id() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mut row = test_row("m1");
            upsert(conn, &row)?;

            // Second ingest with a new surrogate id must not duplicate.
            row.id = uuid::Uuid::new_v4().to_string();
            row.subject = "updated subject".to_string();
            upsert(conn, &row)?;

            assert_eq!(count(conn)?, 1);
            let found = find_by_message_id(conn, "m1")?.unwrap();
            assert_eq!(found.subject, "updated subject");
            assert_ne!(found.id, row.id, "surrogate id survives the conflict");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn existing_message_ids_filters() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            upsert(conn, &test_row("m1"))?;
            upsert(conn, &test_row("m3"))?;

            let ids: Vec<String> = ["m1", "m2", "m3", "m4"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let mut existing = existing_message_ids(conn, &ids)?;
            existing.sort();
            assert_eq!(existing, vec!["m1".to_string(), "m3".to_string()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn existing_message_ids_handles_large_batches() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            upsert(conn, &test_row("m0"))?;
            upsert(conn, &test_row("m700"))?;

            let ids: Vec<String> = (0..1200).map(|i| format!("m{i}")).collect();
            let mut existing = existing_message_ids(conn, &ids)?;
            existing.sort();
            assert_eq!(existing, vec!["m0".to_string(), "m700".to_string()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn link_application_and_cascade_delete() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let app = application_repo::test_row("acme.com", "acme");
            application_repo::insert(conn, &app)?;
            upsert(conn, &test_row("m1"))?;
            link_application(conn, "m1", &app.id)?;
            assert_eq!(count_for_application(conn, &app.id)?, 1);

            application_repo::delete_all(conn)?;
            assert_eq!(count(conn)?, 0, "records cascade with their application");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn orphan_pruning_spares_linked_records() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let app = application_repo::test_row("acme.com", "acme");
            application_repo::insert(conn, &app)?;

            let mut linked = test_row("linked");
            linked.application_id = Some(app.id.clone());
            linked.received_at = "2020-01-01T00:00:00+00:00".to_string();
            upsert(conn, &linked)?;

            let mut orphan = test_row("orphan");
            orphan.received_at = "2020-01-01T00:00:00+00:00".to_string();
            upsert(conn, &orphan)?;

            let deleted = delete_orphans_received_before(conn, "2025-01-01T00:00:00+00:00")?;
            assert_eq!(deleted, 1);
            assert!(find_by_message_id(conn, "linked")?.is_some());
            assert!(find_by_message_id(conn, "orphan")?.is_none());
            Ok(())
        })
        .unwrap();
    }
}
