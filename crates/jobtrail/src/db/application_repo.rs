//! Repository for the `applications` table: one row per logical
//! application, unique on `(group_sender_domain, group_subject_key)`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::Result;
use super::event_repo::{self, ApplicationEventRow};
use crate::status::{ApplicationStatus, EventType};

#[derive(Debug, Clone)]
pub struct ApplicationRow {
    pub id: String,
    pub company_name: String,
    pub company_domain: String,
    pub role_title: String,
    pub normalized_role_title: String,
    pub status: String,
    pub group_sender_domain: String,
    pub group_subject_key: String,
    pub first_seen_at: String,
    pub last_activity_at: String,
    pub manual_status_locked: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields a manual edit may change; `None` leaves the field untouched.
#[derive(Debug, Default, Clone)]
pub struct ManualUpdate {
    pub status: Option<ApplicationStatus>,
    pub notes: Option<String>,
    pub lock_status: Option<bool>,
}

fn from_row(row: &Row<'_>) -> std::result::Result<ApplicationRow, rusqlite::Error> {
    let locked: i64 = row.get("manual_status_locked")?;
    Ok(ApplicationRow {
        id: row.get("id")?,
        company_name: row.get("company_name")?,
        company_domain: row.get("company_domain")?,
        role_title: row.get("role_title")?,
        normalized_role_title: row.get("normalized_role_title")?,
        status: row.get("status")?,
        group_sender_domain: row.get("group_sender_domain")?,
        group_subject_key: row.get("group_subject_key")?,
        first_seen_at: row.get("first_seen_at")?,
        last_activity_at: row.get("last_activity_at")?,
        manual_status_locked: locked != 0,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const COLUMNS: &str = "id, company_name, company_domain, role_title, normalized_role_title, \
                       status, group_sender_domain, group_subject_key, first_seen_at, \
                       last_activity_at, manual_status_locked, notes, created_at, updated_at";

pub fn insert(conn: &Connection, row: &ApplicationRow) -> Result<()> {
    conn.execute(
        "INSERT INTO applications (id, company_name, company_domain, role_title, \
         normalized_role_title, status, group_sender_domain, group_subject_key, \
         first_seen_at, last_activity_at, manual_status_locked, notes, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            row.id,
            row.company_name,
            row.company_domain,
            row.role_title,
            row.normalized_role_title,
            row.status,
            row.group_sender_domain,
            row.group_subject_key,
            row.first_seen_at,
            row.last_activity_at,
            row.manual_status_locked as i64,
            row.notes,
            row.created_at,
            row.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, row: &ApplicationRow) -> Result<()> {
    conn.execute(
        "UPDATE applications SET company_name = ?2, company_domain = ?3, role_title = ?4, \
         normalized_role_title = ?5, status = ?6, first_seen_at = ?7, last_activity_at = ?8, \
         manual_status_locked = ?9, notes = ?10, updated_at = ?11 WHERE id = ?1",
        params![
            row.id,
            row.company_name,
            row.company_domain,
            row.role_title,
            row.normalized_role_title,
            row.status,
            row.first_seen_at,
            row.last_activity_at,
            row.manual_status_locked as i64,
            row.notes,
            row.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<ApplicationRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM applications WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_by_group_key(
    conn: &Connection,
    group_sender_domain: &str,
    group_subject_key: &str,
) -> Result<Option<ApplicationRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM applications \
                 WHERE group_sender_domain = ?1 AND group_subject_key = ?2"
            ),
            params![group_sender_domain, group_subject_key],
            from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_all(conn: &Connection) -> Result<Vec<ApplicationRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM applications ORDER BY last_activity_at DESC"
    ))?;
    let rows = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM applications", [], |r| r.get(0))?)
}

/// Deletes applications whose last activity predates `cutoff`; owned email
/// records, events and follow-up tasks go with them via cascade.
pub fn delete_inactive_before(conn: &Connection, cutoff: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM applications WHERE last_activity_at < ?1",
        params![cutoff],
    )?)
}

/// Wipes every application (and cascaded rows). Used by the bulk reset.
pub fn delete_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM applications", [])?)
}

/// Applies a user edit and records a `manual_update` event. Setting the
/// status also locks it against automated changes unless the caller says
/// otherwise. Returns the updated row, or `None` for an unknown id.
pub fn apply_manual_update(
    conn: &Connection,
    id: &str,
    edit: &ManualUpdate,
    now: &str,
) -> Result<Option<ApplicationRow>> {
    let Some(mut row) = find_by_id(conn, id)? else {
        return Ok(None);
    };

    let mut changes = serde_json::Map::new();
    if let Some(status) = edit.status {
        changes.insert(
            "status".to_string(),
            serde_json::json!({"from": row.status, "to": status.as_str()}),
        );
        row.status = status.as_str().to_string();
        row.manual_status_locked = edit.lock_status.unwrap_or(true);
    } else if let Some(lock) = edit.lock_status {
        row.manual_status_locked = lock;
        changes.insert("lockStatus".to_string(), serde_json::json!(lock));
    }
    if let Some(notes) = &edit.notes {
        row.notes = Some(notes.clone());
        changes.insert("notes".to_string(), serde_json::json!(true));
    }
    row.updated_at = now.to_string();
    update(conn, &row)?;

    event_repo::insert(
        conn,
        &ApplicationEventRow {
            id: uuid::Uuid::new_v4().to_string(),
            application_id: row.id.clone(),
            event_type: EventType::ManualUpdate.as_str().to_string(),
            details_json: Some(serde_json::Value::Object(changes).to_string()),
            created_at: now.to_string(),
        },
    )?;

    Ok(Some(row))
}

#[cfg(test)]
pub fn test_row(group_sender_domain: &str, group_subject_key: &str) -> ApplicationRow {
    let now = chrono::Utc::now().to_rfc3339();
    ApplicationRow {
        id: uuid::Uuid::new_v4().to_string(),
        company_name: "Acme".to_string(),
        company_domain: "acme.com".to_string(),
        role_title: "Software Engineer".to_string(),
        normalized_role_title: "software-engineer".to_string(),
        status: "received".to_string(),
        group_sender_domain: group_sender_domain.to_string(),
        group_subject_key: group_subject_key.to_string(),
        first_seen_at: now.clone(),
        last_activity_at: now.clone(),
        manual_status_locked: false,
        notes: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn insert_and_find_by_group_key() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let row = test_row("acme.com", "acme-software-engineer");
            insert(conn, &row)?;

            let found = find_by_group_key(conn, "acme.com", "acme-software-engineer")?.unwrap();
            assert_eq!(found.id, row.id);
            assert_eq!(found.company_name, "Acme");
            assert!(!found.manual_status_locked);

            assert!(find_by_group_key(conn, "acme.com", "other-key")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn group_key_is_unique() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert(conn, &test_row("acme.com", "k"))?;
            assert!(insert(conn, &test_row("acme.com", "k")).is_err());
            // Same key under another domain is a different application.
            insert(conn, &test_row("globex.com", "k"))?;
            assert_eq!(count(conn)?, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn update_round_trips() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mut row = test_row("acme.com", "k");
            insert(conn, &row)?;
            row.status = "interview".to_string();
            row.manual_status_locked = true;
            update(conn, &row)?;

            let found = find_by_id(conn, &row.id)?.unwrap();
            assert_eq!(found.status, "interview");
            assert!(found.manual_status_locked);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn manual_update_sets_status_lock_and_event() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let row = test_row("acme.com", "k");
            insert(conn, &row)?;

            let edit = ManualUpdate {
                status: Some(ApplicationStatus::Withdrawn),
                notes: Some("not a fit".to_string()),
                lock_status: None,
            };
            let updated = apply_manual_update(conn, &row.id, &edit, "2026-01-01T00:00:00+00:00")?
                .unwrap();
            assert_eq!(updated.status, "withdrawn");
            assert!(updated.manual_status_locked);
            assert_eq!(updated.notes.as_deref(), Some("not a fit"));

            let events = event_repo::list_for_application(conn, &row.id)?;
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].event_type, "manual_update");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn manual_update_unknown_id_is_none() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let edit = ManualUpdate::default();
            assert!(apply_manual_update(conn, "missing", &edit, "now")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_inactive_before_prunes_old_rows() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mut old = test_row("old.com", "k");
            old.last_activity_at = "2020-01-01T00:00:00+00:00".to_string();
            insert(conn, &old)?;
            insert(conn, &test_row("new.com", "k"))?;

            let deleted = delete_inactive_before(conn, "2025-01-01T00:00:00+00:00")?;
            assert_eq!(deleted, 1);
            assert!(find_by_id(conn, &old.id)?.is_none());
            Ok(())
        })
        .unwrap();
    }
}
