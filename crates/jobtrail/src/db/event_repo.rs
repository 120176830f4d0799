//! Append-only `application_events` timeline.

use rusqlite::{params, Connection, Row};

use super::error::Result;

#[derive(Debug, Clone)]
pub struct ApplicationEventRow {
    pub id: String,
    pub application_id: String,
    pub event_type: String,
    pub details_json: Option<String>,
    pub created_at: String,
}

fn from_row(row: &Row<'_>) -> std::result::Result<ApplicationEventRow, rusqlite::Error> {
    Ok(ApplicationEventRow {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        event_type: row.get("event_type")?,
        details_json: row.get("details_json")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(conn: &Connection, row: &ApplicationEventRow) -> Result<()> {
    conn.execute(
        "INSERT INTO application_events (id, application_id, event_type, details_json, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.id,
            row.application_id,
            row.event_type,
            row.details_json,
            row.created_at,
        ],
    )?;
    Ok(())
}

/// Events for one application, oldest first. Insertion order breaks ties
/// within one timestamp.
pub fn list_for_application(
    conn: &Connection,
    application_id: &str,
) -> Result<Vec<ApplicationEventRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, event_type, details_json, created_at \
         FROM application_events WHERE application_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![application_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<ApplicationEventRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, event_type, details_json, created_at \
         FROM application_events ORDER BY created_at DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_for_application(conn: &Connection, application_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM application_events WHERE application_id = ?1",
        params![application_id],
        |r| r.get(0),
    )?)
}
