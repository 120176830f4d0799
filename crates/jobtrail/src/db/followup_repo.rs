//! `followup_tasks` rows. The invariant (at most one open task per
//! application) is owned by [`crate::followup`]; this module is plain row
//! access.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::Result;

pub const STATUS_OPEN: &str = "open";
pub const STATUS_DONE: &str = "done";

#[derive(Debug, Clone)]
pub struct FollowupTaskRow {
    pub id: String,
    pub application_id: String,
    pub status: String,
    pub due_at: String,
    pub reason: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

fn from_row(row: &Row<'_>) -> std::result::Result<FollowupTaskRow, rusqlite::Error> {
    Ok(FollowupTaskRow {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        status: row.get("status")?,
        due_at: row.get("due_at")?,
        reason: row.get("reason")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

const COLUMNS: &str =
    "id, application_id, status, due_at, reason, created_at, updated_at, completed_at";

pub fn insert(conn: &Connection, row: &FollowupTaskRow) -> Result<()> {
    conn.execute(
        "INSERT INTO followup_tasks (id, application_id, status, due_at, reason, created_at, \
         updated_at, completed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.application_id,
            row.status,
            row.due_at,
            row.reason,
            row.created_at,
            row.updated_at,
            row.completed_at,
        ],
    )?;
    Ok(())
}

pub fn find_open_for_application(
    conn: &Connection,
    application_id: &str,
) -> Result<Option<FollowupTaskRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM followup_tasks \
                 WHERE application_id = ?1 AND status = '{STATUS_OPEN}' LIMIT 1"
            ),
            params![application_id],
            from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn update_due(conn: &Connection, id: &str, due_at: &str, updated_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE followup_tasks SET due_at = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, due_at, updated_at],
    )?;
    Ok(())
}

pub fn mark_done(conn: &Connection, id: &str, completed_at: &str) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE followup_tasks SET status = '{STATUS_DONE}', completed_at = ?2, \
             updated_at = ?2 WHERE id = ?1"
        ),
        params![id, completed_at],
    )?;
    Ok(())
}

pub fn count_open_for_application(conn: &Connection, application_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM followup_tasks \
             WHERE application_id = ?1 AND status = '{STATUS_OPEN}'"
        ),
        params![application_id],
        |r| r.get(0),
    )?)
}
