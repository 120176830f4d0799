//! Read-only projections for dashboards and status commands: pipeline
//! counts per status, a per-company rollup, and follow-ups coming due.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::error::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: String,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRollup {
    pub company_name: String,
    pub company_domain: String,
    pub applications: i64,
    pub last_activity_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueFollowup {
    pub application_id: String,
    pub company_name: String,
    pub role_title: String,
    pub due_at: String,
    pub reason: String,
}

pub fn status_counts(conn: &Connection) -> Result<Vec<StatusCount>> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) AS total FROM applications \
         GROUP BY status ORDER BY total DESC, status ASC",
    )?;
    let rows = stmt
        .query_map([], |row: &Row<'_>| {
            Ok(StatusCount {
                status: row.get("status")?,
                total: row.get("total")?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn company_rollup(conn: &Connection) -> Result<Vec<CompanyRollup>> {
    let mut stmt = conn.prepare(
        "SELECT company_name, company_domain, COUNT(*) AS applications, \
                MAX(last_activity_at) AS last_activity_at \
         FROM applications GROUP BY company_domain, company_name \
         ORDER BY last_activity_at DESC",
    )?;
    let rows = stmt
        .query_map([], |row: &Row<'_>| {
            Ok(CompanyRollup {
                company_name: row.get("company_name")?,
                company_domain: row.get("company_domain")?,
                applications: row.get("applications")?,
                last_activity_at: row.get("last_activity_at")?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Open follow-up tasks due on or before `before`, soonest first.
pub fn due_followups(conn: &Connection, before: &str) -> Result<Vec<DueFollowup>> {
    let mut stmt = conn.prepare(
        "SELECT t.application_id, a.company_name, a.role_title, t.due_at, t.reason \
         FROM followup_tasks t JOIN applications a ON a.id = t.application_id \
         WHERE t.status = 'open' AND t.due_at <= ?1 ORDER BY t.due_at ASC",
    )?;
    let rows = stmt
        .query_map(params![before], |row: &Row<'_>| {
            Ok(DueFollowup {
                application_id: row.get("application_id")?,
                company_name: row.get("company_name")?,
                role_title: row.get("role_title")?,
                due_at: row.get("due_at")?,
                reason: row.get("reason")?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
