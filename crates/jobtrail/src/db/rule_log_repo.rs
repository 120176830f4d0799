//! `classification_rule_log`: one row per ingested message recording which
//! rule fired, at what confidence, and whether AI output was used. Exists
//! for tuning the rule set against real mail.

use rusqlite::{params, Connection, Row};

use super::error::Result;

#[derive(Debug, Clone)]
pub struct RuleLogRow {
    pub id: String,
    pub message_id: String,
    pub matched_rule: Option<String>,
    pub predicted_status: String,
    pub confidence: f64,
    pub used_ai: bool,
    pub ai_error: Option<String>,
    pub created_at: String,
}

fn from_row(row: &Row<'_>) -> std::result::Result<RuleLogRow, rusqlite::Error> {
    let used_ai: i64 = row.get("used_ai")?;
    Ok(RuleLogRow {
        id: row.get("id")?,
        message_id: row.get("message_id")?,
        matched_rule: row.get("matched_rule")?,
        predicted_status: row.get("predicted_status")?,
        confidence: row.get("confidence")?,
        used_ai: used_ai != 0,
        ai_error: row.get("ai_error")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(conn: &Connection, row: &RuleLogRow) -> Result<()> {
    conn.execute(
        "INSERT INTO classification_rule_log (id, message_id, matched_rule, predicted_status, \
         confidence, used_ai, ai_error, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.message_id,
            row.matched_rule,
            row.predicted_status,
            row.confidence,
            row.used_ai as i64,
            row.ai_error,
            row.created_at,
        ],
    )?;
    Ok(())
}

pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<RuleLogRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, message_id, matched_rule, predicted_status, confidence, used_ai, ai_error, \
         created_at FROM classification_rule_log ORDER BY created_at DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM classification_rule_log", [], |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn insert_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert(
                conn,
                &RuleLogRow {
                    id: uuid::Uuid::new_v4().to_string(),
                    message_id: "m1".to_string(),
                    matched_rule: Some("received".to_string()),
                    predicted_status: "received".to_string(),
                    confidence: 0.9,
                    used_ai: true,
                    ai_error: None,
                    created_at: "2026-01-01T00:00:00+00:00".to_string(),
                },
            )?;
            insert(
                conn,
                &RuleLogRow {
                    id: uuid::Uuid::new_v4().to_string(),
                    message_id: "m2".to_string(),
                    matched_rule: None,
                    predicted_status: "unclassified".to_string(),
                    confidence: 0.0,
                    used_ai: false,
                    ai_error: Some("model request timed out".to_string()),
                    created_at: "2026-01-02T00:00:00+00:00".to_string(),
                },
            )?;

            assert_eq!(count(conn)?, 2);
            let rows = recent(conn, 10)?;
            assert_eq!(rows[0].message_id, "m2");
            assert!(!rows[0].used_ai);
            assert_eq!(rows[1].matched_rule.as_deref(), Some("received"));
            assert!(rows[1].used_ai);
            Ok(())
        })
        .unwrap();
    }
}
