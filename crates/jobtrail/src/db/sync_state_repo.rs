//! Per-account sync checkpoint (the provider's history id) and last run
//! time.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::Result;

#[derive(Debug, Clone)]
pub struct SyncStateRow {
    pub account: String,
    pub checkpoint: Option<String>,
    pub last_synced_at: Option<String>,
}

fn from_row(row: &Row<'_>) -> std::result::Result<SyncStateRow, rusqlite::Error> {
    Ok(SyncStateRow {
        account: row.get("account")?,
        checkpoint: row.get("checkpoint")?,
        last_synced_at: row.get("last_synced_at")?,
    })
}

pub fn get(conn: &Connection, account: &str) -> Result<Option<SyncStateRow>> {
    let row = conn
        .query_row(
            "SELECT account, checkpoint, last_synced_at FROM sync_state WHERE account = ?1",
            params![account],
            from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn upsert_checkpoint(
    conn: &Connection,
    account: &str,
    checkpoint: Option<&str>,
    synced_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (account, checkpoint, last_synced_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT (account) DO UPDATE SET \
             checkpoint = COALESCE(excluded.checkpoint, sync_state.checkpoint), \
             last_synced_at = excluded.last_synced_at",
        params![account, checkpoint, synced_at],
    )?;
    Ok(())
}
