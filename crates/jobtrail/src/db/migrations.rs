//! Versioned schema migrations. Applied versions are tracked in
//! `_migrations`; each migration runs in its own transaction-free batch
//! (the statements themselves are idempotent `IF NOT EXISTS` where
//! possible). `AddColumn` migrations check `pragma table_info` first so a
//! replay against an already-upgraded schema is a no-op.

use log::{debug, info};
use rusqlite::Connection;

use super::error::{DatabaseError, Result};

enum MigrationKind {
    /// Executes the SQL batch as-is.
    Standard,
    /// Executes only when `column` is missing from `table`.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create applications",
        sql: include_str!("sql/001_create_applications.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create email_records",
        sql: include_str!("sql/002_create_email_records.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create application_events",
        sql: include_str!("sql/003_create_application_events.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "create followup_tasks",
        sql: include_str!("sql/004_create_followup_tasks.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 5,
        description: "create classification_rule_log",
        sql: include_str!("sql/005_create_classification_rule_log.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 6,
        description: "create sync_state",
        sql: include_str!("sql/006_create_sync_state.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 7,
        description: "add notes to applications",
        sql: include_str!("sql/007_add_application_notes.sql"),
        kind: MigrationKind::AddColumn {
            table: "applications",
            column: "notes",
        },
    },
];

pub fn run_all(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            message: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        info!(
            "applied migration {}: {}",
            migration.version, migration.description
        );
    }

    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> std::result::Result<(), rusqlite::Error> {
    match migration.kind {
        MigrationKind::Standard => conn.execute_batch(migration.sql),
        MigrationKind::AddColumn { table, column } => {
            if column_exists(conn, table, column)? {
                debug!(
                    "migration {}: column {table}.{column} already present",
                    migration.version
                );
                Ok(())
            } else {
                conn.execute_batch(migration.sql)
            }
        }
    }
}

fn column_exists(
    conn: &Connection,
    table: &str,
    column: &str,
) -> std::result::Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_strictly_ordered() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last, "versions must increase");
            last = migration.version;
        }
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let applied: u32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn notes_column_is_added_once() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        assert!(column_exists(&conn, "applications", "notes").unwrap());
    }
}
