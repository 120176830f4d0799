//! Follow-up tasks as derived state: after every change to an application,
//! [`refresh_followup`] reconciles its single open task against the current
//! status and last activity. Running it twice in a row is a no-op.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::application_repo::ApplicationRow;
use crate::db::followup_repo::{self, FollowupTaskRow, STATUS_OPEN};
use crate::db::Result;
use crate::status::ApplicationStatus;

/// Ignore sub-second differences when deciding whether a stored due date
/// needs rewriting.
const DUE_DRIFT_SECONDS: i64 = 1;

/// Reconciles the follow-up task for one application:
/// - terminal status: any open task is closed, none is created;
/// - otherwise: exactly one open task exists, due `followup_after_days`
///   after the application's last activity.
pub fn refresh_followup(
    conn: &Connection,
    application: &ApplicationRow,
    followup_after_days: i64,
) -> Result<()> {
    let terminal = ApplicationStatus::parse(&application.status)
        .map(|s| s.is_terminal())
        .unwrap_or(false);
    let open = followup_repo::find_open_for_application(conn, &application.id)?;
    let now = Utc::now().to_rfc3339();

    if terminal {
        if let Some(task) = open {
            debug!(
                "closing follow-up for application {} ({} is terminal)",
                application.id, application.status
            );
            followup_repo::mark_done(conn, &task.id, &now)?;
        }
        return Ok(());
    }

    let last_activity = parse_timestamp(&application.last_activity_at).unwrap_or_else(Utc::now);
    let due_at = last_activity + Duration::days(followup_after_days.max(1));

    match open {
        None => {
            followup_repo::insert(
                conn,
                &FollowupTaskRow {
                    id: Uuid::new_v4().to_string(),
                    application_id: application.id.clone(),
                    status: STATUS_OPEN.to_string(),
                    due_at: due_at.to_rfc3339(),
                    reason: format!(
                        "No update from {} since last activity",
                        application.company_name
                    ),
                    created_at: now.clone(),
                    updated_at: now,
                    completed_at: None,
                },
            )?;
        }
        Some(task) => {
            let current_due = parse_timestamp(&task.due_at).unwrap_or(due_at);
            let drift = (current_due - due_at).num_seconds().abs();
            if drift > DUE_DRIFT_SECONDS {
                followup_repo::update_due(conn, &task.id, &due_at.to_rfc3339(), &now)?;
            }
        }
    }

    Ok(())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
