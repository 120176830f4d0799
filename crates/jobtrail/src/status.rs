//! Pipeline status and event vocabulary. Stored as lowercase strings in
//! SQLite, so every variant round-trips through `as_str`/`parse`.

use std::fmt;

/// Lifecycle state of an application. `Unclassified` is produced by the rule
/// classifier when nothing matches; it is never persisted on an application
/// (the pipeline coerces it to `Received` before writing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationStatus {
    Submitted,
    Received,
    Rejected,
    Interview,
    Assessment,
    Offer,
    Withdrawn,
    Unclassified,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Received => "received",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Assessment => "assessment",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Withdrawn => "withdrawn",
            ApplicationStatus::Unclassified => "unclassified",
        }
    }

    /// Parses a persisted status value. Accepts only the states an
    /// application can hold, not the classifier-internal `unclassified`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "submitted" => Some(ApplicationStatus::Submitted),
            "received" => Some(ApplicationStatus::Received),
            "rejected" => Some(ApplicationStatus::Rejected),
            "interview" => Some(ApplicationStatus::Interview),
            "assessment" => Some(ApplicationStatus::Assessment),
            "offer" => Some(ApplicationStatus::Offer),
            "withdrawn" => Some(ApplicationStatus::Withdrawn),
            _ => None,
        }
    }

    /// Terminal states close the application: no follow-up task stays open.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Rejected | ApplicationStatus::Offer | ApplicationStatus::Withdrawn
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only event kinds on an application's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ApplicationReceived,
    StatusChanged,
    EmailReceived,
    ManualUpdate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ApplicationReceived => "application_received",
            EventType::StatusChanged => "status_changed",
            EventType::EmailReceived => "email_received",
            EventType::ManualUpdate => "manual_update",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "application_received" => Some(EventType::ApplicationReceived),
            "status_changed" => Some(EventType::StatusChanged),
            "email_received" => Some(EventType::EmailReceived),
            "manual_update" => Some(EventType::ManualUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            ApplicationStatus::Submitted,
            ApplicationStatus::Received,
            ApplicationStatus::Rejected,
            ApplicationStatus::Interview,
            ApplicationStatus::Assessment,
            ApplicationStatus::Offer,
            ApplicationStatus::Withdrawn,
        ] {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn parse_is_case_insensitive_and_trims() {
        assert_eq!(ApplicationStatus::parse("  Interview "), Some(ApplicationStatus::Interview));
        assert_eq!(ApplicationStatus::parse("REJECTED"), Some(ApplicationStatus::Rejected));
    }

    #[test]
    fn unclassified_is_not_a_persisted_status() {
        assert_eq!(ApplicationStatus::parse("unclassified"), None);
        assert_eq!(ApplicationStatus::parse("banana"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(ApplicationStatus::Rejected.is_terminal());
        assert!(ApplicationStatus::Offer.is_terminal());
        assert!(ApplicationStatus::Withdrawn.is_terminal());
        assert!(!ApplicationStatus::Interview.is_terminal());
        assert!(!ApplicationStatus::Received.is_terminal());
    }

    #[test]
    fn event_type_round_trips() {
        for event in [
            EventType::ApplicationReceived,
            EventType::StatusChanged,
            EventType::EmailReceived,
            EventType::ManualUpdate,
        ] {
            assert_eq!(EventType::parse(event.as_str()), Some(event));
        }
    }
}
