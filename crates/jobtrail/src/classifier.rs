//! Rule-based status classifier. Rules are evaluated in a fixed priority
//! order over the lowercased subject + body; the first rule with any match
//! wins. Rejection outranks offer outranks interview outranks assessment
//! outranks the plain received confirmation, so a mail that says
//! "unfortunately ... after your interview" still classifies as rejected.

use crate::status::ApplicationStatus;

/// Outcome of rule classification for one message.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Name of the winning rule, `None` when nothing matched.
    pub matched_rule: Option<String>,
    /// 0.9 for a phrase match, 0.7 for a keyword match, 0.0 for no match.
    pub confidence: f32,
    pub predicted_status: ApplicationStatus,
    /// Set only by the `received` rule: the mail is an application
    /// confirmation rather than a state change.
    pub is_confirmation: bool,
    /// Set when no rule matched and the status needs another source.
    pub needs_review: bool,
}

struct StatusRule {
    name: &'static str,
    status: ApplicationStatus,
    /// High-signal multi-word phrases, matched first at 0.9 confidence.
    phrases: &'static [&'static str],
    /// Weaker single keywords, matched second at 0.7 confidence.
    keywords: &'static [&'static str],
}

const RULES: &[StatusRule] = &[
    StatusRule {
        name: "rejected",
        status: ApplicationStatus::Rejected,
        phrases: &[
            "unfortunately",
            "we regret to inform",
            "not moving forward",
            "will not be moving forward",
            "decided not to proceed",
            "not been selected",
            "other candidates",
            "pursue other applicants",
            "position has been filled",
        ],
        keywords: &[
            "unfortunately",
            "we regret to inform",
            "not moving forward",
            "will not be moving forward",
            "decided not to proceed",
            "not been selected",
            "other candidates",
            "pursue other applicants",
            "position has been filled",
        ],
    },
    StatusRule {
        name: "offer",
        status: ApplicationStatus::Offer,
        phrases: &[
            "pleased to offer",
            "offer of employment",
            "extend an offer",
            "job offer",
            "congratulations",
        ],
        keywords: &[
            "pleased to offer",
            "offer of employment",
            "extend an offer",
            "job offer",
            "congratulations",
        ],
    },
    StatusRule {
        name: "interview",
        status: ApplicationStatus::Interview,
        phrases: &[
            "interview",
            "phone screen",
            "schedule a call",
            "meet the team",
            "availability for a call",
        ],
        keywords: &[
            "interview",
            "phone screen",
            "schedule a call",
            "meet the team",
            "availability for a call",
        ],
    },
    StatusRule {
        name: "assessment",
        status: ApplicationStatus::Assessment,
        phrases: &[
            "assessment",
            "coding challenge",
            "take-home",
            "online test",
            "technical exercise",
            "hackerrank",
            "codility",
        ],
        keywords: &[
            "assessment",
            "coding challenge",
            "take-home",
            "online test",
            "technical exercise",
            "hackerrank",
            "codility",
        ],
    },
    StatusRule {
        name: "received",
        status: ApplicationStatus::Received,
        phrases: &[
            "thanks for applying",
            "thank you for applying",
            "thank you for your application",
            "thanks for your application",
            "application received",
            "received your application",
            "we got it",
            "application has been submitted",
            "successfully submitted",
            "application is under review",
        ],
        keywords: &[
            "thanks for applying",
            "thank you for applying",
            "thank you for your application",
            "thanks for your application",
            "application received",
            "received your application",
            "we got it",
            "application has been submitted",
            "successfully submitted",
            "application is under review",
        ],
    },
];

/// Classifies one message from its subject and plain-text body.
pub fn classify(subject: &str, body: &str) -> Classification {
    classify_with(RULES, subject, body)
}

fn classify_with(rules: &[StatusRule], subject: &str, body: &str) -> Classification {
    let text = format!("{} {}", subject, body).to_lowercase();

    for rule in rules {
        if rule.phrases.iter().any(|p| text.contains(p)) {
            return matched(rule, 0.9);
        }
        if rule.keywords.iter().any(|k| text.contains(k)) {
            return matched(rule, 0.7);
        }
    }

    Classification {
        matched_rule: None,
        confidence: 0.0,
        predicted_status: ApplicationStatus::Unclassified,
        is_confirmation: false,
        needs_review: true,
    }
}

fn matched(rule: &StatusRule, confidence: f32) -> Classification {
    Classification {
        matched_rule: Some(rule.name.to_string()),
        confidence,
        predicted_status: rule.status,
        is_confirmation: rule.name == "received",
        needs_review: false,
    }
}
