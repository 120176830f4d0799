//! Company and role identity resolution. The company name comes from an
//! ordered precedence chain over subject candidates, subject/body patterns,
//! AI output and sender metadata; a final heuristic un-swaps messages where
//! the company and role ended up in each other's fields.

use regex::Regex;

use crate::normalize;

pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// Which step of the precedence chain produced the company. Logged into the
/// application event so misresolutions can be traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    SubjectCandidate,
    SubjectPattern,
    AiConfirmed,
    AtsDisplayName,
    SenderDisplayName,
    BodyPattern,
    AiUnconfirmed,
    DomainFallback,
    Unknown,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::SubjectCandidate => "subject_candidate",
            ResolutionSource::SubjectPattern => "subject_pattern",
            ResolutionSource::AiConfirmed => "ai_confirmed",
            ResolutionSource::AtsDisplayName => "ats_display_name",
            ResolutionSource::SenderDisplayName => "sender_display_name",
            ResolutionSource::BodyPattern => "body_pattern",
            ResolutionSource::AiUnconfirmed => "ai_unconfirmed",
            ResolutionSource::DomainFallback => "domain_fallback",
            ResolutionSource::Unknown => "unknown",
        }
    }
}

/// Company/role candidates split out of the subject line, original casing
/// preserved. `"Thanks for applying to Acme - Software Engineer"` yields
/// company `Acme` and role `Software Engineer`.
#[derive(Debug, Default, Clone)]
pub struct SubjectCandidates {
    pub company: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompanyInput<'a> {
    pub subject: &'a str,
    pub subject_company_candidate: Option<&'a str>,
    pub body: &'a str,
    pub sender_domain: &'a str,
    pub sender_display_name: &'a str,
    pub ai_company_name: Option<&'a str>,
    pub ai_company_domain: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ResolvedCompany {
    pub company_name: String,
    pub company_domain: String,
    pub source: ResolutionSource,
}

pub struct IdentityResolver {
    subject_patterns: Vec<Regex>,
    body_patterns: Vec<Regex>,
}

const BODY_SCAN_LIMIT: usize = 5000;

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver {
    pub fn new() -> Self {
        let subject = [
            r"(?i)thank you for applying (?:to|at|for) ([^\n|,!.–-]{2,80})",
            r"(?i)thanks for applying (?:to|at|for) ([^\n|,!.–-]{2,80})",
            r"(?i)your application (?:to|at|with|for) ([^\n|,!.–-]{2,80})",
            r"(?i)application (?:received|update) from ([^\n|,!.–-]{2,80})",
        ];
        let body = [
            r"(?i)thank you for applying (?:to|at) ([^\n|,!.–-]{2,80})",
            r"(?i)thanks for applying (?:to|at) ([^\n|,!.–-]{2,80})",
            r"(?i)your application (?:to|at|with) ([^\n|,!.–-]{2,80})",
            r"(?i)your interest in (?:joining )?([^\n|,!.–-]{2,80})",
            r"(?i)the (?:hiring|recruiting|talent) team at ([^\n|,!.–-]{2,80})",
        ];
        IdentityResolver {
            subject_patterns: subject.iter().filter_map(|p| Regex::new(p).ok()).collect(),
            body_patterns: body.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        }
    }

    /// Resolves the company through the precedence chain. Never fails; the
    /// last resorts are the sender domain and the `Unknown Company`
    /// placeholder.
    pub fn resolve(&self, input: &CompanyInput<'_>) -> ResolvedCompany {
        // 1. Subject-derived candidate.
        if let Some(candidate) = input.subject_company_candidate {
            let candidate = trim_company(candidate);
            if normalize::looks_like_company_name(&candidate) {
                return ResolvedCompany {
                    company_name: candidate,
                    company_domain: input.sender_domain.to_string(),
                    source: ResolutionSource::SubjectCandidate,
                };
            }
        }

        // 2. Subject patterns.
        if let Some(resolved) = self.match_patterns(
            &self.subject_patterns,
            input.subject,
            input.sender_domain,
            ResolutionSource::SubjectPattern,
        ) {
            return resolved;
        }

        let ai_name = input
            .ai_company_name
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let ai_domain = input
            .ai_company_domain
            .map(str::trim)
            .filter(|domain| !domain.is_empty());

        // 3. AI company name, but only when the subject itself mentions it.
        if let Some(name) = ai_name {
            if text_mentions(input.subject, name) {
                return ResolvedCompany {
                    company_name: name.to_string(),
                    company_domain: ai_domain.unwrap_or(input.sender_domain).to_string(),
                    source: ResolutionSource::AiConfirmed,
                };
            }
        }

        // 4. Sender display name. On an ATS domain the display name is the
        // best identity available and the domain must come from elsewhere.
        let display = input.sender_display_name.trim();
        if !display.is_empty() {
            if normalize::is_ats_domain(input.sender_domain) {
                let company_domain = ai_domain
                    .map(str::to_string)
                    .unwrap_or_else(|| domain_from_display_name(display));
                return ResolvedCompany {
                    company_name: trim_company(display),
                    company_domain,
                    source: ResolutionSource::AtsDisplayName,
                };
            }
            if !normalize::is_generic_mailbox_name(display)
                && normalize::looks_like_company_name(display)
            {
                return ResolvedCompany {
                    company_name: trim_company(display),
                    company_domain: input.sender_domain.to_string(),
                    source: ResolutionSource::SenderDisplayName,
                };
            }
        }

        // 5. Body patterns, limited to the head of the body.
        let head = body_head(input.body);
        if let Some(resolved) = self.match_patterns(
            &self.body_patterns,
            head,
            input.sender_domain,
            ResolutionSource::BodyPattern,
        ) {
            return resolved;
        }

        // 6. AI company name without corroboration.
        if let Some(name) = ai_name {
            return ResolvedCompany {
                company_name: name.to_string(),
                company_domain: ai_domain.unwrap_or(input.sender_domain).to_string(),
                source: ResolutionSource::AiUnconfirmed,
            };
        }

        // 7. Title-cased sender domain.
        let from_domain = normalize::company_from_domain(input.sender_domain);
        if !from_domain.is_empty() {
            return ResolvedCompany {
                company_name: from_domain,
                company_domain: input.sender_domain.to_string(),
                source: ResolutionSource::DomainFallback,
            };
        }

        // 8. Placeholder.
        ResolvedCompany {
            company_name: UNKNOWN_COMPANY.to_string(),
            company_domain: String::new(),
            source: ResolutionSource::Unknown,
        }
    }

    fn match_patterns(
        &self,
        patterns: &[Regex],
        text: &str,
        sender_domain: &str,
        source: ResolutionSource,
    ) -> Option<ResolvedCompany> {
        for pattern in patterns {
            if let Some(m) = pattern.captures(text).and_then(|c| c.get(1)) {
                let candidate = trim_company(m.as_str());
                if normalize::looks_like_company_name(&candidate) {
                    return Some(ResolvedCompany {
                        company_name: candidate,
                        company_domain: sender_domain.to_string(),
                        source,
                    });
                }
            }
        }
        None
    }
}

/// Splits the subject into company/role candidates: reply prefixes and
/// acknowledgement boilerplate are stripped (case-insensitively, casing of
/// the remainder preserved), then the earliest separator divides company
/// from role.
pub fn subject_candidates(subject: &str) -> SubjectCandidates {
    let mut rest = subject.trim();

    loop {
        let mut stripped = false;
        for prefix in ["re:", "fw:", "fwd:"] {
            if let Some(after) = strip_prefix_ci(rest, prefix) {
                rest = after.trim_start();
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }

    for prefix in [
        "we got it:",
        "we got it!",
        "we got it",
        "thank you for applying to",
        "thank you for applying for",
        "thank you for applying at",
        "thanks for applying to",
        "thanks for applying for",
        "thanks for applying at",
        "thank you for applying",
        "thanks for applying",
    ] {
        if let Some(after) = strip_prefix_ci(rest, prefix) {
            rest = after.trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace());
            break;
        }
    }

    if rest.is_empty() {
        return SubjectCandidates::default();
    }

    let mut split_at: Option<(usize, usize)> = None;
    for separator in [" - ", " – ", " — ", " | ", ": ", ", "] {
        if let Some(idx) = rest.find(separator) {
            let better = match split_at {
                Some((existing, _)) => idx < existing,
                None => true,
            };
            if better {
                split_at = Some((idx, separator.len()));
            }
        }
    }

    match split_at {
        Some((idx, len)) => {
            let company = rest[..idx].trim();
            let role = rest[idx + len..].trim();
            SubjectCandidates {
                company: (!company.is_empty()).then(|| company.to_string()),
                role: (!role.is_empty()).then(|| role.to_string()),
            }
        }
        None => SubjectCandidates {
            company: Some(rest.trim().to_string()),
            role: None,
        },
    }
}

/// Un-swaps company/role when the resolved company reads like a role title
/// while the resolved role does not: the role takes the old company value
/// and the company is re-derived from the sender domain. Known
/// false-positive: companies with legitimately role-like names
/// ("Engineering Corp") lose their name to the domain fallback.
pub fn correct_company_role_swap(company: &mut String, role: &mut String, sender_domain: &str) {
    if !normalize::looks_like_role_title(company) || normalize::looks_like_role_title(role) {
        return;
    }
    *role = std::mem::take(company);
    *company = normalize::company_from_domain(sender_domain);
    if company.is_empty() {
        *company = UNKNOWN_COMPANY.to_string();
    }
}

pub fn is_placeholder_company(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed == UNKNOWN_COMPANY
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    match text.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => text.get(prefix.len()..),
        _ => None,
    }
}

fn trim_company(raw: &str) -> String {
    let mut name = raw
        .trim()
        .trim_matches(|c: char| "!?.,:;\"'".contains(c))
        .trim()
        .to_string();
    loop {
        let lower = name.to_lowercase();
        let mut stripped = false;
        for suffix in [" hiring team", " talent team", " recruiting team", " team", " careers", " recruiting"] {
            if lower.ends_with(suffix) && name.len() == lower.len() {
                name.truncate(name.len() - suffix.len());
                name = name.trim_end().to_string();
                stripped = true;
                break;
            }
        }
        if !stripped {
            break;
        }
    }
    name
}

/// Case- and punctuation-insensitive substring containment.
fn text_mentions(haystack: &str, needle: &str) -> bool {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase()
    };
    let needle = squash(needle);
    !needle.is_empty() && squash(haystack).contains(&needle)
}

fn body_head(body: &str) -> &str {
    if body.len() <= BODY_SCAN_LIMIT {
        return body;
    }
    let mut end = BODY_SCAN_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Guesses a web domain from a display name; used only for ATS senders
/// where the mail domain identifies the ATS, not the employer.
fn domain_from_display_name(display: &str) -> String {
    let squashed: String = display
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if squashed.is_empty() {
        String::new()
    } else {
        format!("{squashed}.com")
    }
}
