//! Pure normalization helpers shared by the parser, classifier and identity
//! resolver: address/domain splitting, subject-key derivation, slugs, focus
//! phrase expansion and the vocabulary checks behind the company/role
//! heuristics.

/// Consumer and marketplace domains that never identify an employer.
/// Matched on the domain itself or any subdomain of it.
const NOISE_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "live.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "proton.me",
    "protonmail.com",
    "gmx.com",
    "gmx.net",
    "facebook.com",
    "facebookmail.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "reddit.com",
    "redditmail.com",
    "discord.com",
    "pinterest.com",
    "tiktok.com",
    "amazon.com",
    "amazon.de",
    "ebay.com",
    "etsy.com",
    "aliexpress.com",
    "paypal.com",
    "stripe.com",
    "klarna.com",
    "wise.com",
    "revolut.com",
];

/// Applicant-tracking-system domains. Mail from these is about a job, but the
/// domain itself says nothing about which company.
const ATS_DOMAINS: &[&str] = &[
    "greenhouse.io",
    "greenhouse-mail.io",
    "lever.co",
    "hire.lever.co",
    "workday.com",
    "myworkday.com",
    "myworkdayjobs.com",
    "ashbyhq.com",
    "smartrecruiters.com",
    "icims.com",
    "jobvite.com",
    "workable.com",
    "workablemail.com",
    "bamboohr.com",
    "recruitee.com",
    "teamtailor.com",
    "successfactors.com",
    "taleo.net",
];

/// Mailbox names that carry no company identity. Compared against the
/// display name with punctuation and whitespace squashed out.
const GENERIC_MAILBOX_NAMES: &[&str] = &[
    "noreply",
    "donotreply",
    "notifications",
    "notification",
    "careers",
    "jobs",
    "hr",
    "recruiting",
    "recruitment",
    "talent",
    "talentacquisition",
    "hiring",
    "team",
    "info",
    "hello",
    "mail",
    "admin",
    "support",
];

/// Vocabulary that marks a string as a role title rather than a company
/// name. Single words match whole tokens; phrases match as substrings.
const ROLE_HINTS: &[&str] = &[
    "engineer",
    "engineering",
    "developer",
    "programmer",
    "designer",
    "manager",
    "analyst",
    "scientist",
    "researcher",
    "architect",
    "consultant",
    "specialist",
    "coordinator",
    "administrator",
    "accountant",
    "recruiter",
    "writer",
    "editor",
    "intern",
    "internship",
    "lead",
    "director",
    "officer",
    "devops",
    "frontend",
    "backend",
    "fullstack",
    "full stack",
    "full-stack",
    "sre",
    "qa",
];

/// Boilerplate that disqualifies a string from being a company name.
const COMPANY_NOISE_PHRASES: &[&str] = &[
    "thank you for applying",
    "thanks for applying",
    "thank you for your application",
    "thanks for your application",
    "your application",
    "application received",
    "we received",
    "we got it",
    "no longer",
    "unsubscribe",
    "do not reply",
];

/// Fallback subject key when nothing usable survives normalization.
pub const FALLBACK_SUBJECT_KEY: &str = "thanks-for-applying";

/// Extracts the lowercase domain from an email address. Returns `None` for
/// addresses without a plausible domain part.
pub fn sender_domain(address: &str) -> Option<String> {
    let at = address.rfind('@')?;
    let domain = address[at + 1..]
        .trim()
        .trim_end_matches('>')
        .to_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        None
    } else {
        Some(domain)
    }
}

/// Splits an RFC 5322 `From` value into display name and bare address.
/// `"Acme Careers" <jobs@acme.com>` becomes `("Acme Careers", "jobs@acme.com")`.
pub fn display_name_and_address(from: &str) -> (String, String) {
    let from = from.trim();
    if let (Some(open), Some(close)) = (from.rfind('<'), from.rfind('>')) {
        if open < close {
            let name = from[..open].trim().trim_matches('"').trim().to_string();
            let address = from[open + 1..close].trim().to_string();
            return (name, address);
        }
    }
    if from.contains('@') {
        (String::new(), from.trim_matches('"').to_string())
    } else {
        (from.trim_matches('"').to_string(), String::new())
    }
}

/// Derives the grouping key for a subject line: strips reply/forward
/// prefixes and acknowledgement boilerplate, lowercases, then joins the
/// first 12 alphanumeric tokens with dashes. Reply variants of the same
/// confirmation mail collapse to the same key.
pub fn normalize_subject_key(subject: &str) -> String {
    let mut rest = subject.trim().to_lowercase();

    loop {
        let trimmed = rest.trim_start();
        let stripped = ["re:", "fw:", "fwd:"]
            .iter()
            .find_map(|p| trimmed.strip_prefix(p));
        match stripped {
            Some(after) => rest = after.trim_start().to_string(),
            None => break,
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
        if let Some(after) = rest.strip_prefix(prefix) {
            rest = after.to_string();
            break;
        }
    }

    let tokens: Vec<&str> = rest
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(12)
        .collect();

    if tokens.is_empty() {
        FALLBACK_SUBJECT_KEY.to_string()
    } else {
        tokens.join("-")
    }
}

/// Lowercase dash-separated slug of a free-form string. Non-alphanumeric
/// runs collapse to a single dash; leading/trailing dashes are trimmed.
pub fn slug_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dash = true;
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Slug form of a role title, with a stable placeholder for empty input.
pub fn normalize_role(title: &str) -> String {
    let slug = slug_key(title);
    if slug.is_empty() {
        "unknown-role".to_string()
    } else {
        slug
    }
}

/// Expands configured focus phrases with close wording variants so the
/// mailbox query and the body re-check catch the common rephrasings.
pub fn expand_focus_phrases(phrases: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for phrase in phrases {
        let phrase = phrase.trim().to_lowercase();
        if phrase.is_empty() {
            continue;
        }
        for variant in phrase_variants(&phrase) {
            if !out.contains(&variant) {
                out.push(variant);
            }
        }
    }
    out
}

fn phrase_variants(phrase: &str) -> Vec<String> {
    let mut variants = vec![phrase.to_string()];
    if phrase == "thanks for applying" {
        variants.push("thank you for applying".to_string());
        variants.push("thanks for your application".to_string());
        variants.push("thank you for your application".to_string());
    } else if let Some(rest) = phrase.strip_prefix("thanks ") {
        variants.push(format!("thank you {rest}"));
    } else if let Some(rest) = phrase.strip_prefix("thank you ") {
        variants.push(format!("thanks {rest}"));
    }
    variants
}

pub fn is_noise_domain(domain: &str) -> bool {
    NOISE_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

pub fn is_ats_domain(domain: &str) -> bool {
    ATS_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

pub fn is_generic_mailbox_name(name: &str) -> bool {
    let squashed: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    squashed.is_empty() || GENERIC_MAILBOX_NAMES.contains(&squashed.as_str())
}

/// True when the text reads like a role title: any role-vocabulary token
/// (or phrase) appears in it.
pub fn looks_like_role_title(text: &str) -> bool {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    ROLE_HINTS.iter().any(|hint| {
        if hint.contains(' ') || hint.contains('-') {
            lower.contains(hint)
        } else {
            tokens.iter().any(|t| t == hint)
        }
    })
}

/// True when the text could plausibly be a company name: short, not an
/// address, free of acknowledgement boilerplate and role vocabulary.
pub fn looks_like_company_name(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < 2 || trimmed.contains('@') {
        return false;
    }
    if trimmed.split_whitespace().count() > 10 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if COMPANY_NOISE_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    !looks_like_role_title(trimmed)
}

/// Title-cased first label of a domain: `acme.com` -> `Acme`.
pub fn company_from_domain(domain: &str) -> String {
    let label = domain.split('.').next().unwrap_or("").trim();
    let mut out = String::with_capacity(label.len());
    let mut chars = label.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.extend(chars);
    }
    out
}

/// Crude HTML-to-text: drops tags, decodes the handful of entities that
/// matter for phrase matching, collapses whitespace. Good enough for
/// classification; never used for display.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut chars = html.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '&' => {
                let mut entity = String::new();
                let mut terminated = false;
                while let Some(&next) = chars.peek() {
                    if next == ';' {
                        chars.next();
                        terminated = true;
                        break;
                    }
                    if entity.len() >= 8 || next == '&' || next == '<' {
                        break;
                    }
                    entity.push(next);
                    chars.next();
                }
                if terminated {
                    match entity.as_str() {
                        "amp" => out.push('&'),
                        "lt" => out.push('<'),
                        "gt" => out.push('>'),
                        "quot" => out.push('"'),
                        "apos" | "#39" => out.push('\''),
                        "nbsp" => out.push(' '),
                        _ => out.push(' '),
                    }
                } else {
                    out.push('&');
                    out.push_str(&entity);
                }
            }
            c => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
