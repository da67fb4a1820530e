//! Free-text slot extraction
//!
//! Pulls raw candidate values out of a user message. Nothing here decides
//! whether a value is acceptable; that is `validate`'s job.

use crate::models::{Field, OperationKind, SlotFill};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref POLICY_ID: Regex =
        Regex::new(r"(?i)\bPOL-?[0-9][A-Z0-9]*\b").expect("policy id pattern");
    static ref USER_ID: Regex =
        Regex::new(r"(?i)\bUSER-?[0-9][A-Z0-9]*\b").expect("user id pattern");
    static ref VEHICLE: Regex = Regex::new(
        r"\b(?:19|20)\d{2}\s+[A-Z][A-Za-z]+(?:\s+[A-Z0-9][A-Za-z0-9-]*)?"
    )
    .expect("vehicle pattern");
    static ref PHOTO: Regex =
        Regex::new(r"(?i)\b[\w-]+\.(?:jpe?g|png|heic)\b").expect("photo pattern");
    static ref AMOUNT: Regex = Regex::new(
        r"(?i)(?:^|[^\w-])\$?(\d[\d,]*(?:\.\d+)?)(?:\s*(k|m|thousand|million))?\b"
    )
    .expect("amount pattern");
}

/// Words that may sit between "claim" and the identifier itself.
const CLAIM_ID_LEADERS: &[&str] = &["id", "number", "no", "status", "for", "is"];

const TOKEN_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '"', '\'', '(', ')', '[', ']', '#',
];

/// Whitespace tokens with surrounding punctuation removed.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(TOKEN_PUNCTUATION))
        .filter(|t| !t.is_empty())
}

fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Letters-only claim ids are written in capitals ("ABCDEF"); lowercase
/// words after "claim" are ordinary text.
fn is_letter_code(token: &str) -> bool {
    (3..=10).contains(&token.len()) && token.chars().all(|c| c.is_ascii_uppercase())
}

/// The only identifier-shaped token of a reply: digits required, letters,
/// digits and dashes allowed. Empty when there is none or more than one.
fn lone_identifier(text: &str) -> String {
    let mut candidates = tokens(text).filter(|t| {
        has_digit(t) && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => only.to_string(),
        _ => String::new(),
    }
}

/// True when the message carries something that looks like an identifier
/// or an amount.
pub fn has_identifier_token(text: &str) -> bool {
    tokens(text).any(has_digit)
}

pub fn policy_id(text: &str) -> Option<String> {
    POLICY_ID.find(text).map(|m| m.as_str().to_uppercase())
}

pub fn user_id(text: &str) -> Option<String> {
    USER_ID.find(text).map(|m| m.as_str().to_uppercase())
}

pub fn vehicle(text: &str) -> Option<String> {
    VEHICLE.find(text).map(|m| m.as_str().trim().to_string())
}

pub fn photos(text: &str) -> Vec<String> {
    PHOTO.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Best claim-id candidate: the token after "claim" (skipping "id",
/// "number", ...) when it has a digit or is a capitalised code, otherwise
/// the last digit-bearing token that is not a policy or user id.
pub fn claim_id(text: &str) -> Option<String> {
    let all: Vec<&str> = text.split_whitespace().collect();

    for (i, raw) in all.iter().enumerate() {
        if !raw.to_lowercase().starts_with("claim") {
            continue;
        }
        let mut rest = all[i + 1..].iter().peekable();
        while let Some(next) = rest.peek() {
            let word = next.to_lowercase();
            let word = word.trim_matches(TOKEN_PUNCTUATION);
            if word.is_empty() || CLAIM_ID_LEADERS.contains(&word) {
                rest.next();
            } else {
                break;
            }
        }
        if let Some(candidate) = rest.next() {
            let candidate = candidate.trim_matches(TOKEN_PUNCTUATION);
            if has_digit(candidate) || is_letter_code(candidate) {
                return Some(candidate.to_string());
            }
        }
    }

    tokens(text)
        .filter(|t| has_digit(t))
        .filter(|t| !POLICY_ID.is_match(t) && !USER_ID.is_match(t))
        .last()
        .map(str::to_string)
}

/// Coverage amounts in order of appearance, normalised to plain numbers
/// ("50k" → "50000"). Policy and user ids are masked first so their digits
/// are not read as money.
pub fn amounts(text: &str) -> Vec<String> {
    let masked = USER_ID.replace_all(&POLICY_ID.replace_all(text, " "), " ").into_owned();

    AMOUNT
        .captures_iter(&masked)
        .filter_map(|caps| {
            let digits = caps.get(1)?.as_str().replace(',', "");
            let base: f64 = digits.parse().ok()?;
            let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
                Some("k") | Some("thousand") => 1_000.0,
                Some("m") | Some("million") => 1_000_000.0,
                _ => 1.0,
            };
            Some(format_plain(base * multiplier))
        })
        .collect()
}

fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as u64)
    } else {
        format!("{}", value)
    }
}

/// Raw value for the field the previous prompt asked about.
pub fn answer_for(field: Field, text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let single_token = !trimmed.contains(char::is_whitespace);

    match field {
        Field::ClaimId => {
            if single_token {
                trimmed.trim_matches(TOKEN_PUNCTUATION).to_string()
            } else {
                claim_id(trimmed).unwrap_or_else(|| trimmed.to_string())
            }
        }
        Field::PolicyId | Field::UserId => {
            let found = if field == Field::PolicyId {
                policy_id(trimmed)
            } else {
                user_id(trimmed)
            };
            found.unwrap_or_else(|| {
                if single_token {
                    trimmed.trim_matches(TOKEN_PUNCTUATION).to_string()
                } else {
                    lone_identifier(trimmed)
                }
            })
        }
        Field::CurrentCoverage | Field::NewCoverage => amounts(trimmed)
            .into_iter()
            .next()
            .unwrap_or_else(|| trimmed.to_string()),
        Field::Vehicle | Field::DamageDescription => trimmed.to_string(),
        Field::Photos => trimmed.to_string(),
    }
}

fn is_bare_id(text: &str) -> bool {
    let trimmed = text.trim().trim_matches(TOKEN_PUNCTUATION).to_uppercase();
    policy_id(&trimmed).as_deref() == Some(trimmed.as_str())
        || user_id(&trimmed).as_deref() == Some(trimmed.as_str())
}

fn push(found: &mut Vec<(Field, String)>, field: Field, value: String) {
    if !found.iter().any(|(f, _)| *f == field) {
        found.push((field, value));
    }
}

/// Candidate `(field, raw value)` pairs for one message.
pub fn extract(fill: &SlotFill, text: &str) -> Vec<(Field, String)> {
    let mut found: Vec<(Field, String)> = Vec::new();

    if let Some(field) = fill.awaiting {
        // A bare policy/user id sent while a free-text field is awaited is a
        // correction of that id, not the answer.
        let free_text = matches!(field, Field::Vehicle | Field::DamageDescription);
        if !(free_text && is_bare_id(text)) {
            push(&mut found, field, answer_for(field, text));
        }
    }

    let open = |field: Field| fill.awaiting != Some(field);
    let unfilled = |field: Field| open(field) && !fill.slots.contains_key(&field);

    match fill.operation {
        OperationKind::ClaimStatus => {
            if fill.awaiting.is_none() {
                if let Some(id) = claim_id(text) {
                    push(&mut found, Field::ClaimId, id);
                }
            }
        }
        OperationKind::PolicyLookup => {
            if let Some(id) = user_id(text).filter(|_| open(Field::UserId)) {
                push(&mut found, Field::UserId, id);
            }
        }
        OperationKind::SubmitClaim => {
            if let Some(id) = policy_id(text).filter(|_| open(Field::PolicyId)) {
                push(&mut found, Field::PolicyId, id);
            }
            if let Some(v) = vehicle(text).filter(|_| unfilled(Field::Vehicle)) {
                push(&mut found, Field::Vehicle, v);
            }
            let pictures = photos(text);
            if !pictures.is_empty() {
                push(&mut found, Field::Photos, pictures.join(","));
            }
        }
        OperationKind::CalculatePremium => {
            if let Some(id) = policy_id(text).filter(|_| open(Field::PolicyId)) {
                push(&mut found, Field::PolicyId, id);
            }
            // An awaited coverage answer has already been taken above; a
            // second read of the same number would fill the other field.
            if fill.awaiting.is_none() {
                let mut values = amounts(text).into_iter();
                match (values.next(), values.next()) {
                    (Some(current), Some(new)) => {
                        push(&mut found, Field::CurrentCoverage, current);
                        push(&mut found, Field::NewCoverage, new);
                    }
                    (Some(only), None) => {
                        let target = if fill.slots.contains_key(&Field::CurrentCoverage) {
                            Field::NewCoverage
                        } else {
                            Field::CurrentCoverage
                        };
                        push(&mut found, target, only);
                    }
                    _ => {}
                }
            }
        }
    }

    found
}
