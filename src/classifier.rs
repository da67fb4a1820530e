//! Intent Classifier
//!
//! Routes a chat message to one of:
//! - Knowledge: read-only search over the knowledge base (e.g., "what is the deductible for Gold?")
//! - Operation: a backend call that needs slots (claim status, claim submission, premium, policy lookup)
//! - Fallback: small talk, answered without any tool
//!
//! While a confirmation is pending the message is never reclassified; it goes
//! straight to the confirmation gate as a yes/no reply.

use crate::models::{ConversationPhase, Field, OperationKind, Session, UserRole};
use crate::slots::extract;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Knowledge,
    Operation(OperationKind),
    Fallback,
}

/// What the orchestrator should do with a message, given the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Approve/deny reply to the pending action.
    ConfirmationReply,
    /// Slot answer for the operation being collected.
    Continue(OperationKind),
    /// Drop the operation being collected.
    Abandon,
    Route(Route),
}

/// Static keyword lists, matched against the lowercased message
const FAQ_PREFIXES: &[&str] = &[
    "how do", "how does", "how can", "how much", "how long", "what is", "what are", "what's",
    "what does", "does my", "does the", "is my", "are my", "can i", "do i", "when do", "when can",
    "why", "explain", "tell me about",
];

const SUBMIT_VERBS: &[&str] = &["submit", "file", "report", "open", "lodge", "start", "new"];

const COVERAGE_CHANGE_VERBS: &[&str] = &["increase", "raise", "change", "upgrade", "boost"];

const LOOKUP_PHRASES: &[&str] = &[
    "policy details",
    "policy summary",
    "policy info",
    "check my policy",
    "show my policy",
    "look up policy",
    "lookup policy",
    "my coverage details",
];

const CLAIM_STATUS_PHRASES: &[&str] = &["claim status", "status of my claim", "track my claim"];

const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "deductible", "coverage", "covered", "cover", "plan", "plans", "gold", "silver", "bronze",
    "roadside", "collision", "comprehensive", "liability", "exclusion", "benefit", "faq",
    "waiting period", "renewal", "cancel my policy", "refund",
];

/// Whole-message phrases that abandon the operation being collected.
const CANCEL_PHRASES: &[&str] = &[
    "cancel", "cancel that", "cancel it", "cancel this", "stop", "stop that", "never mind",
    "nevermind", "forget it", "abort", "quit",
];

pub struct IntentClassifier;

impl IntentClassifier {
    /// Decide how the orchestrator handles `message` in the session's phase.
    pub fn dispatch(message: &str, session: &Session, role: UserRole) -> Dispatch {
        let dispatch = match &session.phase {
            ConversationPhase::AwaitingConfirmation(_) => Dispatch::ConfirmationReply,
            ConversationPhase::Collecting(fill) => {
                let lowered = message.trim().to_lowercase();
                // Free-text answers may mention policies or claims in passing
                let free_text = matches!(
                    fill.awaiting,
                    Some(Field::DamageDescription) | Some(Field::Vehicle)
                );
                if is_cancel(&lowered) {
                    Dispatch::Abandon
                } else if free_text {
                    Dispatch::Continue(fill.operation)
                } else if is_faq_question(&lowered)
                    && !extract::has_identifier_token(&lowered)
                    && explicit_operation(&lowered).is_none()
                {
                    // Answered from the knowledge base; the collection stays put
                    Dispatch::Route(Route::Knowledge)
                } else {
                    match explicit_operation(&lowered) {
                        Some(other) if other != fill.operation => {
                            Dispatch::Route(Route::Operation(other))
                        }
                        _ => Dispatch::Continue(fill.operation),
                    }
                }
            }
            ConversationPhase::Idle | ConversationPhase::Executing(_) => {
                Dispatch::Route(Self::classify(message))
            }
        };

        debug!(
            session_id = %session.session_id,
            role = ?role,
            dispatch = ?dispatch,
            "Message dispatched"
        );
        dispatch
    }

    /// Classify a message with no conversation context.
    pub fn classify(message: &str) -> Route {
        let lowered = message.trim().to_lowercase();
        if lowered.is_empty() {
            return Route::Fallback;
        }

        if is_faq_question(&lowered) && !extract::has_identifier_token(&lowered) {
            return Route::Knowledge;
        }

        if let Some(kind) = explicit_operation(&lowered) {
            return Route::Operation(kind);
        }

        if extract::user_id(&lowered).is_some() {
            return Route::Operation(OperationKind::PolicyLookup);
        }

        if is_bare_identifier(&lowered) {
            return Route::Operation(OperationKind::ClaimStatus);
        }

        if KNOWLEDGE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return Route::Knowledge;
        }

        Route::Fallback
    }
}

/// Keyword-driven operation detection. Identifiers alone never switch an
/// operation mid-collection, so this deliberately ignores them.
fn explicit_operation(lowered: &str) -> Option<OperationKind> {
    let words: Vec<&str> = extract::tokens(lowered).collect();
    let has_word = |w: &str| words.iter().any(|t| *t == w);
    let mentions_claim = words.iter().any(|t| t.starts_with("claim"));

    if mentions_claim && SUBMIT_VERBS.iter().any(|v| has_word(v)) {
        return Some(OperationKind::SubmitClaim);
    }

    if lowered.contains("premium")
        || (lowered.contains("coverage") && COVERAGE_CHANGE_VERBS.iter().any(|v| has_word(v)))
    {
        return Some(OperationKind::CalculatePremium);
    }

    if LOOKUP_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Some(OperationKind::PolicyLookup);
    }

    if CLAIM_STATUS_PHRASES.iter().any(|p| lowered.contains(p))
        || (mentions_claim && extract::has_identifier_token(lowered))
    {
        return Some(OperationKind::ClaimStatus);
    }

    None
}

fn is_faq_question(lowered: &str) -> bool {
    if !FAQ_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return false;
    }
    // "what is my claim status" is a lookup even though it reads like a question
    !LOOKUP_PHRASES.iter().any(|p| lowered.contains(p))
        && !CLAIM_STATUS_PHRASES.iter().any(|p| lowered.contains(p))
        && !lowered.contains("premium")
}

/// A message that is nothing but one claim-id-looking token.
fn is_bare_identifier(lowered: &str) -> bool {
    let mut tokens = extract::tokens(lowered);
    match (tokens.next(), tokens.next()) {
        (Some(only), None) => {
            only.chars().any(|c| c.is_ascii_digit()) && extract::policy_id(only).is_none()
        }
        _ => false,
    }
}

fn is_cancel(lowered: &str) -> bool {
    let trimmed = lowered
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation());
    CANCEL_PHRASES.contains(&trimmed)
}
