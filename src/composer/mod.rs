//! Response composer
//!
//! Turns operation outcomes and knowledge results into chat messages plus
//! named cards. The card name comes from the outcome's variant, never from
//! which fields happen to be present. Every card is accompanied by a plain
//! sentence so the turn reads fine without a UI.

use crate::error::ErrorCode;
use crate::models::{
    ActionType, ChatMessage, ClaimReceipt, ClaimStatus, ConfirmAction, KnowledgeResults,
    OperationOutcome, OperationRequest, PolicyDetails, PremiumQuote, ResponseEnvelope, Session,
    StateSnapshot,
};
use crate::tools::BackendError;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const CARD_POLICY_DETAILS: &str = "policy_details";
pub const CARD_CLAIM_STATUS: &str = "claim_status";
pub const CARD_CLAIM_SUBMITTED: &str = "claim_submitted";
pub const CARD_PREMIUM_CALCULATION: &str = "premium_calculation";
pub const CARD_KNOWLEDGE_BASE: &str = "knowledge_base";

/// Passages quoted in the chat text; the card carries all of them.
const QUOTED_PASSAGES: usize = 2;

pub const NO_KNOWLEDGE_MESSAGE: &str = "I couldn't find that information in our knowledge base.";
pub const UPSTREAM_APOLOGY: &str =
    "Sorry, I couldn't reach our insurance services right now. Please try again in a moment.";

/// What one turn produced, before the session snapshot is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutput {
    pub messages: Vec<ChatMessage>,
    pub cards: BTreeMap<String, Value>,
    pub error: Option<ErrorCode>,
}

impl TurnOutput {
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(text)],
            ..Default::default()
        }
    }

    pub fn failure(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            error: Some(code),
            ..Self::say(text)
        }
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
    }

    fn with_card<T: Serialize>(mut self, name: &str, payload: &T, text: String) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.cards.insert(name.to_string(), value);
                self.messages.push(ChatMessage::assistant(text).with_ui(name));
            }
            Err(e) => {
                warn!(card = name, error = %e, "Card payload did not serialize");
                self.messages.push(ChatMessage::assistant(text));
            }
        }
        self
    }
}

//
// ================= Formatting =================
//

/// `$1,234` or, with `cents`, `$1,234.50`.
pub fn format_currency(value: f64, cents: bool) -> String {
    let negative = value < 0.0;
    let rounded = if cents {
        format!("{:.2}", value.abs())
    } else {
        format!("{:.0}", value.abs())
    };

    let (whole, fraction) = match rounded.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (rounded, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    match fraction {
        Some(f) => format!("{}${}.{}", sign, grouped, f),
        None => format!("{}${}", sign, grouped),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "included"
    } else {
        "not included"
    }
}

//
// ================= Operations =================
//

pub fn compose_operation(request: &OperationRequest, outcome: &OperationOutcome) -> TurnOutput {
    let output = TurnOutput::default();

    match outcome {
        OperationOutcome::PolicyDetails(policy) => {
            output.with_card(CARD_POLICY_DETAILS, policy, describe_policy(policy))
        }
        OperationOutcome::ClaimStatus(claims) => match claims.as_slice() {
            [single] => output.with_card(CARD_CLAIM_STATUS, single, describe_claim(single)),
            many => {
                let text = many
                    .iter()
                    .map(describe_claim)
                    .collect::<Vec<_>>()
                    .join(" ");
                output.with_card(CARD_CLAIM_STATUS, &many, text)
            }
        },
        OperationOutcome::ClaimSubmitted(receipt) => {
            output.with_card(CARD_CLAIM_SUBMITTED, receipt, describe_receipt(request, receipt))
        }
        OperationOutcome::PremiumCalculation(quote) => {
            output.with_card(CARD_PREMIUM_CALCULATION, quote, describe_quote(request, quote))
        }
        OperationOutcome::Unstructured(value) => {
            let mut output = output;
            output.push(describe_unstructured(request, value));
            output
        }
    }
}

fn describe_policy(policy: &PolicyDetails) -> String {
    let mut parts = Vec::new();

    let subject = match (&policy.policy_id, &policy.plan) {
        (Some(id), Some(plan)) => format!("Policy {} is on the {} plan", id, plan),
        (Some(id), None) => format!("Policy {}", id),
        (None, Some(plan)) => format!("Your policy is on the {} plan", plan),
        (None, None) => "Here are your policy details".to_string(),
    };
    parts.push(subject);

    if let Some(coverage) = policy.collision_coverage {
        parts.push(format!(
            "collision coverage {}",
            format_currency(coverage, false)
        ));
    }
    if let Some(deductible) = policy.deductible {
        parts.push(format!("deductible {}", format_currency(deductible, false)));
    }
    if let Some(roadside) = policy.roadside_assistance {
        parts.push(format!("roadside assistance {}", yes_no(roadside)));
    }

    format!("{}.", parts.join(", "))
}

fn describe_claim(claim: &ClaimStatus) -> String {
    match &claim.last_updated {
        Some(updated) => format!(
            "Claim {} is currently {} (last updated {}).",
            claim.claim_id, claim.status, updated
        ),
        None => format!("Claim {} is currently {}.", claim.claim_id, claim.status),
    }
}

fn describe_receipt(request: &OperationRequest, receipt: &ClaimReceipt) -> String {
    let mut text = match request {
        OperationRequest::SubmitClaim(submission) => format!(
            "Your claim {} has been submitted for policy {}.",
            receipt.claim_id, submission.policy_id
        ),
        _ => format!("Your claim {} has been submitted.", receipt.claim_id),
    };
    if let Some(message) = receipt.message.as_deref().filter(|m| !m.is_empty()) {
        text.push(' ');
        text.push_str(message);
    }
    text
}

fn describe_quote(request: &OperationRequest, quote: &PremiumQuote) -> String {
    let change = format!(
        "Your premium would change from {} to {}",
        format_currency(quote.current_premium, true),
        format_currency(quote.new_premium, true)
    );

    match request {
        OperationRequest::CalculatePremium(premium) => format!(
            "{} for coverage increase from {} to {} per period on policy {}.",
            change,
            format_currency(premium.current_coverage, false),
            format_currency(premium.new_coverage, false),
            quote.policy_id
        ),
        _ => format!("{} per period on policy {}.", change, quote.policy_id),
    }
}

fn describe_unstructured(request: &OperationRequest, value: &Value) -> String {
    let body = match value {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Null => "no details were returned".to_string(),
        other => other.to_string(),
    };
    format!("Result of {}: {}.", request.kind(), body)
}

//
// ================= Knowledge =================
//

pub fn compose_knowledge(results: KnowledgeResults) -> TurnOutput {
    let text = if results.results.is_empty() {
        NO_KNOWLEDGE_MESSAGE.to_string()
    } else {
        let passages = results
            .results
            .iter()
            .take(QUOTED_PASSAGES)
            .map(|hit| hit.content.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "Here's what I found:\n\n{}\n\nSources: {}",
            passages,
            results.sources.join(", ")
        )
    };

    TurnOutput::default().with_card(CARD_KNOWLEDGE_BASE, &results, text)
}

//
// ================= Failures =================
//

pub fn compose_failure(request: &OperationRequest, error: &BackendError) -> TurnOutput {
    let code = error.code();
    let text = match error {
        BackendError::NotFound(_) => match request {
            OperationRequest::ClaimStatus { claim_id } => {
                format!("I couldn't find a claim with ID {}.", claim_id)
            }
            OperationRequest::PolicyLookup { user_id } => {
                format!("I couldn't find a policy for user {}.", user_id)
            }
            OperationRequest::SubmitClaim(submission) => {
                format!("I couldn't find policy {}.", submission.policy_id)
            }
            OperationRequest::CalculatePremium(premium) => {
                format!("I couldn't find policy {}.", premium.policy_id)
            }
        },
        BackendError::Rejected { detail, .. } => {
            format!("I couldn't complete that request: {}", detail)
        }
        BackendError::Unavailable(_) => UPSTREAM_APOLOGY.to_string(),
    };
    TurnOutput::failure(code, text)
}

//
// ================= Envelope =================
//

/// Attach actions and the state snapshot. Both are read off the session, so
/// a confirm action is present exactly when the session awaits confirmation.
pub fn envelope(output: TurnOutput, session: &Session) -> ResponseEnvelope {
    let actions = session.pending_action().map(|pending| {
        vec![ConfirmAction {
            action_type: ActionType::Confirm,
            id: pending.id.clone(),
            summary: pending.summary.clone(),
            payload: serde_json::to_value(&pending.request).unwrap_or_else(|_| json!({})),
        }]
    });

    let state = StateSnapshot {
        session_id: session.session_id.clone(),
        pending_confirmation: session.pending_confirmation(),
        phase: session.gate_state(),
        last_intent: session.last_intent,
        awaiting: session.awaiting_field(),
        resolved: session.resolved.clone(),
        error: output.error,
    };

    ResponseEnvelope {
        messages: output.messages,
        actions,
        cards: if output.cards.is_empty() {
            None
        } else {
            Some(output.cards)
        },
        state: Some(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConversationPhase, KnowledgeHit, PendingAction, PremiumRequest,
    };
    use chrono::Utc;
    use serde_json::Map;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1_000.0, false), "$1,000");
        assert_eq!(format_currency(50_000.0, false), "$50,000");
        assert_eq!(format_currency(10_000_000.0, false), "$10,000,000");
        assert_eq!(format_currency(999.0, false), "$999");
        assert_eq!(format_currency(1_234.5, true), "$1,234.50");
        assert_eq!(format_currency(600.0, true), "$600.00");
    }

    #[test]
    fn test_claim_status_card_and_sentence() {
        let request = OperationRequest::ClaimStatus {
            claim_id: "98765".into(),
        };
        let outcome = OperationOutcome::ClaimStatus(vec![ClaimStatus {
            claim_id: "98765".into(),
            status: "In Review".into(),
            last_updated: Some("2024-05-01".into()),
            extra: Map::new(),
        }]);

        let output = compose_operation(&request, &outcome);
        let card = output.cards.get(CARD_CLAIM_STATUS).unwrap();
        assert_eq!(card["claim_id"], "98765");
        assert_eq!(card["status"], "In Review");
        assert_eq!(output.messages[0].ui.as_deref(), Some(CARD_CLAIM_STATUS));
        assert!(output.messages[0].text.contains("In Review"));
    }

    #[test]
    fn test_policy_with_claim_fields_is_still_policy_card() {
        let mut extra = Map::new();
        extra.insert("claim_id".into(), json!("98765"));
        extra.insert("status".into(), json!("active"));
        let outcome = OperationOutcome::PolicyDetails(PolicyDetails {
            policy_id: Some("POL-1001".into()),
            user_id: Some("USER-001".into()),
            plan: Some("Gold".into()),
            collision_coverage: Some(50_000.0),
            roadside_assistance: Some(true),
            deductible: Some(500.0),
            extra,
        });
        let request = OperationRequest::PolicyLookup {
            user_id: "USER-001".into(),
        };

        let output = compose_operation(&request, &outcome);
        assert_eq!(output.cards.len(), 1);
        assert!(output.cards.contains_key(CARD_POLICY_DETAILS));
        assert_eq!(
            output.messages[0].text,
            "Policy POL-1001 is on the Gold plan, collision coverage $50,000, deductible $500, roadside assistance included."
        );
    }

    #[test]
    fn test_premium_sentence() {
        let request = OperationRequest::CalculatePremium(PremiumRequest {
            policy_id: "POL-1001".into(),
            current_coverage: 50_000.0,
            new_coverage: 80_000.0,
        });
        let outcome = OperationOutcome::PremiumCalculation(PremiumQuote {
            policy_id: "POL-1001".into(),
            current_premium: 600.0,
            new_premium: 960.0,
        });

        let output = compose_operation(&request, &outcome);
        assert!(output.cards.contains_key(CARD_PREMIUM_CALCULATION));
        assert_eq!(
            output.messages[0].text,
            "Your premium would change from $600.00 to $960.00 for coverage increase from $50,000 to $80,000 per period on policy POL-1001."
        );
    }

    #[test]
    fn test_unstructured_has_no_card() {
        let request = OperationRequest::ClaimStatus {
            claim_id: "1".into(),
        };
        let output =
            compose_operation(&request, &OperationOutcome::Unstructured(json!({"note": "odd"})));
        assert!(output.cards.is_empty());
        assert_eq!(output.messages[0].text, "Result of claim_status: note: odd.");
    }

    #[test]
    fn test_empty_knowledge_says_nothing_found() {
        let output = compose_knowledge(KnowledgeResults::new("moon insurance", vec![]));
        let card = output.cards.get(CARD_KNOWLEDGE_BASE).unwrap();
        assert_eq!(card["results"], json!([]));
        assert_eq!(output.messages[0].text, NO_KNOWLEDGE_MESSAGE);
    }

    #[test]
    fn test_knowledge_quotes_passages_and_sources() {
        let results = KnowledgeResults::new(
            "gold deductible",
            vec![KnowledgeHit {
                content: "The Gold plan deductible is $500.".into(),
                source: "plans.md".into(),
                score: 0.8,
            }],
        );
        let output = compose_knowledge(results);
        assert!(output.messages[0].text.contains("$500"));
        assert!(output.messages[0].text.contains("Sources: plans.md"));
        assert_eq!(output.cards[CARD_KNOWLEDGE_BASE]["sources"], json!(["plans.md"]));
    }

    #[test]
    fn test_failures_map_to_codes() {
        let request = OperationRequest::ClaimStatus {
            claim_id: "00000".into(),
        };

        let output = compose_failure(&request, &BackendError::NotFound("claim".into()));
        assert_eq!(output.error, Some(ErrorCode::NotFound));
        assert_eq!(output.messages[0].text, "I couldn't find a claim with ID 00000.");

        let output = compose_failure(&request, &BackendError::Unavailable("timeout".into()));
        assert_eq!(output.error, Some(ErrorCode::UpstreamError));
        assert_eq!(output.messages[0].text, UPSTREAM_APOLOGY);
        assert!(!output.messages[0].text.contains("timeout"));
    }

    #[test]
    fn test_envelope_actions_follow_session_phase() {
        let mut session = Session::new("s-1");
        let idle = envelope(TurnOutput::say("hi"), &session);
        assert!(idle.actions.is_none());
        assert!(!idle.pending_confirmation());
        assert!(idle.cards.is_none());

        session.phase = ConversationPhase::AwaitingConfirmation(PendingAction {
            id: "a-1".into(),
            summary: "Check status for claim ID 98765?".into(),
            request: OperationRequest::ClaimStatus {
                claim_id: "98765".into(),
            },
            created_at: Utc::now(),
        });
        let pending = envelope(TurnOutput::say("confirm?"), &session);
        let actions = pending.actions.as_ref().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Confirm);
        assert_eq!(actions[0].payload["arguments"]["claim_id"], "98765");
        assert!(pending.pending_confirmation());
    }
}
