//! Confirmation gate
//!
//! idle → collecting → awaiting_confirmation → executing → idle
//!
//! A side-effecting request only reaches the backend from
//! `awaiting_confirmation` after an affirmative reply. Any other reply
//! discards it. Backend failures become chat messages and the session returns
//! to idle; nothing is retried.

use crate::composer::{self, TurnOutput};
use crate::models::{
    ConversationPhase, Field, OperationOutcome, OperationRequest, PendingAction, Session,
};
use crate::tools::{BackendError, BackendOperations};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const AFFIRMATIVES: &[&str] = &[
    "yes", "y", "approve", "confirm", "ok", "okay", "sure", "yep", "yeah",
];

pub const CANCELLED_MESSAGE: &str = "Okay, cancelled.";
const NOTHING_PENDING_MESSAGE: &str = "There's nothing waiting for your confirmation.";

/// Case-insensitive match against the affirmative set, ignoring trailing
/// punctuation ("Yes!" approves, "yes please" does not).
pub fn is_affirmative(reply: &str) -> bool {
    let normalized = reply
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    AFFIRMATIVES.contains(&normalized.as_str())
}

/// Plain-language description of the exact call about to be made.
pub fn summarize(request: &OperationRequest) -> String {
    match request {
        OperationRequest::ClaimStatus { claim_id } => {
            format!("Check status for claim ID {}?", claim_id)
        }
        OperationRequest::SubmitClaim(claim) => {
            let mut summary = format!(
                "Submit claim for policy {} on vehicle '{}' with description '{}'",
                claim.policy_id, claim.vehicle, claim.damage_description
            );
            if !claim.photos.is_empty() {
                summary.push_str(&format!(" and photos {}", claim.photos.join(", ")));
            }
            summary.push('?');
            summary
        }
        OperationRequest::CalculatePremium(premium) => format!(
            "Calculate premium for policy {} changing coverage from {} to {}?",
            premium.policy_id,
            composer::format_currency(premium.current_coverage, false),
            composer::format_currency(premium.new_coverage, false)
        ),
        OperationRequest::PolicyLookup { user_id } => {
            format!("Look up policy details for user {}?", user_id)
        }
    }
}

/// The identifier a NOT_FOUND answer refers to.
fn lookup_field(request: &OperationRequest) -> Field {
    match request {
        OperationRequest::ClaimStatus { .. } => Field::ClaimId,
        OperationRequest::PolicyLookup { .. } => Field::UserId,
        OperationRequest::SubmitClaim(_) | OperationRequest::CalculatePremium(_) => {
            Field::PolicyId
        }
    }
}

/// Result of interpreting a reply to a pending action.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub output: TurnOutput,
    /// The request sent to the backend, if the reply approved one.
    pub executed: Option<OperationRequest>,
}

#[derive(Clone)]
pub struct ConfirmationGate {
    backend: Arc<dyn BackendOperations>,
}

impl ConfirmationGate {
    pub fn new(backend: Arc<dyn BackendOperations>) -> Self {
        Self { backend }
    }

    /// collecting → awaiting_confirmation
    pub fn propose(&self, session: &mut Session, request: OperationRequest) -> TurnOutput {
        let action = PendingAction {
            id: format!("confirm-{}", Uuid::new_v4()),
            summary: summarize(&request),
            request,
            created_at: Utc::now(),
        };

        info!(
            session_id = %session.session_id,
            operation = %action.request.kind(),
            action_id = %action.id,
            "Awaiting confirmation"
        );

        let text = format!("{} Please reply yes to confirm or no to cancel.", action.summary);
        session.phase = ConversationPhase::AwaitingConfirmation(action);
        TurnOutput::say(text)
    }

    /// awaiting_confirmation → executing → idle, or awaiting_confirmation → idle
    pub async fn resolve(&self, session: &mut Session, reply: &str) -> Resolution {
        match std::mem::take(&mut session.phase) {
            ConversationPhase::AwaitingConfirmation(action) => {
                if is_affirmative(reply) {
                    info!(
                        session_id = %session.session_id,
                        action_id = %action.id,
                        "Pending action approved"
                    );
                    let request = action.request.clone();
                    let output = self.run(session, action).await;
                    Resolution {
                        output,
                        executed: Some(request),
                    }
                } else {
                    info!(
                        session_id = %session.session_id,
                        action_id = %action.id,
                        "Pending action cancelled"
                    );
                    Resolution {
                        output: TurnOutput::say(CANCELLED_MESSAGE),
                        executed: None,
                    }
                }
            }
            other => {
                session.phase = other;
                Resolution {
                    output: TurnOutput::say(NOTHING_PENDING_MESSAGE),
                    executed: None,
                }
            }
        }
    }

    /// Run a read-only request immediately, skipping the confirmation step.
    pub async fn execute_read_only(
        &self,
        session: &mut Session,
        request: OperationRequest,
    ) -> TurnOutput {
        let action = PendingAction {
            id: format!("direct-{}", Uuid::new_v4()),
            summary: summarize(&request),
            request,
            created_at: Utc::now(),
        };
        self.run(session, action).await
    }

    async fn run(&self, session: &mut Session, action: PendingAction) -> TurnOutput {
        let request = action.request.clone();
        session.phase = ConversationPhase::Executing(action);

        let result = self.backend.perform(&request).await;
        session.reset();

        match result {
            Ok(outcome) => {
                info!(
                    session_id = %session.session_id,
                    operation = %request.kind(),
                    "Operation completed"
                );
                remember_outcome_ids(session, &outcome);
                composer::compose_operation(&request, &outcome)
            }
            Err(error) => {
                warn!(
                    session_id = %session.session_id,
                    operation = %request.kind(),
                    code = %error.code(),
                    error = %error,
                    "Operation failed"
                );
                if matches!(error, BackendError::NotFound(_)) {
                    session.resolved.forget(lookup_field(&request));
                }
                composer::compose_failure(&request, &error)
            }
        }
    }
}

fn remember_outcome_ids(session: &mut Session, outcome: &OperationOutcome) {
    match outcome {
        OperationOutcome::PolicyDetails(policy) => {
            if let Some(policy_id) = &policy.policy_id {
                session.resolved.remember(Field::PolicyId, policy_id);
            }
        }
        OperationOutcome::ClaimSubmitted(receipt) => {
            session.resolved.remember(Field::ClaimId, &receipt.claim_id);
        }
        _ => {}
    }
}
