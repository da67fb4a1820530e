//! Slot collector
//!
//! Accumulates the arguments an operation needs across turns. Values are
//! validated as they arrive; a rejected value leaves the collection where it
//! was and re-asks for that field only. Once every required field is valid
//! the collector hands back a resolved request. It never calls the backend.

pub mod extract;
pub mod validate;

pub use validate::FieldError;

use crate::models::{
    ClaimSubmission, Field, OperationKind, OperationRequest, PremiumRequest, ResolvedIds,
    SlotFill, SlotValue,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum CollectOutcome {
    /// Still missing a field; `prompt` asks for it.
    Incomplete { field: Field, prompt: &'static str },
    /// At least one value was rejected.
    Invalid(Vec<FieldError>),
    Ready(OperationRequest),
}

pub struct SlotCollector;

impl SlotCollector {
    /// Start collecting for `operation`, pre-filled with identifiers the
    /// session already resolved.
    pub fn begin(operation: OperationKind, resolved: &ResolvedIds) -> SlotFill {
        let mut fill = SlotFill::new(operation);
        for field in operation.required_fields() {
            if let Some(value) = resolved.get(*field) {
                fill.slots.insert(*field, SlotValue::Text(value.to_string()));
            }
        }
        fill
    }

    pub fn collect(fill: &mut SlotFill, message: &str) -> CollectOutcome {
        let mut errors = Vec::new();

        for (field, raw) in extract::extract(fill, message) {
            match validate::validate(field, &raw) {
                Ok(value) => {
                    debug!(operation = %fill.operation, field = %field, "Slot filled");
                    fill.slots.insert(field, value);
                }
                Err(error) => {
                    debug!(
                        operation = %fill.operation,
                        field = %field,
                        code = %error.code,
                        "Slot rejected"
                    );
                    fill.slots.remove(&field);
                    errors.push(error);
                }
            }
        }

        if let Some(error) = validate::check_business_rules(fill) {
            fill.slots.remove(&error.field);
            errors.push(error);
        }

        if let Some(first) = errors.first() {
            fill.awaiting = Some(first.field);
            return CollectOutcome::Invalid(errors);
        }

        match fill.next_missing() {
            Some(field) => {
                fill.awaiting = Some(field);
                CollectOutcome::Incomplete {
                    field,
                    prompt: prompt_for(field),
                }
            }
            None => match resolve(fill) {
                Some(request) => {
                    fill.awaiting = None;
                    CollectOutcome::Ready(request)
                }
                // Every required field is present, so a miss here means a
                // slot holds the wrong kind of value; ask for the first one.
                None => {
                    let field = fill.operation.required_fields()[0];
                    fill.slots.remove(&field);
                    fill.awaiting = Some(field);
                    CollectOutcome::Incomplete {
                        field,
                        prompt: prompt_for(field),
                    }
                }
            },
        }
    }
}

pub fn prompt_for(field: Field) -> &'static str {
    match field {
        Field::ClaimId => "Please provide your claim ID (alphanumeric, up to 10 characters).",
        Field::PolicyId => "Please provide your policy ID (e.g. POL-1001).",
        Field::Vehicle => "Please provide the vehicle (make/model/year).",
        Field::DamageDescription => "Please describe the damage (at least 10 characters).",
        Field::Photos => "You can list photo file names for the claim (optional).",
        Field::CurrentCoverage => {
            "What is your current coverage amount? (between $1,000 and $10,000,000)"
        }
        Field::NewCoverage => {
            "What new coverage amount would you like? It must be greater than your current coverage."
        }
        Field::UserId => "Please provide your user ID (e.g. USER-002).",
    }
}

fn resolve(fill: &SlotFill) -> Option<OperationRequest> {
    let text = |field: Field| fill.text(field).map(str::to_string);

    let request = match fill.operation {
        OperationKind::ClaimStatus => OperationRequest::ClaimStatus {
            claim_id: text(Field::ClaimId)?,
        },
        OperationKind::PolicyLookup => OperationRequest::PolicyLookup {
            user_id: text(Field::UserId)?,
        },
        OperationKind::SubmitClaim => OperationRequest::SubmitClaim(ClaimSubmission {
            policy_id: text(Field::PolicyId)?,
            damage_description: text(Field::DamageDescription)?,
            vehicle: text(Field::Vehicle)?,
            photos: match fill.slots.get(&Field::Photos) {
                Some(SlotValue::List(photos)) => photos.clone(),
                _ => Vec::new(),
            },
        }),
        OperationKind::CalculatePremium => OperationRequest::CalculatePremium(PremiumRequest {
            policy_id: text(Field::PolicyId)?,
            current_coverage: fill.amount(Field::CurrentCoverage)?,
            new_coverage: fill.amount(Field::NewCoverage)?,
        }),
    };

    Some(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_claim_status_ready_from_single_message() {
        let mut fill = SlotCollector::begin(OperationKind::ClaimStatus, &ResolvedIds::default());
        let outcome = SlotCollector::collect(&mut fill, "Check claim status 98765");
        assert_eq!(
            outcome,
            CollectOutcome::Ready(OperationRequest::ClaimStatus {
                claim_id: "98765".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_claim_id_keeps_collecting() {
        let mut fill = SlotCollector::begin(OperationKind::ClaimStatus, &ResolvedIds::default());
        let outcome = SlotCollector::collect(&mut fill, "Check claim status 98765-XYZ");

        match outcome {
            CollectOutcome::Invalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, Field::ClaimId);
                assert_eq!(errors[0].code, ErrorCode::ValidationError);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
        assert_eq!(fill.awaiting, Some(Field::ClaimId));
        assert!(fill.slots.is_empty());

        let retry = SlotCollector::collect(&mut fill, "98765");
        assert!(matches!(retry, CollectOutcome::Ready(_)));
    }

    #[test]
    fn test_premium_rule_violation_reprompts_new_coverage_only() {
        let mut fill =
            SlotCollector::begin(OperationKind::CalculatePremium, &ResolvedIds::default());
        let outcome = SlotCollector::collect(&mut fill, "Calculate premium from 50000 to 30000");

        match outcome {
            CollectOutcome::Invalid(errors) => {
                assert_eq!(errors[0].field, Field::NewCoverage);
                assert_eq!(errors[0].code, ErrorCode::BusinessRuleViolation);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
        assert_eq!(fill.amount(Field::CurrentCoverage), Some(50_000.0));
        assert_eq!(fill.amount(Field::NewCoverage), None);
        assert_eq!(fill.awaiting, Some(Field::NewCoverage));

        let outcome = SlotCollector::collect(&mut fill, "80000");
        assert_eq!(
            outcome,
            CollectOutcome::Incomplete {
                field: Field::PolicyId,
                prompt: prompt_for(Field::PolicyId),
            }
        );

        let outcome = SlotCollector::collect(&mut fill, "POL-1001");
        assert_eq!(
            outcome,
            CollectOutcome::Ready(OperationRequest::CalculatePremium(PremiumRequest {
                policy_id: "POL-1001".to_string(),
                current_coverage: 50_000.0,
                new_coverage: 80_000.0,
            }))
        );
    }

    #[test]
    fn test_submit_claim_walks_through_prompts() {
        let mut fill = SlotCollector::begin(OperationKind::SubmitClaim, &ResolvedIds::default());

        let outcome = SlotCollector::collect(&mut fill, "I need to file a claim");
        assert!(matches!(
            outcome,
            CollectOutcome::Incomplete { field: Field::PolicyId, .. }
        ));

        let outcome = SlotCollector::collect(&mut fill, "POL-1002");
        assert!(matches!(
            outcome,
            CollectOutcome::Incomplete { field: Field::Vehicle, .. }
        ));

        let outcome = SlotCollector::collect(&mut fill, "2021 Honda Civic");
        assert!(matches!(
            outcome,
            CollectOutcome::Incomplete { field: Field::DamageDescription, .. }
        ));

        let outcome = SlotCollector::collect(&mut fill, "dent");
        assert!(matches!(outcome, CollectOutcome::Invalid(_)));
        assert_eq!(fill.awaiting, Some(Field::DamageDescription));

        let outcome =
            SlotCollector::collect(&mut fill, "Rear bumper dented in a parking lot, see rear.jpg");
        match outcome {
            CollectOutcome::Ready(OperationRequest::SubmitClaim(submission)) => {
                assert_eq!(submission.policy_id, "POL-1002");
                assert_eq!(submission.vehicle, "2021 Honda Civic");
                assert_eq!(submission.photos, vec!["rear.jpg".to_string()]);
            }
            other => panic!("expected Ready submission, got {:?}", other),
        }
    }

    #[test]
    fn test_resolved_ids_prefill() {
        let resolved = ResolvedIds {
            user_id: Some("USER-001".to_string()),
            ..Default::default()
        };
        let mut fill = SlotCollector::begin(OperationKind::PolicyLookup, &resolved);
        let outcome = SlotCollector::collect(&mut fill, "show my policy details");
        assert_eq!(
            outcome,
            CollectOutcome::Ready(OperationRequest::PolicyLookup {
                user_id: "USER-001".to_string()
            })
        );
    }

    #[test]
    fn test_awaited_id_inside_a_sentence() {
        let mut fill = SlotCollector::begin(OperationKind::PolicyLookup, &ResolvedIds::default());
        let outcome = SlotCollector::collect(&mut fill, "Show my policy");
        assert!(matches!(
            outcome,
            CollectOutcome::Incomplete { field: Field::UserId, .. }
        ));

        let outcome = SlotCollector::collect(&mut fill, "my user id is 001");
        assert_eq!(
            outcome,
            CollectOutcome::Ready(OperationRequest::PolicyLookup {
                user_id: "001".to_string()
            })
        );
    }

    #[test]
    fn test_sentence_without_an_id_is_not_taken_as_one() {
        let mut fill =
            SlotCollector::begin(OperationKind::CalculatePremium, &ResolvedIds::default());
        SlotCollector::collect(&mut fill, "Calculate premium from 50000 to 80000");
        assert_eq!(fill.awaiting, Some(Field::PolicyId));

        let outcome = SlotCollector::collect(&mut fill, "not sure which one it is");
        match outcome {
            CollectOutcome::Invalid(errors) => {
                assert_eq!(errors[0].field, Field::PolicyId);
                assert_eq!(errors[0].code, ErrorCode::ValidationError);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
        assert!(fill.text(Field::PolicyId).is_none());
        assert_eq!(fill.awaiting, Some(Field::PolicyId));
    }
}
