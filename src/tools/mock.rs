//! In-process mock of the insurance provider
//!
//! Seeded with two policies and two claims. Applies the same rules the real
//! provider enforces so rejection paths can be exercised without a server.

use super::{BackendError, BackendOperations, BackendResult};
use crate::models::{
    ClaimReceipt, ClaimStatus, ClaimSubmission, OperationOutcome, PolicyDetails, PremiumQuote,
    PremiumRequest,
};
use crate::slots::validate::MIN_DAMAGE_DESCRIPTION_CHARS;
use chrono::Utc;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

const FIRST_SUBMITTED_CLAIM_ID: u64 = 10_000;
const DEFAULT_RATE: f64 = 0.014;

/// Annual premium per dollar of coverage, by plan.
fn plan_rate(plan: Option<&str>) -> f64 {
    match plan.map(str::to_lowercase).as_deref() {
        Some("gold") => 0.012,
        Some("silver") => 0.015,
        _ => DEFAULT_RATE,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct MockBackend {
    policies: Arc<RwLock<HashMap<String, PolicyDetails>>>,
    claims: Arc<RwLock<HashMap<String, ClaimStatus>>>,
    next_claim_id: AtomicU64,
}

impl MockBackend {
    pub fn new() -> Self {
        let policies = [
            seeded_policy("POL-1001", "USER-001", "Gold", 50_000.0, true, 500.0),
            seeded_policy("POL-1002", "USER-002", "Silver", 25_000.0, false, 1_000.0),
        ];
        let claims = [
            seeded_claim("98765", "In Review", "2024-05-01"),
            seeded_claim("12345", "Approved", "2024-04-18"),
        ];

        Self {
            policies: Arc::new(RwLock::new(
                policies
                    .into_iter()
                    .filter_map(|p| p.policy_id.clone().map(|id| (id, p)))
                    .collect(),
            )),
            claims: Arc::new(RwLock::new(
                claims
                    .into_iter()
                    .map(|c| (c.claim_id.clone(), c))
                    .collect(),
            )),
            next_claim_id: AtomicU64::new(FIRST_SUBMITTED_CLAIM_ID),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn seeded_policy(
    policy_id: &str,
    user_id: &str,
    plan: &str,
    collision_coverage: f64,
    roadside_assistance: bool,
    deductible: f64,
) -> PolicyDetails {
    PolicyDetails {
        policy_id: Some(policy_id.to_string()),
        user_id: Some(user_id.to_string()),
        plan: Some(plan.to_string()),
        collision_coverage: Some(collision_coverage),
        roadside_assistance: Some(roadside_assistance),
        deductible: Some(deductible),
        extra: Map::new(),
    }
}

fn seeded_claim(claim_id: &str, status: &str, last_updated: &str) -> ClaimStatus {
    ClaimStatus {
        claim_id: claim_id.to_string(),
        status: status.to_string(),
        last_updated: Some(last_updated.to_string()),
        extra: Map::new(),
    }
}

#[async_trait::async_trait]
impl BackendOperations for MockBackend {
    async fn policy_lookup(&self, user_id: &str) -> BackendResult<OperationOutcome> {
        let policies = self.policies.read().await;
        policies
            .values()
            .find(|p| {
                p.user_id
                    .as_deref()
                    .map(|u| u.eq_ignore_ascii_case(user_id))
                    .unwrap_or(false)
            })
            .cloned()
            .map(OperationOutcome::PolicyDetails)
            .ok_or_else(|| BackendError::NotFound(format!("no policy for user {}", user_id)))
    }

    async fn claim_status(&self, claim_id: &str) -> BackendResult<OperationOutcome> {
        let claims = self.claims.read().await;
        claims
            .get(claim_id)
            .cloned()
            .map(|claim| OperationOutcome::ClaimStatus(vec![claim]))
            .ok_or_else(|| BackendError::NotFound(format!("claim {}", claim_id)))
    }

    async fn submit_claim(&self, claim: &ClaimSubmission) -> BackendResult<OperationOutcome> {
        if claim.damage_description.chars().count() < MIN_DAMAGE_DESCRIPTION_CHARS {
            return Err(BackendError::Rejected {
                status: 400,
                detail: format!(
                    "damage_description must be at least {} characters",
                    MIN_DAMAGE_DESCRIPTION_CHARS
                ),
            });
        }
        if !self.policies.read().await.contains_key(&claim.policy_id) {
            return Err(BackendError::NotFound(format!("policy {}", claim.policy_id)));
        }

        let claim_id = self.next_claim_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.claims.write().await.insert(
            claim_id.clone(),
            ClaimStatus {
                claim_id: claim_id.clone(),
                status: "Submitted".to_string(),
                last_updated: Some(Utc::now().format("%Y-%m-%d").to_string()),
                extra: Map::new(),
            },
        );

        info!(claim_id = %claim_id, policy_id = %claim.policy_id, "Mock claim submitted");

        Ok(OperationOutcome::ClaimSubmitted(ClaimReceipt {
            claim_id,
            message: Some("We'll review it and contact you shortly.".to_string()),
        }))
    }

    async fn calculate_premium(
        &self,
        request: &PremiumRequest,
    ) -> BackendResult<OperationOutcome> {
        if request.new_coverage <= request.current_coverage {
            return Err(BackendError::Rejected {
                status: 400,
                detail: "new_coverage must be greater than current_coverage".to_string(),
            });
        }

        let policies = self.policies.read().await;
        let policy = policies
            .get(&request.policy_id)
            .ok_or_else(|| BackendError::NotFound(format!("policy {}", request.policy_id)))?;
        let rate = plan_rate(policy.plan.as_deref());

        Ok(OperationOutcome::PremiumCalculation(PremiumQuote {
            policy_id: request.policy_id.clone(),
            current_premium: round_cents(request.current_coverage * rate),
            new_premium: round_cents(request.new_coverage * rate),
        }))
    }
}
