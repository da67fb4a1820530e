//! Backend operations provider
//!
//! The four insurance operations the chat can trigger. `http` talks to the
//! real provider service; `mock` is an in-process stand-in for demos and
//! tests. Validation of business rules belongs to the provider; callers only
//! see the three failure kinds below.

pub mod http;
pub mod mock;

pub use http::InsuranceApiClient;
pub use mock::MockBackend;

use crate::config::{BackendConfig, BackendMode};
use crate::error::ErrorCode;
use crate::models::{ClaimSubmission, OperationOutcome, OperationRequest, PremiumRequest};
use crate::Result;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider refused the request on validation or business grounds.
    #[error("Rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Network failure, timeout, 5xx or an unreadable response.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::NotFound(_) => ErrorCode::NotFound,
            BackendError::Rejected { .. } => ErrorCode::BusinessRuleViolation,
            BackendError::Unavailable(_) => ErrorCode::UpstreamError,
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Trait for the backend operations provider
#[async_trait::async_trait]
pub trait BackendOperations: Send + Sync {
    async fn policy_lookup(&self, user_id: &str) -> BackendResult<OperationOutcome>;
    async fn claim_status(&self, claim_id: &str) -> BackendResult<OperationOutcome>;
    async fn submit_claim(&self, claim: &ClaimSubmission) -> BackendResult<OperationOutcome>;
    async fn calculate_premium(&self, request: &PremiumRequest)
        -> BackendResult<OperationOutcome>;

    /// Run a resolved request against the matching operation.
    async fn perform(&self, request: &OperationRequest) -> BackendResult<OperationOutcome> {
        match request {
            OperationRequest::PolicyLookup { user_id } => self.policy_lookup(user_id).await,
            OperationRequest::ClaimStatus { claim_id } => self.claim_status(claim_id).await,
            OperationRequest::SubmitClaim(claim) => self.submit_claim(claim).await,
            OperationRequest::CalculatePremium(premium) => self.calculate_premium(premium).await,
        }
    }
}

/// Build the provider selected by `BACKEND_MODE`.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn BackendOperations>> {
    match config.mode {
        BackendMode::Http => Ok(Arc::new(InsuranceApiClient::new(config)?)),
        BackendMode::Mock => Ok(Arc::new(MockBackend::new())),
    }
}
