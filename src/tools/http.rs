//! HTTP client for the insurance provider service
//!
//! Logs in with the service account, caches the bearer token and refreshes it
//! once when the provider answers 401. Status codes are folded into
//! `BackendError` here so nothing above this layer sees raw HTTP.

use super::{BackendError, BackendOperations, BackendResult};
use crate::config::BackendConfig;
use crate::models::{
    ClaimReceipt, ClaimStatus, ClaimSubmission, OperationOutcome, PolicyDetails, PremiumQuote,
    PremiumRequest,
};
use crate::Result;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct InsuranceApiClient {
    client: Client,
    base_url: String,
    service_email: String,
    service_password: String,
    token: Mutex<Option<String>>,
}

impl InsuranceApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_email: config.service_email.clone(),
            service_password: config.service_password.clone(),
            token: Mutex::new(None),
        })
    }

    async fn login(&self) -> BackendResult<String> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "email": self.service_email,
                "password": self.service_password,
            }))
            .send()
            .await
            .map_err(|e| transport_error("/auth/login", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "service login returned {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(format!("invalid login response: {}", e)))?;

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::Unavailable("login response carried no access_token".to_string())
            })
    }

    async fn bearer_token(&self) -> BackendResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> BackendResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut refreshed = false;

        loop {
            let token = self.bearer_token().await?;
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| transport_error(path, e))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!(path, "Service token rejected, logging in again");
                *self.token.lock().await = None;
                refreshed = true;
                continue;
            }

            if status.is_success() {
                return response.json::<Value>().await.map_err(|e| {
                    BackendError::Unavailable(format!("invalid JSON from {}: {}", path, e))
                });
            }

            let payload = response.json::<Value>().await.unwrap_or(Value::Null);
            return Err(status_error(path, status, &payload));
        }
    }
}

fn transport_error(path: &str, error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Unavailable(format!("request to {} timed out", path))
    } else {
        BackendError::Unavailable(format!("request to {} failed: {}", path, error))
    }
}

/// Human-readable reason from a provider error body. The provider sends
/// `message` as a string or as a list of validation messages.
fn error_detail(payload: &Value) -> Option<String> {
    match payload.get("message") {
        Some(Value::String(message)) if !message.is_empty() => Some(message.clone()),
        Some(Value::Array(messages)) if !messages.is_empty() => Some(
            messages
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => payload
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn status_error(path: &str, status: StatusCode, payload: &Value) -> BackendError {
    let detail = error_detail(payload);
    warn!(path, status = status.as_u16(), detail = ?detail, "Backend call failed");

    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(detail.unwrap_or_else(|| path.to_string())),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            BackendError::Rejected {
                status: status.as_u16(),
                detail: detail.unwrap_or_else(|| "the request was rejected".to_string()),
            }
        }
        _ => BackendError::Unavailable(format!("{} returned {}", path, status)),
    }
}

/// Numeric ids are common in provider payloads; the models carry them as text.
fn stringify_ids(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in ["claim_id", "policy_id", "user_id"] {
                if let Some(Value::Number(n)) = map.get(key) {
                    let text = n.to_string();
                    map.insert(key.to_string(), Value::String(text));
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(stringify_ids),
        _ => {}
    }
}

fn typed<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

#[async_trait::async_trait]
impl BackendOperations for InsuranceApiClient {
    async fn policy_lookup(&self, user_id: &str) -> BackendResult<OperationOutcome> {
        let mut value = self
            .request(Method::GET, "/insurance/policy", &[("user_id", user_id)], None)
            .await?;
        stringify_ids(&mut value);

        Ok(match value {
            Value::Null => return Err(BackendError::NotFound(format!("policy for {}", user_id))),
            Value::Object(_) => typed::<PolicyDetails>(&value)
                .map(OperationOutcome::PolicyDetails)
                .unwrap_or(OperationOutcome::Unstructured(value)),
            other => OperationOutcome::Unstructured(other),
        })
    }

    async fn claim_status(&self, claim_id: &str) -> BackendResult<OperationOutcome> {
        let mut value = self
            .request(Method::GET, "/insurance/claims", &[("claim_id", claim_id)], None)
            .await?;
        stringify_ids(&mut value);

        let claims = match &value {
            Value::Array(items) if items.is_empty() => {
                return Err(BackendError::NotFound(format!("claim {}", claim_id)))
            }
            Value::Array(_) => typed::<Vec<ClaimStatus>>(&value),
            Value::Object(_) => typed::<ClaimStatus>(&value).map(|claim| vec![claim]),
            Value::Null => return Err(BackendError::NotFound(format!("claim {}", claim_id))),
            _ => None,
        };

        Ok(claims
            .map(OperationOutcome::ClaimStatus)
            .unwrap_or(OperationOutcome::Unstructured(value)))
    }

    async fn submit_claim(&self, claim: &ClaimSubmission) -> BackendResult<OperationOutcome> {
        let body = serde_json::to_value(claim)
            .map_err(|e| BackendError::Unavailable(format!("unserializable claim: {}", e)))?;
        let mut value = self
            .request(Method::POST, "/insurance/claims", &[], Some(&body))
            .await?;
        stringify_ids(&mut value);

        Ok(typed::<ClaimReceipt>(&value)
            .map(OperationOutcome::ClaimSubmitted)
            .unwrap_or(OperationOutcome::Unstructured(value)))
    }

    async fn calculate_premium(
        &self,
        request: &PremiumRequest,
    ) -> BackendResult<OperationOutcome> {
        let body = serde_json::to_value(request)
            .map_err(|e| BackendError::Unavailable(format!("unserializable request: {}", e)))?;
        let mut value = self
            .request(Method::POST, "/insurance/premium", &[], Some(&body))
            .await?;
        stringify_ids(&mut value);

        Ok(typed::<PremiumQuote>(&value)
            .map(OperationOutcome::PremiumCalculation)
            .unwrap_or(OperationOutcome::Unstructured(value)))
    }
}
