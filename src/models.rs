//! Core data models for the insurance chat orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ErrorCode;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    /// Unknown or missing roles degrade to `User`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_lowercase()).as_deref() {
            Some("admin") => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Knowledge,
    Operation,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ClaimStatus,
    SubmitClaim,
    CalculatePremium,
    PolicyLookup,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ClaimStatus => "claim_status",
            OperationKind::SubmitClaim => "submit_claim",
            OperationKind::CalculatePremium => "calculate_premium",
            OperationKind::PolicyLookup => "policy_lookup",
        }
    }

    /// Required slots, in the order they are asked for.
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            OperationKind::ClaimStatus => &[Field::ClaimId],
            OperationKind::SubmitClaim => {
                &[Field::PolicyId, Field::Vehicle, Field::DamageDescription]
            }
            OperationKind::CalculatePremium => {
                &[Field::PolicyId, Field::CurrentCoverage, Field::NewCoverage]
            }
            OperationKind::PolicyLookup => &[Field::UserId],
        }
    }

    /// Read-only operations execute immediately; everything else goes
    /// through the confirmation gate.
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, OperationKind::PolicyLookup)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named slot an operation can require.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ClaimId,
    PolicyId,
    DamageDescription,
    Vehicle,
    Photos,
    CurrentCoverage,
    NewCoverage,
    UserId,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ClaimId => "claim_id",
            Field::PolicyId => "policy_id",
            Field::DamageDescription => "damage_description",
            Field::Vehicle => "vehicle",
            Field::Photos => "photos",
            Field::CurrentCoverage => "current_coverage",
            Field::NewCoverage => "new_coverage",
            Field::UserId => "user_id",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated slot value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SlotValue {
    Text(String),
    Amount(f64),
    List(Vec<String>),
}

impl SlotValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        match self {
            SlotValue::Amount(v) => Some(*v),
            _ => None,
        }
    }
}

/// Tag of the confirmation state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Collecting,
    AwaitingConfirmation,
    Executing,
}

//
// ================= Operation Requests =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimSubmission {
    pub policy_id: String,
    pub damage_description: String,
    pub vehicle: String,
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiumRequest {
    pub policy_id: String,
    pub current_coverage: f64,
    pub new_coverage: f64,
}

/// A fully resolved call to the backend operations provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", content = "arguments", rename_all = "snake_case")]
pub enum OperationRequest {
    ClaimStatus { claim_id: String },
    SubmitClaim(ClaimSubmission),
    CalculatePremium(PremiumRequest),
    PolicyLookup { user_id: String },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::ClaimStatus { .. } => OperationKind::ClaimStatus,
            OperationRequest::SubmitClaim(_) => OperationKind::SubmitClaim,
            OperationRequest::CalculatePremium(_) => OperationKind::CalculatePremium,
            OperationRequest::PolicyLookup { .. } => OperationKind::PolicyLookup,
        }
    }
}

//
// ================= Operation Results =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roadside_assistance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deductible: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimStatus {
    pub claim_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimReceipt {
    pub claim_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiumQuote {
    pub policy_id: String,
    pub current_premium: f64,
    pub new_premium: f64,
}

/// Result of a backend operation, tagged at the call site.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    PolicyDetails(PolicyDetails),
    ClaimStatus(Vec<ClaimStatus>),
    ClaimSubmitted(ClaimReceipt),
    PremiumCalculation(PremiumQuote),
    /// Payload the call site could not type; rendered as plain text.
    Unstructured(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeHit {
    pub content: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeResults {
    pub query: String,
    pub results: Vec<KnowledgeHit>,
    pub sources: Vec<String>,
}

impl KnowledgeResults {
    pub fn new(query: impl Into<String>, results: Vec<KnowledgeHit>) -> Self {
        let mut sources: Vec<String> = Vec::with_capacity(results.len());
        for hit in &results {
            if !sources.contains(&hit.source) {
                sources.push(hit.source.clone());
            }
        }

        Self {
            query: query.into(),
            results,
            sources,
        }
    }
}

//
// ================= Session =================
//

/// Partially filled arguments of the operation being collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotFill {
    pub operation: OperationKind,
    pub slots: BTreeMap<Field, SlotValue>,
    /// Field the last prompt asked for; the next answer fills it.
    pub awaiting: Option<Field>,
}

impl SlotFill {
    pub fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            slots: BTreeMap::new(),
            awaiting: None,
        }
    }

    pub fn next_missing(&self) -> Option<Field> {
        self.operation
            .required_fields()
            .iter()
            .copied()
            .find(|field| !self.slots.contains_key(field))
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.slots.get(&field).and_then(SlotValue::as_text)
    }

    pub fn amount(&self, field: Field) -> Option<f64> {
        self.slots.get(&field).and_then(SlotValue::as_amount)
    }
}

/// A proposed side-effecting call awaiting approval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAction {
    pub id: String,
    pub summary: String,
    pub request: OperationRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConversationPhase {
    #[default]
    Idle,
    Collecting(SlotFill),
    AwaitingConfirmation(PendingAction),
    Executing(PendingAction),
}

/// Identifiers validated in earlier turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResolvedIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ResolvedIds {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::ClaimId => self.claim_id.as_deref(),
            Field::PolicyId => self.policy_id.as_deref(),
            Field::UserId => self.user_id.as_deref(),
            _ => None,
        }
    }

    pub fn remember(&mut self, field: Field, value: &str) {
        let slot = match field {
            Field::ClaimId => &mut self.claim_id,
            Field::PolicyId => &mut self.policy_id,
            Field::UserId => &mut self.user_id,
            _ => return,
        };
        *slot = Some(value.to_string());
    }

    pub fn forget(&mut self, field: Field) {
        match field {
            Field::ClaimId => self.claim_id = None,
            Field::PolicyId => self.policy_id = None,
            Field::UserId => self.user_id = None,
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub last_intent: Option<Intent>,
    pub phase: ConversationPhase,
    pub resolved: ResolvedIds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            last_intent: None,
            phase: ConversationPhase::Idle,
            resolved: ResolvedIds::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn gate_state(&self) -> GateState {
        match self.phase {
            ConversationPhase::Idle => GateState::Idle,
            ConversationPhase::Collecting(_) => GateState::Collecting,
            ConversationPhase::AwaitingConfirmation(_) => GateState::AwaitingConfirmation,
            ConversationPhase::Executing(_) => GateState::Executing,
        }
    }

    pub fn pending_confirmation(&self) -> bool {
        matches!(self.phase, ConversationPhase::AwaitingConfirmation(_))
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        match &self.phase {
            ConversationPhase::AwaitingConfirmation(action) => Some(action),
            _ => None,
        }
    }

    pub fn awaiting_field(&self) -> Option<Field> {
        match &self.phase {
            ConversationPhase::Collecting(fill) => fill.awaiting,
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.phase = ConversationPhase::Idle;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

//
// ================= Chat Turn I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Assistant,
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub from: Sender,
    pub text: String,
    /// Name of the card this message describes, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<String>,
}

impl ChatMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            from: Sender::Assistant,
            text: text.into(),
            ui: None,
        }
    }

    pub fn with_ui(mut self, card: &str) -> Self {
        self.ui = Some(card.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Confirm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub id: String,
    pub summary: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub session_id: String,
    pub pending_confirmation: bool,
    pub phase: GateState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<Field>,
    #[serde(flatten)]
    pub resolved: ResolvedIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

/// The unit returned to the caller each turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ConfirmAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSnapshot>,
}

impl ResponseEnvelope {
    pub fn pending_confirmation(&self) -> bool {
        self.state
            .as_ref()
            .map(|s| s.pending_confirmation)
            .unwrap_or(false)
    }

    pub fn card(&self, name: &str) -> Option<&Value> {
        self.cards.as_ref().and_then(|cards| cards.get(name))
    }

    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
