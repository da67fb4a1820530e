//! Main orchestrator - implements the turn loop
//!
//! MESSAGE → DISPATCH → (KNOWLEDGE | COLLECT → CONFIRM → EXECUTE | FALLBACK) → ENVELOPE
//!
//! The session guard is held for the whole turn, so one session never sees
//! two turns interleave.

use crate::audit::{compute_message_hash, compute_payload_hash, InteractionLog, TurnRecord};
use crate::classifier::{Dispatch, IntentClassifier, Route};
use crate::composer::{self, TurnOutput};
use crate::config::AppConfig;
use crate::confirmation::ConfirmationGate;
use crate::error::ErrorCode;
use crate::knowledge::{self, KnowledgeStore};
use crate::models::{
    ChatMessage, ChatTurnRequest, ConversationPhase, Field, Intent, KnowledgeResults, OperationKind,
    OperationRequest, ResponseEnvelope, Session, UserRole,
};
use crate::slots::{self, CollectOutcome, SlotCollector};
use crate::state::SessionStore;
use crate::tools::{self, BackendOperations};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const FALLBACK_MESSAGE: &str = "I can help with claims, premiums, or policy info.";
pub const ABANDONED_MESSAGE: &str = "Okay, I've dropped that request. What else can I help with?";
const KNOWLEDGE_UNAVAILABLE_MESSAGE: &str =
    "Sorry, I couldn't search our knowledge base right now. Please try again in a moment.";

/// Identifiers worth carrying into later operations.
const REMEMBERED_FIELDS: &[Field] = &[Field::ClaimId, Field::PolicyId, Field::UserId];

/// What a turn did, for the interaction log.
#[derive(Default)]
struct TurnTrace {
    operation: Option<OperationKind>,
    executed: Option<OperationRequest>,
}

#[derive(Clone)]
pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    gate: ConfirmationGate,
    interaction_log: InteractionLog,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        backend: Arc<dyn BackendOperations>,
        top_k: usize,
    ) -> Self {
        Self {
            sessions,
            knowledge,
            gate: ConfirmationGate::new(backend),
            interaction_log: InteractionLog::new(),
            top_k,
        }
    }

    /// Wire up the backend and knowledge store selected by configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = tools::create_backend(&config.backend)?;
        let knowledge = knowledge::create_knowledge_store(&config.knowledge).await?;

        Ok(Self::new(
            Arc::new(SessionStore::new()),
            knowledge,
            backend,
            config.knowledge.top_k,
        ))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn interaction_log(&self) -> &InteractionLog {
        &self.interaction_log
    }

    /// Handle one chat message. Never fails: every problem becomes a chat
    /// message plus an error code in the state snapshot.
    ///
    /// The turn runs on its own task and finishes even if the caller stops
    /// waiting for it.
    pub async fn handle_turn(&self, request: ChatTurnRequest) -> ResponseEnvelope {
        let this = self.clone();
        match tokio::spawn(async move { this.run_turn(request).await }).await {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(code = %ErrorCode::UpstreamError, error = %e, "Turn task failed");
                ResponseEnvelope {
                    messages: vec![ChatMessage::assistant(composer::UPSTREAM_APOLOGY)],
                    actions: None,
                    cards: None,
                    state: None,
                }
            }
        }
    }

    async fn run_turn(&self, request: ChatTurnRequest) -> ResponseEnvelope {
        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let role = UserRole::parse(request.user_role.as_deref());
        let message = request.message.trim();

        let mut guard = self.sessions.acquire(&session_id).await;
        let session: &mut Session = &mut guard;

        if let ConversationPhase::Executing(action) = &session.phase {
            // Left behind by a turn that panicked mid-call
            warn!(
                session_id = %session.session_id,
                action_id = %action.id,
                "Discarding interrupted execution"
            );
            session.reset();
        }

        let dispatch = IntentClassifier::dispatch(message, session, role);
        let mut trace = TurnTrace::default();

        let output = match dispatch {
            Dispatch::ConfirmationReply => {
                trace.operation = session.pending_action().map(|a| a.request.kind());
                let resolution = self.gate.resolve(session, message).await;
                trace.executed = resolution.executed;
                resolution.output
            }
            Dispatch::Continue(operation) => {
                trace.operation = Some(operation);
                self.collect(session, message, &mut trace).await
            }
            Dispatch::Abandon => {
                info!(session_id = %session.session_id, "Collection abandoned");
                session.reset();
                TurnOutput::say(ABANDONED_MESSAGE)
            }
            Dispatch::Route(Route::Operation(operation)) => {
                session.last_intent = Some(Intent::Operation);
                trace.operation = Some(operation);
                let fill = SlotCollector::begin(operation, &session.resolved);
                let prefilled: Vec<(Field, String)> = fill
                    .slots
                    .iter()
                    .filter_map(|(field, value)| Some((*field, value.as_text()?.to_string())))
                    .collect();
                session.phase = ConversationPhase::Collecting(fill);

                let mut output = self.collect(session, message, &mut trace).await;
                if let Some(note) = reuse_note(session, message, &prefilled) {
                    output.messages.insert(0, ChatMessage::assistant(note));
                }
                output
            }
            Dispatch::Route(Route::Knowledge) => {
                session.last_intent = Some(Intent::Knowledge);
                let mut output = self.answer_from_knowledge(message).await;
                if let Some(field) = session.awaiting_field() {
                    output.push(slots::prompt_for(field));
                }
                output
            }
            Dispatch::Route(Route::Fallback) => {
                session.last_intent = Some(Intent::Fallback);
                debug!(
                    session_id = %session.session_id,
                    code = %ErrorCode::UnclassifiedInput,
                    "Routed to fallback"
                );
                TurnOutput::say(FALLBACK_MESSAGE)
            }
        };

        session.touch();
        self.record_turn(session, role, message, &trace, output.error)
            .await;

        info!(
            session_id = %session.session_id,
            phase = ?session.gate_state(),
            code = ?output.error,
            "Turn handled"
        );

        composer::envelope(output, session)
    }

    async fn collect(
        &self,
        session: &mut Session,
        message: &str,
        trace: &mut TurnTrace,
    ) -> TurnOutput {
        let ConversationPhase::Collecting(fill) = &mut session.phase else {
            return TurnOutput::say(FALLBACK_MESSAGE);
        };

        let outcome = SlotCollector::collect(fill, message);
        for field in REMEMBERED_FIELDS {
            if let Some(value) = fill.text(*field) {
                session.resolved.remember(*field, value);
            }
        }

        match outcome {
            CollectOutcome::Incomplete { prompt, .. } => TurnOutput::say(prompt),
            CollectOutcome::Invalid(errors) => {
                let mut output = TurnOutput::default();
                for error in &errors {
                    output.push(error.message.clone());
                }
                output.error = errors.first().map(|e| e.code);
                if let Some(first) = errors.first() {
                    output.push(slots::prompt_for(first.field));
                }
                output
            }
            CollectOutcome::Ready(request) if request.kind().requires_confirmation() => {
                self.gate.propose(session, request)
            }
            CollectOutcome::Ready(request) => {
                trace.executed = Some(request.clone());
                self.gate.execute_read_only(session, request).await
            }
        }
    }

    /// Every knowledge answer is built from a search result; there is no
    /// path that answers without one.
    async fn answer_from_knowledge(&self, query: &str) -> TurnOutput {
        match self.knowledge.search(query, self.top_k).await {
            Ok(hits) => {
                debug!(results = hits.len(), "Knowledge search complete");
                composer::compose_knowledge(KnowledgeResults::new(query, hits))
            }
            Err(e) => {
                warn!(code = %ErrorCode::UpstreamError, error = %e, "Knowledge search failed");
                TurnOutput::failure(ErrorCode::UpstreamError, KNOWLEDGE_UNAVAILABLE_MESSAGE)
            }
        }
    }

    async fn record_turn(
        &self,
        session: &Session,
        role: UserRole,
        message: &str,
        trace: &TurnTrace,
        error: Option<ErrorCode>,
    ) {
        let record = TurnRecord {
            record_id: Uuid::new_v4(),
            session_id: session.session_id.clone(),
            role,
            intent: session.last_intent,
            operation: trace.operation,
            phase_after: session.gate_state(),
            error,
            message_hash: compute_message_hash(message),
            payload_hash: trace.executed.as_ref().map(compute_payload_hash),
            created_at: Utc::now(),
        };
        self.interaction_log.record(record).await;
    }
}

fn field_label(field: Field) -> &'static str {
    match field {
        Field::ClaimId => "claim ID",
        Field::PolicyId => "policy ID",
        Field::UserId => "user ID",
        other => other.as_str(),
    }
}

/// Tell the user which earlier identifiers were carried over, unless they
/// restated or replaced them in this message.
fn reuse_note(session: &Session, message: &str, prefilled: &[(Field, String)]) -> Option<String> {
    let upper = message.to_uppercase();
    let reused: Vec<String> = prefilled
        .iter()
        .filter(|(field, value)| session.resolved.get(*field) == Some(value.as_str()))
        .filter(|(_, value)| !upper.contains(&value.to_uppercase()))
        .map(|(field, value)| format!("{} {}", field_label(*field), value))
        .collect();

    if reused.is_empty() {
        None
    } else {
        Some(format!("Using your {} from earlier.", reused.join(" and ")))
    }
}
