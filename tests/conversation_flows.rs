//! End-to-end conversations through the orchestrator, backed by the in-memory
//! knowledge store and a backend that counts every call it receives.

use insurance_chat_orchestrator::composer::{NO_KNOWLEDGE_MESSAGE, UPSTREAM_APOLOGY};
use insurance_chat_orchestrator::confirmation::CANCELLED_MESSAGE;
use insurance_chat_orchestrator::error::ErrorCode;
use insurance_chat_orchestrator::knowledge::InMemoryKnowledgeStore;
use insurance_chat_orchestrator::state::SessionStore;
use insurance_chat_orchestrator::tools::{
    BackendError, BackendOperations, BackendResult, MockBackend,
};
use insurance_chat_orchestrator::{
    ChatTurnRequest, ClaimSubmission, Field, GateState, OperationOutcome, Orchestrator,
    PremiumRequest, ResponseEnvelope,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delegates to the mock provider, or fails every call when `down`.
struct RecordingBackend {
    inner: MockBackend,
    calls: AtomicUsize,
    down: bool,
}

impl RecordingBackend {
    fn new() -> Self {
        Self {
            inner: MockBackend::new(),
            calls: AtomicUsize::new(0),
            down: false,
        }
    }

    fn unavailable() -> Self {
        Self {
            down: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> BackendResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            Err(BackendError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl BackendOperations for RecordingBackend {
    async fn policy_lookup(&self, user_id: &str) -> BackendResult<OperationOutcome> {
        self.enter()?;
        self.inner.policy_lookup(user_id).await
    }

    async fn claim_status(&self, claim_id: &str) -> BackendResult<OperationOutcome> {
        self.enter()?;
        self.inner.claim_status(claim_id).await
    }

    async fn submit_claim(&self, claim: &ClaimSubmission) -> BackendResult<OperationOutcome> {
        self.enter()?;
        self.inner.submit_claim(claim).await
    }

    async fn calculate_premium(
        &self,
        request: &PremiumRequest,
    ) -> BackendResult<OperationOutcome> {
        self.enter()?;
        self.inner.calculate_premium(request).await
    }
}

/// Mock provider whose claim status lookup takes a while to answer.
struct SlowBackend {
    inner: MockBackend,
    completed: AtomicUsize,
}

impl SlowBackend {
    fn new() -> Self {
        Self {
            inner: MockBackend::new(),
            completed: AtomicUsize::new(0),
        }
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BackendOperations for SlowBackend {
    async fn policy_lookup(&self, user_id: &str) -> BackendResult<OperationOutcome> {
        self.inner.policy_lookup(user_id).await
    }

    async fn claim_status(&self, claim_id: &str) -> BackendResult<OperationOutcome> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let outcome = self.inner.claim_status(claim_id).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn submit_claim(&self, claim: &ClaimSubmission) -> BackendResult<OperationOutcome> {
        self.inner.submit_claim(claim).await
    }

    async fn calculate_premium(
        &self,
        request: &PremiumRequest,
    ) -> BackendResult<OperationOutcome> {
        self.inner.calculate_premium(request).await
    }
}

fn setup(backend: Arc<RecordingBackend>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(SessionStore::new()),
        Arc::new(InMemoryKnowledgeStore::with_default_documents()),
        backend,
        5,
    )
}

async fn say(orchestrator: &Orchestrator, session_id: &str, message: &str) -> ResponseEnvelope {
    orchestrator
        .handle_turn(ChatTurnRequest {
            message: message.to_string(),
            session_id: Some(session_id.to_string()),
            user_role: Some("user".to_string()),
        })
        .await
}

fn phase(envelope: &ResponseEnvelope) -> GateState {
    envelope.state.as_ref().expect("state snapshot").phase
}

fn error(envelope: &ResponseEnvelope) -> Option<ErrorCode> {
    envelope.state.as_ref().and_then(|state| state.error)
}

/// Actions are present exactly when a confirmation is pending.
fn assert_actions_match_pending(envelope: &ResponseEnvelope) {
    let has_actions = envelope
        .actions
        .as_ref()
        .map(|actions| !actions.is_empty())
        .unwrap_or(false);
    assert_eq!(has_actions, envelope.pending_confirmation(), "{:?}", envelope);
}

#[tokio::test]
async fn claim_status_is_confirmed_then_executed() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let proposed = say(&orchestrator, "s-1", "Check claim status 98765").await;
    assert!(proposed.pending_confirmation());
    assert_eq!(phase(&proposed), GateState::AwaitingConfirmation);
    let actions = proposed.actions.as_ref().expect("confirm action");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].payload["arguments"]["claim_id"], "98765");
    assert_eq!(backend.calls(), 0);

    let done = say(&orchestrator, "s-1", "yes").await;
    assert!(done.card("claim_status").is_some());
    assert!(!done.pending_confirmation());
    assert!(done.actions.is_none());
    assert_eq!(phase(&done), GateState::Idle);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn lowered_coverage_is_rejected_before_confirmation() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let envelope = say(
        &orchestrator,
        "s-1",
        "Calculate premium from 50000 to 30000",
    )
    .await;

    assert_eq!(error(&envelope), Some(ErrorCode::BusinessRuleViolation));
    assert!(envelope.text().contains("must be greater than current coverage"));
    assert_eq!(phase(&envelope), GateState::Collecting);
    assert!(!envelope.pending_confirmation());
    assert_eq!(
        envelope.state.as_ref().and_then(|s| s.awaiting),
        Some(Field::NewCoverage)
    );

    let envelope = say(&orchestrator, "s-1", "80000").await;
    assert_eq!(phase(&envelope), GateState::Collecting);
    assert_eq!(
        envelope.state.as_ref().and_then(|s| s.awaiting),
        Some(Field::PolicyId)
    );

    let envelope = say(&orchestrator, "s-1", "POL-1001").await;
    assert!(envelope.pending_confirmation());
    let done = say(&orchestrator, "s-1", "confirm").await;
    let card = done.card("premium_calculation").expect("premium card");
    assert_eq!(card["new_premium"], 960.0);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn deductible_question_answers_from_knowledge_base() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let envelope = say(
        &orchestrator,
        "s-1",
        "What is the deductible for the Gold plan?",
    )
    .await;

    let card = envelope.card("knowledge_base").expect("knowledge card");
    assert!(!card["results"].as_array().unwrap().is_empty());
    assert_eq!(card["sources"][0], "gold-plan");
    assert!(envelope.text().contains("$500 deductible"));
    assert!(envelope.actions.is_none());
    assert!(!envelope.pending_confirmation());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn denial_never_reaches_the_backend() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    say(&orchestrator, "s-1", "Check claim status 98765").await;
    let envelope = say(&orchestrator, "s-1", "no").await;

    assert_eq!(envelope.messages[0].text, CANCELLED_MESSAGE);
    assert_eq!(phase(&envelope), GateState::Idle);
    assert!(envelope.actions.is_none());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn invalid_claim_id_does_not_advance() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let envelope = say(&orchestrator, "s-1", "Check claim status 98765-XYZ").await;
    assert_eq!(error(&envelope), Some(ErrorCode::ValidationError));
    assert_eq!(phase(&envelope), GateState::Collecting);
    assert!(!envelope.pending_confirmation());

    let envelope = say(&orchestrator, "s-1", "98765").await;
    assert!(envelope.pending_confirmation());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn empty_knowledge_base_reports_nothing_found() {
    let orchestrator = Orchestrator::new(
        Arc::new(SessionStore::new()),
        Arc::new(InMemoryKnowledgeStore::new(Vec::new())),
        Arc::new(RecordingBackend::new()),
        5,
    );

    let envelope = say(&orchestrator, "s-1", "What does roadside assistance cover?").await;

    let card = envelope.card("knowledge_base").expect("knowledge card");
    assert!(card["results"].as_array().unwrap().is_empty());
    assert!(envelope.text().contains(NO_KNOWLEDGE_MESSAGE));
}

#[tokio::test]
async fn upstream_failure_apologizes_and_returns_to_idle() {
    let backend = Arc::new(RecordingBackend::unavailable());
    let orchestrator = setup(backend.clone());

    say(&orchestrator, "s-1", "Check claim status 98765").await;
    let envelope = say(&orchestrator, "s-1", "yes").await;

    assert_eq!(envelope.messages[0].text, UPSTREAM_APOLOGY);
    assert_eq!(error(&envelope), Some(ErrorCode::UpstreamError));
    assert_eq!(phase(&envelope), GateState::Idle);
    assert!(envelope.cards.is_none());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn claim_submission_collects_across_turns() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let script = [
        "I want to file a claim for policy POL-1001",
        "2021 Honda Civic",
        "Rear bumper dented in a parking lot collision",
    ];
    let mut last = None;
    for message in script {
        let envelope = say(&orchestrator, "s-1", message).await;
        assert_actions_match_pending(&envelope);
        last = Some(envelope);
    }

    let proposed = last.expect("envelope");
    assert!(proposed.pending_confirmation(), "{:?}", proposed);
    assert!(proposed.text().contains("POL-1001"));

    let done = say(&orchestrator, "s-1", "y").await;
    assert_actions_match_pending(&done);
    assert!(done.card("claim_submitted").is_some());
    assert_eq!(backend.calls(), 1);

    // The new claim id is remembered for a follow-up status check
    let follow_up = say(&orchestrator, "s-1", "what's the status of my claim?").await;
    assert!(follow_up.pending_confirmation());
    let actions = follow_up.actions.as_ref().expect("confirm action");
    assert_eq!(actions[0].payload["arguments"]["claim_id"], "10000");
}

#[tokio::test]
async fn sessions_progress_independently_under_concurrency() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = Arc::new(setup(backend.clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let session_id = format!("s-{}", i);
            let proposed = say(&orchestrator, &session_id, "Check claim status 12345").await;
            assert!(proposed.pending_confirmation());
            let reply = if i % 2 == 0 { "yes" } else { "no" };
            say(&orchestrator, &session_id, reply).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let envelope = handle.await.unwrap();
        assert_eq!(phase(&envelope), GateState::Idle);
        assert_eq!(envelope.card("claim_status").is_some(), i % 2 == 0);
    }

    assert_eq!(backend.calls(), 4);
    assert_eq!(orchestrator.sessions().len().await, 8);
}

#[tokio::test]
async fn abandoned_confirmation_still_completes() {
    let backend = Arc::new(SlowBackend::new());
    let orchestrator = Orchestrator::new(
        Arc::new(SessionStore::new()),
        Arc::new(InMemoryKnowledgeStore::with_default_documents()),
        backend.clone(),
        5,
    );

    let proposed = say(&orchestrator, "s-1", "Check claim status 98765").await;
    assert!(proposed.pending_confirmation());

    // The caller gives up before the backend answers
    let gave_up =
        tokio::time::timeout(Duration::from_millis(50), say(&orchestrator, "s-1", "yes")).await;
    assert!(gave_up.is_err());

    // Waits for the confirmed call to finish, then is handled on its own
    let next = say(
        &orchestrator,
        "s-1",
        "What is the deductible for the Gold plan?",
    )
    .await;
    assert_eq!(backend.completed(), 1);
    assert_ne!(next.messages[0].text, CANCELLED_MESSAGE);
    assert!(next.card("knowledge_base").is_some(), "{:?}", next);
    assert_eq!(phase(&next), GateState::Idle);

    let session = orchestrator.sessions().snapshot("s-1").await.unwrap();
    assert_eq!(session.resolved.claim_id.as_deref(), Some("98765"));
}

#[tokio::test]
async fn question_mid_collection_keeps_the_collection() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let envelope = say(&orchestrator, "s-1", "Calculate premium from 50000 to 80000").await;
    assert_eq!(
        envelope.state.as_ref().and_then(|s| s.awaiting),
        Some(Field::PolicyId)
    );

    let envelope = say(
        &orchestrator,
        "s-1",
        "What is the deductible for the Gold plan?",
    )
    .await;
    assert!(envelope.card("knowledge_base").is_some(), "{:?}", envelope);
    assert!(envelope.text().contains("policy ID"));
    assert!(!envelope.pending_confirmation());
    assert_eq!(error(&envelope), None);
    assert_eq!(phase(&envelope), GateState::Collecting);
    assert_eq!(
        envelope.state.as_ref().and_then(|s| s.awaiting),
        Some(Field::PolicyId)
    );

    let envelope = say(&orchestrator, "s-1", "it's POL-1001").await;
    assert!(envelope.pending_confirmation());
    let done = say(&orchestrator, "s-1", "yes").await;
    let card = done.card("premium_calculation").expect("premium card");
    assert_eq!(card["new_premium"], 960.0);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn awaited_user_id_is_read_from_a_sentence() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    let envelope = say(&orchestrator, "s-1", "Show me my policy details").await;
    assert_eq!(
        envelope.state.as_ref().and_then(|s| s.awaiting),
        Some(Field::UserId)
    );

    // Read-only lookup: runs straight away with the id from the sentence
    let envelope = say(&orchestrator, "s-1", "my user id is 001").await;
    assert_eq!(backend.calls(), 1);
    assert_eq!(error(&envelope), Some(ErrorCode::NotFound));
    assert!(envelope.text().contains("user 001"), "{:?}", envelope);
    assert_eq!(phase(&envelope), GateState::Idle);
}

#[tokio::test]
async fn stop_inside_a_damage_description_is_not_a_cancel() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = setup(backend.clone());

    say(&orchestrator, "s-1", "I want to file a claim for policy POL-1001").await;
    say(&orchestrator, "s-1", "2021 Honda Civic").await;
    let envelope = say(
        &orchestrator,
        "s-1",
        "Stop sign fell onto the hood and cracked it",
    )
    .await;

    assert_ne!(envelope.messages[0].text, CANCELLED_MESSAGE);
    assert!(envelope.pending_confirmation(), "{:?}", envelope);
    assert!(envelope.text().contains("Stop sign fell onto the hood"));
}
