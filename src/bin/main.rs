use insurance_chat_orchestrator::{
    agent::Orchestrator, knowledge::InMemoryKnowledgeStore, models::ChatTurnRequest,
    state::SessionStore, tools::MockBackend,
};
use std::sync::Arc;
use tracing::info;

/// A short scripted conversation covering each route.
const SCRIPT: &[&str] = &[
    "What is the deductible for the Gold plan?",
    "Check claim status 98765",
    "yes",
    "Calculate premium from 50000 to 30000",
    "80000",
    "POL-1001",
    "no",
    "I want to file a claim",
    "POL-1002",
    "2021 Honda Civic",
    "Rear bumper dented in a parking lot",
    "yes",
    "show my policy details for USER-001",
    "hello there",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Insurance Chat Orchestrator demo starting");

    let orchestrator = Orchestrator::new(
        Arc::new(SessionStore::new()),
        Arc::new(InMemoryKnowledgeStore::with_default_documents()),
        Arc::new(MockBackend::new()),
        5,
    );

    let session_id = "demo-session".to_string();

    for message in SCRIPT {
        println!("\n>>> {}", message);
        let envelope = orchestrator
            .handle_turn(ChatTurnRequest {
                message: message.to_string(),
                session_id: Some(session_id.clone()),
                user_role: Some("user".to_string()),
            })
            .await;
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }

    let records = orchestrator
        .interaction_log()
        .list_for_session(&session_id)
        .await;
    println!("\n=== INTERACTION LOG ===");
    for (i, record) in records.iter().enumerate() {
        println!(
            "  {}: intent={:?} operation={:?} phase={:?} error={:?}",
            i + 1,
            record.intent,
            record.operation,
            record.phase_after,
            record.error
        );
    }

    Ok(())
}
