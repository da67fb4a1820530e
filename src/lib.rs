//! Insurance Chat Orchestrator
//!
//! The conversational core of an insurance customer-service chatbot:
//! - Routes each message to a knowledge-base search, a backend operation or small talk
//! - Collects and validates operation arguments across turns
//! - Gates every side-effecting call behind an explicit yes/no confirmation
//! - Renders results as chat messages plus typed UI cards
//! - Keeps per-session state with per-session serialization
//!
//! TURN LOOP:
//! MESSAGE → DISPATCH → COLLECT → CONFIRM → EXECUTE → ENVELOPE

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod composer;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod knowledge;
pub mod models;
pub mod slots;
pub mod state;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use classifier::{Dispatch, IntentClassifier, Route};
pub use config::AppConfig;
