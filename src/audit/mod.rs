//! Interaction log
//!
//! One record per chat turn: where it was routed, which operation ran and
//! which error code (if any) was surfaced. Message text is stored only as a
//! hash.

use crate::error::ErrorCode;
use crate::models::{GateState, Intent, OperationKind, OperationRequest, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub record_id: Uuid,
    pub session_id: String,
    pub role: UserRole,
    pub intent: Option<Intent>,
    pub operation: Option<OperationKind>,
    pub phase_after: GateState,
    pub error: Option<ErrorCode>,
    pub message_hash: String,
    /// Hash of the request sent to the backend, when one was sent.
    pub payload_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Interaction log storage; clones share the same records
#[derive(Clone)]
pub struct InteractionLog {
    records: Arc<RwLock<HashMap<Uuid, TurnRecord>>>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, record: TurnRecord) -> Uuid {
        let record_id = record.record_id;
        let mut records = self.records.write().await;
        records.insert(record_id, record);
        record_id
    }

    pub async fn get(&self, record_id: Uuid) -> Option<TurnRecord> {
        let records = self.records.read().await;
        records.get(&record_id).cloned()
    }

    /// Records for a session, oldest first
    pub async fn list_for_session(&self, session_id: &str) -> Vec<TurnRecord> {
        let records = self.records.read().await;

        let mut items: Vec<TurnRecord> = records
            .values()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| record.created_at);
        items
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new()
    }
}

pub fn compute_message_hash(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// SHA256 of the request as JSON, streamed straight into the hasher
pub fn compute_payload_hash(request: &OperationRequest) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), request).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
