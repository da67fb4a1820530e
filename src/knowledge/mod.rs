//! Knowledge store
//!
//! Read-only similarity search over insurance documents. The pgvector store
//! is used when a database is configured; otherwise an in-memory store ranks
//! documents by term overlap with the query.

pub mod embeddings;
pub mod pgvector;

pub use embeddings::EmbeddingClient;
pub use pgvector::PgVectorStore;

use crate::config::KnowledgeConfig;
use crate::error::OrchestrationError;
use crate::models::KnowledgeHit;
use crate::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Trait for knowledge retrieval
#[async_trait::async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Best `top_k` passages for `query`, highest score first.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeHit>>;
}

/// One entry of the knowledge base seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentMetadata {
    pub doc_id: Option<String>,
    pub policy_number: Option<String>,
    pub source_type: Option<String>,
}

impl KnowledgeDocument {
    pub fn new(source: &str, content: &str) -> Self {
        Self {
            content: content.to_string(),
            metadata: DocumentMetadata {
                doc_id: Some(source.to_string()),
                ..Default::default()
            },
        }
    }

    /// Title shown as the passage's source.
    pub fn source(&self) -> String {
        self.metadata
            .doc_id
            .clone()
            .or_else(|| self.metadata.policy_number.clone())
            .or_else(|| self.metadata.source_type.clone())
            .unwrap_or_else(|| "kb".to_string())
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "if", "in", "is", "it", "me", "my", "of", "on", "or", "the", "to", "what", "when",
    "which", "who", "why", "with", "you", "your",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

struct IndexedDocument {
    source: String,
    content: String,
    terms: HashSet<String>,
}

/// In-memory store for development and tests
pub struct InMemoryKnowledgeStore {
    documents: Vec<IndexedDocument>,
}

impl InMemoryKnowledgeStore {
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| IndexedDocument {
                    source: doc.source(),
                    terms: terms(&doc.content),
                    content: doc.content,
                })
                .collect(),
        }
    }

    /// Load the `[{content, metadata}]` seed file used for ingestion.
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let documents: Vec<KnowledgeDocument> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), documents = documents.len(), "Knowledge base loaded");
        Ok(Self::new(documents))
    }

    /// Small built-in FAQ so the service answers something out of the box.
    pub fn with_default_documents() -> Self {
        Self::new(vec![
            KnowledgeDocument::new(
                "gold-plan",
                "The Gold plan includes collision coverage up to $50,000, roadside assistance, and a $500 deductible per claim.",
            ),
            KnowledgeDocument::new(
                "silver-plan",
                "The Silver plan includes collision coverage up to $25,000 and a $1,000 deductible per claim. Roadside assistance is not included.",
            ),
            KnowledgeDocument::new(
                "claims-process",
                "To file a claim, provide your policy ID, the vehicle, and a description of the damage. Photos help us process the claim faster. Most claims are reviewed within 5 business days.",
            ),
            KnowledgeDocument::new(
                "cancellation-faq",
                "You can cancel your policy at any time. Unused premium is refunded pro rata within 14 days of cancellation.",
            ),
            KnowledgeDocument::new(
                "roadside-faq",
                "Roadside assistance covers towing up to 50 miles, jump starts, flat tire changes, and lockout service.",
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait::async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeHit>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<KnowledgeHit> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let overlap = query_terms.intersection(&doc.terms).count();
                (overlap > 0).then(|| KnowledgeHit {
                    content: doc.content.clone(),
                    source: doc.source.clone(),
                    score: overlap as f32 / query_terms.len() as f32,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Build the store selected by configuration.
pub async fn create_knowledge_store(config: &KnowledgeConfig) -> Result<Arc<dyn KnowledgeStore>> {
    if let Some(url) = &config.database_url {
        let api_key = config.embedding_api_key.clone().ok_or_else(|| {
            OrchestrationError::Config(
                "OPENAI_API_KEY is required when DB_URL selects the pgvector store".to_string(),
            )
        })?;
        let embeddings = EmbeddingClient::new(
            &config.embedding_base_url,
            api_key,
            &config.embedding_model,
        )?;
        info!("Knowledge store backend: pgvector");
        return Ok(Arc::new(PgVectorStore::connect_lazy(url, embeddings)?));
    }

    let store = match &config.seed_path {
        Some(path) => InMemoryKnowledgeStore::from_json_file(path).await?,
        None => InMemoryKnowledgeStore::with_default_documents(),
    };
    info!(documents = store.len(), "Knowledge store backend: in-memory");
    Ok(Arc::new(store))
}
