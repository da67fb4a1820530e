//! pgvector-backed knowledge store
//!
//! Reads the `documents` table populated by the ingestion job:
//! `(id, source, title, content, embedding vector, metadata jsonb)`.

use super::embeddings::{to_vector_literal, EmbeddingClient};
use super::KnowledgeStore;
use crate::error::OrchestrationError;
use crate::models::KnowledgeHit;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

const SEARCH_SQL: &str = r#"
    SELECT COALESCE(title, id::text) AS source,
           content,
           (embedding <-> $1::vector)::float8 AS distance
    FROM documents
    ORDER BY embedding <-> $1::vector
    LIMIT $2
"#;

pub struct PgVectorStore {
    pool: PgPool,
    embeddings: EmbeddingClient,
}

impl PgVectorStore {
    /// Pool connects on first query, so startup does not wait on the database.
    pub fn connect_lazy(database_url: &str, embeddings: EmbeddingClient) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| {
                OrchestrationError::Database(format!("invalid knowledge database URL: {}", e))
            })?;

        Ok(Self { pool, embeddings })
    }
}

/// Map an L2 distance onto (0, 1], higher is closer.
fn distance_to_score(distance: f64) -> f32 {
    (1.0 / (1.0 + distance.max(0.0))) as f32
}

#[async_trait::async_trait]
impl KnowledgeStore for PgVectorStore {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeHit>> {
        let embedding = self.embeddings.embed(query).await?;
        let literal = to_vector_literal(&embedding);

        let rows = sqlx::query(SEARCH_SQL)
            .bind(literal)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrchestrationError::Knowledge(format!("vector search failed: {}", e)))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let distance: f64 = row.try_get("distance")?;
            hits.push(KnowledgeHit {
                source: row.try_get("source")?,
                content: row.try_get("content")?,
                score: distance_to_score(distance),
            });
        }

        debug!(results = hits.len(), "Vector search complete");
        Ok(hits)
    }
}
