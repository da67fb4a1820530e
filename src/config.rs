//! Runtime configuration
//!
//! Everything is read from the environment (after `.env` is loaded by the
//! binaries). Every key has a default so a bare `cargo run` works against a
//! local backend.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
const DEFAULT_SERVICE_EMAIL: &str = "admin@insurance.com";
const DEFAULT_SERVICE_PASSWORD: &str = "admin123";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Http,
    Mock,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub mode: BackendMode,
    pub base_url: String,
    pub service_email: String,
    pub service_password: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// pgvector database; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub seed_path: Option<PathBuf>,
    pub top_k: usize,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub backend: BackendConfig,
    pub knowledge: KnowledgeConfig,
    pub session_idle_ttl: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = parse_var("ORCH_PORT")?
            .or(parse_var("PORT")?)
            .unwrap_or(DEFAULT_PORT);

        let mode = match env::var("BACKEND_MODE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "" | "http" => BackendMode::Http,
            "mock" => BackendMode::Mock,
            other => {
                return Err(OrchestrationError::Config(format!(
                    "BACKEND_MODE must be 'http' or 'mock', got '{}'",
                    other
                )))
            }
        };

        let backend = BackendConfig {
            mode,
            base_url: env::var("BACKEND_API_URL")
                .or_else(|_| env::var("NEST_API_URL"))
                .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            service_email: env::var("ORCH_SERVICE_EMAIL")
                .unwrap_or_else(|_| DEFAULT_SERVICE_EMAIL.to_string()),
            service_password: env::var("ORCH_SERVICE_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_SERVICE_PASSWORD.to_string()),
            timeout: Duration::from_secs(
                parse_var("BACKEND_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        };

        let top_k: usize = parse_var("KNOWLEDGE_TOP_K")?.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(OrchestrationError::Config(
                "KNOWLEDGE_TOP_K must be at least 1".to_string(),
            ));
        }

        let knowledge = KnowledgeConfig {
            database_url: non_empty_var("DB_URL"),
            seed_path: non_empty_var("KNOWLEDGE_BASE_PATH").map(PathBuf::from),
            top_k,
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            embedding_api_key: non_empty_var("OPENAI_API_KEY"),
        };

        let session_idle_ttl = parse_var::<u64>("SESSION_IDLE_TTL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            port,
            backend,
            knowledge,
            session_idle_ttl,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match non_empty_var(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            OrchestrationError::Config(format!("{} has an invalid value: '{}'", key, raw))
        }),
    }
}
