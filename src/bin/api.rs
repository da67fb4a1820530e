use insurance_chat_orchestrator::{agent::Orchestrator, api::start_server, config::AppConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("Insurance Chat Orchestrator - API Server");
    info!(
        port = config.port,
        backend = %config.backend.base_url,
        backend_mode = ?config.backend.mode,
        "Configuration loaded"
    );

    let orchestrator = Arc::new(Orchestrator::from_config(&config).await?);

    if let Some(ttl) = config.session_idle_ttl {
        let sessions = orchestrator.sessions().clone();
        let every = (ttl / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                sessions.evict_idle(ttl).await;
            }
        });
        info!(ttl_secs = ttl.as_secs(), "Idle session eviction enabled");
    }

    info!("Orchestrator initialized, starting API server");

    start_server(orchestrator, config.port).await?;

    Ok(())
}
