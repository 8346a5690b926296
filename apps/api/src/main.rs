mod analysis;
mod billing;
mod clock;
mod config;
mod db;
mod errors;
mod generation;
mod llm_client;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::store::{AnalysisStore, InMemoryAnalysisStore, PgAnalysisStore};
use crate::billing::ledger::{CreditLedger, InMemoryCreditLedger, PgCreditLedger};
use crate::billing::registry::ModelRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::create_pool;
use crate::generation::cache_manager::ContentCacheManager;
use crate::generation::generator::GeneratorSet;
use crate::generation::store::{ArtifactStore, InMemoryArtifactStore, PgArtifactStore};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Artifact API v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Storage: PostgreSQL when configured, process memory otherwise
    let (analyses, artifacts, ledger): (
        Arc<dyn AnalysisStore>,
        Arc<dyn ArtifactStore>,
        Arc<dyn CreditLedger>,
    ) = match &config.database_url {
        Some(url) => {
            let db = create_pool(url).await?;
            (
                Arc::new(PgAnalysisStore::new(db.clone())),
                Arc::new(PgArtifactStore::new(db.clone())),
                Arc::new(PgCreditLedger::new(db, clock.clone())),
            )
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory stores (data is lost on restart)");
            (
                Arc::new(InMemoryAnalysisStore::new()),
                Arc::new(InMemoryArtifactStore::new()),
                Arc::new(InMemoryCreditLedger::new(
                    clock.clone(),
                    config.signup_bonus_credits,
                )),
            )
        }
    };

    // Initialize LLM client and the generators that share it
    let llm = Arc::new(LlmClient::new(
        config.anthropic_api_key.clone(),
        config.openai_api_key.clone(),
    )?);
    let generators = GeneratorSet::standard(llm);

    let registry = Arc::new(ModelRegistry::standard());
    if !registry.exists(config.default_model.as_str()) {
        anyhow::bail!("DEFAULT_MODEL {} is not in the model registry", config.default_model);
    }
    info!("Model registry loaded ({} models)", registry.all().len());

    let cache = ContentCacheManager::new(
        analyses.clone(),
        artifacts,
        ledger.clone(),
        registry.clone(),
        generators,
        clock,
        config.cache_settings(),
    );

    // Build app state
    let state = AppState {
        cache,
        analyses,
        ledger,
        registry,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
