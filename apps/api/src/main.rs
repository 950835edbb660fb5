mod config;
mod drafts;
mod errors;
mod export;
mod generation;
mod llm_client;
mod models;
mod quality;
mod routes;
mod session;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, PdfEngine};
use crate::drafts::FsDraftStore;
use crate::generation::generator::SectionGenerator;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or invalid env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Proposal API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.expose().to_string(),
        config.llm_api_url.clone(),
        config.llm_timeout,
    )?;
    let generator = SectionGenerator::new(Arc::new(llm), &config.generation);
    info!(
        "LLM client initialized (model: {}, mode: {:?}, concurrency: {})",
        config.generation.params.model, config.generation.mode, config.generation.concurrency
    );

    // Initialize draft store
    let drafts = FsDraftStore::open(&config.drafts_dir).await?;

    match &config.export.pdf_engine {
        PdfEngine::Builtin => info!("PDF engine: builtin"),
        PdfEngine::Wkhtmltopdf { binary } => info!(
            "PDF engine: wkhtmltopdf at {} (fallback: {})",
            binary.display(),
            config.export.pdf_fallback
        ),
    }

    let port = config.port;
    let state = AppState::new(config, generator, Arc::new(drafts));

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // single local user; no cross-origin restrictions

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
