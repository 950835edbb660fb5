use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::config::PdfEngine;
use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and the active PDF engine.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let pdf_engine = match &state.config.export.pdf_engine {
        PdfEngine::Builtin => "builtin",
        PdfEngine::Wkhtmltopdf { .. } => "wkhtmltopdf",
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "proposal-api",
        "model": state.config.generation.params.model,
        "pdf_engine": pdf_engine
    }))
}
