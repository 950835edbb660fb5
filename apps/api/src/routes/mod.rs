pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::drafts::handlers as drafts;
use crate::export::handlers as export;
use crate::generation::handlers as generation;
use crate::session::handlers as sessions;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Input validation
        .route(
            "/api/v1/proposals/validate",
            post(generation::handle_validate),
        )
        // Sessions
        .route("/api/v1/sessions", post(sessions::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(sessions::handle_get_session).delete(sessions::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/sections/:section",
            put(sessions::handle_edit_section),
        )
        .route(
            "/api/v1/sessions/:id/sections/:section/regenerate",
            post(sessions::handle_regenerate_section),
        )
        .route(
            "/api/v1/sessions/:id/quality",
            get(sessions::handle_get_quality),
        )
        .route(
            "/api/v1/sessions/:id/quality/audit",
            post(sessions::handle_audit_quality),
        )
        .route(
            "/api/v1/sessions/:id/email",
            post(generation::handle_compose_email),
        )
        .route(
            "/api/v1/sessions/:id/drafts",
            post(sessions::handle_save_draft),
        )
        // Export
        .route(
            "/api/v1/sessions/:id/export/clipboard",
            get(export::handle_clipboard),
        )
        .route(
            "/api/v1/sessions/:id/export/:format",
            get(export::handle_export),
        )
        // Drafts
        .route("/api/v1/drafts", get(drafts::handle_list_drafts))
        .route("/api/v1/drafts/:id", get(drafts::handle_get_draft))
        .route(
            "/api/v1/drafts/:id/versions",
            get(drafts::handle_list_versions),
        )
        .route(
            "/api/v1/drafts/:id/versions/:version",
            get(drafts::handle_get_version),
        )
        .route("/api/v1/drafts/:id/open", post(drafts::handle_open_draft))
        .with_state(state)
}
