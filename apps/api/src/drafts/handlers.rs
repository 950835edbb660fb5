//! Axum route handlers for stored drafts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::draft::{DraftSnapshot, DraftSummary, DraftVersion};
use crate::session::handlers::SessionView;
use crate::session::Session;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DraftListResponse {
    pub drafts: Vec<DraftSummary>,
}

#[derive(Debug, Serialize)]
pub struct DraftVersionsResponse {
    pub draft_id: Uuid,
    pub versions: Vec<DraftVersion>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenDraftRequest {
    /// Version to open; the latest when absent.
    #[serde(default)]
    pub version: Option<u32>,
}

/// GET /api/v1/drafts
pub async fn handle_list_drafts(
    State(state): State<AppState>,
) -> Result<Json<DraftListResponse>, AppError> {
    let drafts = state.drafts.list_drafts().await?;
    Ok(Json(DraftListResponse { drafts }))
}

/// GET /api/v1/drafts/:id
///
/// Latest version of a draft.
pub async fn handle_get_draft(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<DraftSnapshot>, AppError> {
    Ok(Json(state.drafts.load(draft_id).await?))
}

/// GET /api/v1/drafts/:id/versions
pub async fn handle_list_versions(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<DraftVersionsResponse>, AppError> {
    let versions = state.drafts.list_versions(draft_id).await?;
    Ok(Json(DraftVersionsResponse { draft_id, versions }))
}

/// GET /api/v1/drafts/:id/versions/:version
pub async fn handle_get_version(
    State(state): State<AppState>,
    Path((draft_id, version)): Path<(Uuid, u32)>,
) -> Result<Json<DraftSnapshot>, AppError> {
    Ok(Json(state.drafts.load_version(draft_id, version).await?))
}

/// POST /api/v1/drafts/:id/open
///
/// Opens a stored version in a new editing session. Later saves from that session
/// append to the same draft.
pub async fn handle_open_draft(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
    request: Option<Json<OpenDraftRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let snapshot = match request.version {
        Some(version) => state.drafts.load_version(draft_id, version).await?,
        None => state.drafts.load(draft_id).await?,
    };

    let session = Session::resume(
        snapshot.request,
        snapshot.privacy_mode,
        snapshot.insights,
        snapshot.proposal,
        snapshot.draft_id,
    );
    let view = SessionView::of(&session, &state.config.quality);
    state.sessions.insert(session).await;
    Ok((StatusCode::CREATED, Json(view)))
}
