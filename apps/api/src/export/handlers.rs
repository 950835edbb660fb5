//! Axum route handlers for exports.

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::export::{ClipboardPayload, ExportFormat};
use crate::state::AppState;

const REVISION_HEADER: HeaderName = HeaderName::from_static("x-proposal-revision");

/// GET /api/v1/sessions/:id/export/:format
///
/// Renders the session's proposal as it is right now; later edits never change a
/// returned file. The body is the file itself.
pub async fn handle_export(
    State(state): State<AppState>,
    Path((session_id, format)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let format: ExportFormat = format.parse().map_err(AppError::Validation)?;
    let (proposal, logo, owner) = state
        .sessions
        .read(session_id, |s| {
            (s.proposal.clone(), s.request.logo.clone(), s.draft_id.unwrap_or(s.id))
        })
        .await?;

    let artifact = state.exporter.export(&proposal, logo.as_ref(), format).await?;
    info!(
        "Session {session_id}: exported {} as {}",
        artifact.format, artifact.file_name
    );
    // The download does not depend on the archived copy.
    if let Err(e) = state.exports.save(owner, &artifact).await {
        warn!("Session {session_id}: could not archive {}: {e}", artifact.file_name);
    }

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.file_name
    ))
    .map_err(|e| AppError::Internal(e.into()))?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(artifact.mime_type)),
        (header::CONTENT_DISPOSITION, disposition),
        (REVISION_HEADER, HeaderValue::from(artifact.source_revision)),
    ];
    Ok((StatusCode::OK, headers, artifact.bytes).into_response())
}

/// GET /api/v1/sessions/:id/export/clipboard
///
/// The HTML rendition as JSON, for pasting into an online document editor.
pub async fn handle_clipboard(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ClipboardPayload>, AppError> {
    let (proposal, logo) = state
        .sessions
        .read(session_id, |s| (s.proposal.clone(), s.request.logo.clone()))
        .await?;
    let payload = state.exporter.clipboard(&proposal, logo.as_ref()).await?;
    Ok(Json(payload))
}
