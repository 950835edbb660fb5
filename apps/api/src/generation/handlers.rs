//! Axum route handlers for the Generation API.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::email::{compose_email, EmailDraft};
use crate::generation::validation::{validate_request, ValidationReport};
use crate::models::proposal::ProposalRequest;
use crate::state::AppState;

/// POST /api/v1/proposals/validate
///
/// Reports every field error without generating anything. Always 200: the report's
/// `valid` flag is what a form gates its generate button on.
pub async fn handle_validate(Json(request): Json<ProposalRequest>) -> Json<ValidationReport> {
    Json(validate_request(&request))
}

/// POST /api/v1/sessions/:id/email
///
/// Drafts the covering email for the session's current proposal.
pub async fn handle_compose_email(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<EmailDraft>, AppError> {
    let (request, proposal) = state
        .sessions
        .read(session_id, |s| (s.request.clone(), s.proposal.clone()))
        .await?;
    let email = compose_email(&state.generator, &request, &proposal).await?;
    Ok(Json(email))
}
