//! Axum route handlers for editing sessions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::QualityConfig;
use crate::errors::AppError;
use crate::generation::insights::TranscriptInsights;
use crate::generation::validation::validate_request;
use crate::models::draft::DraftSnapshot;
use crate::models::proposal::{Proposal, ProposalRequest, Section, SectionKind};
use crate::quality::audit::{audit_proposal, QualityAudit};
use crate::quality::{score, QualityReport};
use crate::session::pipeline::{regenerate_section, start_session, GenerationReport};
use crate::session::Session;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// A session as the client sees it, with a freshly computed quality report.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub privacy_mode: bool,
    pub draft_id: Option<Uuid>,
    pub notices: Vec<String>,
    pub insights: Option<TranscriptInsights>,
    pub in_flight: Vec<SectionKind>,
    pub proposal: Proposal,
    pub quality: QualityReport,
}

impl SessionView {
    pub fn of(session: &Session, quality: &QualityConfig) -> Self {
        Self {
            session_id: session.id,
            created_at: session.created_at,
            privacy_mode: session.privacy_mode,
            draft_id: session.draft_id,
            notices: session.notices.clone(),
            insights: session.insights.clone(),
            in_flight: session.in_flight_sections(),
            proposal: session.proposal.clone(),
            quality: score(&session.proposal, quality),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session: SessionView,
    pub generation: GenerationReport,
}

#[derive(Debug, Deserialize)]
pub struct EditSectionRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SectionResponse {
    pub section: Section,
    pub revision: u64,
    pub quality: QualityReport,
}

#[derive(Debug, Serialize)]
pub struct QualityAuditResponse {
    pub heuristic: QualityReport,
    pub audit: QualityAudit,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveDraftRequest {
    /// Turns privacy mode on for this save. A private session always saves privately.
    #[serde(default)]
    pub privacy_mode: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SaveDraftResponse {
    pub draft_id: Uuid,
    pub version: u32,
    pub privacy_mode: bool,
}

/// Accepts a section key (`scope_of_work`) or its 1-based position (`5`).
pub fn parse_section(raw: &str) -> Result<SectionKind, AppError> {
    if let Ok(position) = raw.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|i| SectionKind::ALL.get(i).copied())
            .ok_or_else(|| AppError::Validation(format!("section position {raw} is out of range (1-12)")));
    }
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| AppError::Validation(format!("unknown section '{raw}'")))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
///
/// Validates the request, opens a session and generates all twelve sections.
/// Sections that fail stay pending and are listed under `generation.failed`.
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(request): Json<ProposalRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let report = validate_request(&request);
    if !report.valid {
        return Err(AppError::InvalidRequest(report.errors));
    }

    let (id, generation) =
        start_session(&state.generator, &state.sessions, &state.config, request).await?;
    let session = state
        .sessions
        .read(id, |s| SessionView::of(s, &state.config.quality))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session,
            generation,
        }),
    ))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .sessions
        .read(session_id, |s| SessionView::of(s, &state.config.quality))
        .await?;
    Ok(Json(view))
}

/// DELETE /api/v1/sessions/:id
///
/// Closes the session. Generation results still in flight for it are dropped.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/sessions/:id/sections/:section
///
/// Replaces one section's body with user text. An empty body returns the section to pending.
pub async fn handle_edit_section(
    State(state): State<AppState>,
    Path((session_id, section)): Path<(Uuid, String)>,
    Json(request): Json<EditSectionRequest>,
) -> Result<Json<SectionResponse>, AppError> {
    let kind = parse_section(&section)?;
    state.sessions.edit(session_id, kind, request.body).await?;
    section_response(&state, session_id, kind).await
}

/// POST /api/v1/sessions/:id/sections/:section/regenerate
///
/// 409 when the section is already being generated.
pub async fn handle_regenerate_section(
    State(state): State<AppState>,
    Path((session_id, section)): Path<(Uuid, String)>,
) -> Result<Json<SectionResponse>, AppError> {
    let kind = parse_section(&section)?;
    regenerate_section(
        &state.generator,
        &state.sessions,
        &state.config,
        session_id,
        kind,
    )
    .await?;
    section_response(&state, session_id, kind).await
}

/// GET /api/v1/sessions/:id/quality
pub async fn handle_get_quality(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<QualityReport>, AppError> {
    let report = state
        .sessions
        .read(session_id, |s| score(&s.proposal, &state.config.quality))
        .await?;
    Ok(Json(report))
}

/// POST /api/v1/sessions/:id/quality/audit
///
/// Runs the model review next to the deterministic report. The transcript stays out of
/// the prompt for private sessions.
pub async fn handle_audit_quality(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<QualityAuditResponse>, AppError> {
    let (request, proposal, privacy_mode) = state
        .sessions
        .read(session_id, |s| (s.request.clone(), s.proposal.clone(), s.privacy_mode))
        .await?;
    let heuristic = score(&proposal, &state.config.quality);
    let audit = audit_proposal(&state.generator, &request, &proposal, privacy_mode).await?;
    info!(
        "Session {session_id}: audit graded revision {} at {} (heuristic {})",
        audit.revision, audit.grade, heuristic.grade
    );
    Ok(Json(QualityAuditResponse { heuristic, audit }))
}

/// POST /api/v1/sessions/:id/drafts
///
/// Appends a version to the session's draft, starting a new draft on first save.
/// A failed save leaves the session untouched.
pub async fn handle_save_draft(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    request: Option<Json<SaveDraftRequest>>,
) -> Result<(StatusCode, Json<SaveDraftResponse>), AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let (draft_id, snapshot) = state
        .sessions
        .read(session_id, |s| {
            let privacy_mode = s.privacy_mode || request.privacy_mode.unwrap_or(false);
            (
                s.draft_id,
                DraftSnapshot::capture(&s.request, s.insights.as_ref(), &s.proposal, privacy_mode),
            )
        })
        .await?;
    let privacy_mode = snapshot.privacy_mode;

    let saved = state.drafts.save(draft_id, snapshot).await?;
    // The session may have been closed meanwhile; the draft is stored either way.
    let _ = state
        .sessions
        .update(session_id, |s| s.draft_id = Some(saved.draft_id))
        .await;
    info!(
        "Session {session_id}: saved draft {} v{}",
        saved.draft_id, saved.version
    );

    Ok((
        StatusCode::CREATED,
        Json(SaveDraftResponse {
            draft_id: saved.draft_id,
            version: saved.version,
            privacy_mode,
        }),
    ))
}

async fn section_response(
    state: &AppState,
    session_id: Uuid,
    kind: SectionKind,
) -> Result<Json<SectionResponse>, AppError> {
    let response = state
        .sessions
        .read(session_id, |s| SectionResponse {
            section: s.proposal.section(kind).clone(),
            revision: s.proposal.revision,
            quality: score(&s.proposal, &state.config.quality),
        })
        .await?;
    Ok(Json(response))
}
