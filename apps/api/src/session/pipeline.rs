//! Generation flows over a session: the initial proposal and single-section regeneration.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::generation::generator::{GenerationError, SectionGenerator};
use crate::generation::insights::extract_insights;
use crate::generation::prompt_builder::{build_section_prompt, PromptContext};
use crate::models::proposal::{ProposalRequest, SectionKind};
use crate::session::{Completion, SectionFailure, Session, SessionError, SessionRegistry};

/// Per-section result of a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub generated: Vec<SectionKind>,
    pub failed: Vec<SectionFailure>,
    /// Results that arrived after the section was edited.
    pub discarded: Vec<SectionKind>,
}

#[derive(Debug)]
pub enum RegenerateError {
    Session(SessionError),
    Generation(GenerationError),
    /// The section was edited while the call ran; the result was dropped.
    Superseded(SectionKind),
}

impl From<SessionError> for RegenerateError {
    fn from(e: SessionError) -> Self {
        RegenerateError::Session(e)
    }
}

/// Opens a session for a validated request and generates every section.
///
/// Transcript insights are extracted first when allowed; a failure there becomes a
/// session notice. Failed sections stay pending and are listed in the report.
pub async fn start_session(
    generator: &SectionGenerator,
    registry: &SessionRegistry,
    config: &Config,
    request: ProposalRequest,
) -> Result<(Uuid, GenerationReport), SessionError> {
    let privacy_mode = request.privacy_mode.unwrap_or(config.privacy_mode_default);
    let mut session = Session::new(request, privacy_mode);

    if config.generation.summarize_transcript {
        let context = PromptContext {
            privacy_mode,
            transcript_max_chars: config.generation.transcript_max_chars,
            insights: None,
        };
        match extract_insights(generator, &session.request, &context).await {
            Ok(insights) => session.insights = insights,
            Err(e) => {
                warn!("Transcript insights failed: {e}");
                session
                    .notices
                    .push(format!("Transcript insights are unavailable: {}", e.message));
            }
        }
    }

    let id = registry.insert(session).await;
    let report = generate_sections(generator, registry, config, id, &SectionKind::ALL).await?;
    info!(
        "Session {id}: {} sections generated, {} failed",
        report.generated.len(),
        report.failed.len()
    );
    Ok((id, report))
}

/// Generates the given sections of an existing session.
pub async fn generate_sections(
    generator: &SectionGenerator,
    registry: &SessionRegistry,
    config: &Config,
    session_id: Uuid,
    kinds: &[SectionKind],
) -> Result<GenerationReport, SessionError> {
    let (tickets, inputs) = registry.begin(session_id, kinds).await?;
    let context = PromptContext {
        privacy_mode: inputs.privacy_mode,
        transcript_max_chars: config.generation.transcript_max_chars,
        insights: inputs.insights.as_ref(),
    };
    let outcomes = generator
        .generate_all(&inputs.request, &context, kinds)
        .await;

    let mut report = GenerationReport::default();
    for outcome in outcomes {
        let Some(ticket) = tickets.iter().find(|t| t.kind == outcome.kind) else {
            continue;
        };
        match registry.complete(*ticket, outcome.result).await {
            Completion::Applied => report.generated.push(outcome.kind),
            Completion::Failed(e) => report.failed.push(SectionFailure::new(outcome.kind, &e)),
            Completion::Superseded => report.discarded.push(outcome.kind),
            Completion::SessionClosed => return Err(SessionError::NotFound(session_id)),
        }
    }
    Ok(report)
}

/// Regenerates one section. Only that section's body, status and history change.
pub async fn regenerate_section(
    generator: &SectionGenerator,
    registry: &SessionRegistry,
    config: &Config,
    session_id: Uuid,
    kind: SectionKind,
) -> Result<(), RegenerateError> {
    let (tickets, inputs) = registry.begin(session_id, &[kind]).await?;
    let context = PromptContext {
        privacy_mode: inputs.privacy_mode,
        transcript_max_chars: config.generation.transcript_max_chars,
        insights: inputs.insights.as_ref(),
    };
    let prompt = build_section_prompt(&inputs.request, &context, kind);
    let result = generator.generate_section(kind, &prompt).await;

    for ticket in tickets {
        match registry.complete(ticket, result.clone()).await {
            Completion::Applied => info!("Session {session_id}: regenerated '{}'", kind.title()),
            Completion::Failed(e) => return Err(RegenerateError::Generation(e)),
            Completion::Superseded => return Err(RegenerateError::Superseded(kind)),
            Completion::SessionClosed => {
                return Err(SessionError::NotFound(session_id).into());
            }
        }
    }
    Ok(())
}
