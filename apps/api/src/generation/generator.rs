//! Section Generator: turns prompts into section bodies.
//!
//! Flow: build prompt → call the generation capability (bounded retry with backoff)
//!       → normalise the reply → hand the body back to the session, which owns the proposal.
//!
//! Nothing here touches session state: the caller decides whether a result still applies.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{GenerationConfig, GenerationMode, GenerationParams, RetryPolicy};
use crate::generation::prompt_builder::{
    build_json_repair_prompt, build_proposal_prompt, build_section_prompt, PromptContext,
    SectionPrompt,
};
use crate::llm_client::{parse_json_reply, CompletionRequest, LlmError, TextGenerator};
use crate::models::proposal::{ProposalRequest, SectionKind};

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    Auth,
    RateLimited,
    Network,
    Malformed,
    Empty,
    Service,
}

/// A generation failure, naming the section it belongs to when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{scope} failed: {message}", scope = scope(.section))]
pub struct GenerationError {
    pub section: Option<SectionKind>,
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    fn new(section: Option<SectionKind>, kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            section,
            kind,
            message: message.into(),
        }
    }

    /// Classifies a capability failure.
    pub fn from_llm(section: Option<SectionKind>, error: &LlmError) -> Self {
        let kind = match error {
            LlmError::Api { status: 401 | 403, .. } => GenerationErrorKind::Auth,
            LlmError::Api { status: 429, .. } => GenerationErrorKind::RateLimited,
            LlmError::Api { .. } => GenerationErrorKind::Service,
            LlmError::Http(e) if e.is_decode() => GenerationErrorKind::Malformed,
            LlmError::Http(_) => GenerationErrorKind::Network,
            LlmError::Parse(_) => GenerationErrorKind::Malformed,
            LlmError::EmptyContent => GenerationErrorKind::Empty,
        };
        Self::new(section, kind, error.to_string())
    }
}

fn scope(section: &Option<SectionKind>) -> String {
    match section {
        Some(kind) => format!("generating '{}'", kind.title()),
        None => "generation".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generator
// ────────────────────────────────────────────────────────────────────────────

/// Result for one section of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOutcome {
    pub kind: SectionKind,
    pub result: Result<String, GenerationError>,
}

/// Whole-proposal reply in single-pass mode.
#[derive(Debug, Deserialize)]
struct ProposalReply {
    #[serde(default)]
    sections: HashMap<String, String>,
}

#[derive(Clone)]
pub struct SectionGenerator {
    llm: Arc<dyn TextGenerator>,
    params: GenerationParams,
    retry: RetryPolicy,
    mode: GenerationMode,
    concurrency: usize,
}

impl SectionGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, config: &GenerationConfig) -> Self {
        Self {
            llm,
            params: config.params.clone(),
            retry: config.retry.clone(),
            mode: config.mode,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Generates one section body from its prompt.
    pub async fn generate_section(
        &self,
        kind: SectionKind,
        prompt: &SectionPrompt,
    ) -> Result<String, GenerationError> {
        let text = self
            .complete_with_retry(prompt, kind.title())
            .await
            .map_err(|e| GenerationError::from_llm(Some(kind), &e))?;

        let body = accept_section(kind, &text)?;
        info!("Generated section '{}' ({} chars)", kind.title(), body.chars().count());
        Ok(body)
    }

    /// Calls the capability and parses the reply as JSON.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        prompt: &SectionPrompt,
    ) -> Result<T, GenerationError> {
        let text = self
            .complete_with_retry(prompt, "json")
            .await
            .map_err(|e| GenerationError::from_llm(None, &e))?;
        parse_json_reply(&text).map_err(|e| GenerationError::from_llm(None, &e))
    }

    /// Generates the given sections, at most `concurrency` at a time.
    ///
    /// Every requested kind gets exactly one outcome, in schema order. A failing section
    /// never stops the others.
    pub async fn generate_all(
        &self,
        request: &ProposalRequest,
        context: &PromptContext<'_>,
        kinds: &[SectionKind],
    ) -> Vec<SectionOutcome> {
        let mut outcomes = Vec::with_capacity(kinds.len());
        let mut remaining: Vec<SectionKind> = kinds.to_vec();

        // A lone section is always written with its own prompt.
        if self.mode == GenerationMode::SinglePass && remaining.len() > 1 {
            match self.generate_single_pass(request, context).await {
                Ok(mut bodies) => remaining.retain(|kind| match bodies.remove(kind) {
                    Some(body) => {
                        outcomes.push(SectionOutcome {
                            kind: *kind,
                            result: Ok(body),
                        });
                        false
                    }
                    None => true,
                }),
                Err(e) => warn!("Single-pass generation failed, falling back per section: {e}"),
            }
            if !remaining.is_empty() {
                info!("{} sections missing from single-pass reply", remaining.len());
            }
        }

        let per_section: Vec<SectionOutcome> = stream::iter(remaining)
            .map(|kind| async move {
                let prompt = build_section_prompt(request, context, kind);
                SectionOutcome {
                    kind,
                    result: self.generate_section(kind, &prompt).await,
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        outcomes.extend(per_section);
        outcomes.sort_by_key(|o| o.kind);

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            warn!("{failed}/{} sections failed to generate", outcomes.len());
        }
        outcomes
    }

    async fn generate_single_pass(
        &self,
        request: &ProposalRequest,
        context: &PromptContext<'_>,
    ) -> Result<HashMap<SectionKind, String>, GenerationError> {
        let prompt = build_proposal_prompt(request, context);
        let text = self
            .complete_with_retry(&prompt, "proposal")
            .await
            .map_err(|e| GenerationError::from_llm(None, &e))?;

        // An unparseable reply gets one repair request before falling back per section.
        let reply: ProposalReply = match parse_json_reply(&text) {
            Ok(reply) => reply,
            Err(e) => {
                info!("Single-pass reply is not valid JSON ({e}); requesting a repair");
                self.generate_json(&build_json_repair_prompt(&text)).await?
            }
        };

        let mut bodies = HashMap::new();
        for (title, text) in reply.sections {
            let Some(kind) = SectionKind::from_title(&title) else {
                debug!("Ignoring unknown section '{title}' in single-pass reply");
                continue;
            };
            match accept_section(kind, &text) {
                Ok(body) => {
                    bodies.insert(kind, body);
                }
                Err(e) => debug!("Single-pass body rejected: {e}"),
            }
        }
        Ok(bodies)
    }

    /// One logical call: retries network, rate-limit and server failures with backoff.
    async fn complete_with_retry(
        &self,
        prompt: &SectionPrompt,
        label: &str,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            system: prompt.system,
            prompt: &prompt.prompt,
            params: &self.params,
        };
        let mut attempt = 1;
        loop {
            match self.llm.complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "'{label}' attempt {attempt}/{} failed: {e}; retrying in {delay:?}",
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Normalisation
// ────────────────────────────────────────────────────────────────────────────

/// Normalises a reply and refuses it when nothing usable is left: an empty body,
/// or one made only of headings.
fn accept_section(kind: SectionKind, text: &str) -> Result<String, GenerationError> {
    let body = normalize_section(kind, text);
    if body.is_empty() {
        return Err(GenerationError::new(
            Some(kind),
            GenerationErrorKind::Empty,
            "the model returned no section text",
        ));
    }
    if body.lines().all(|l| l.trim().is_empty() || heading_text(l.trim()).is_some()) {
        return Err(GenerationError::new(
            Some(kind),
            GenerationErrorKind::Malformed,
            "the reply contained headings but no section text",
        ));
    }
    Ok(body)
}

/// Cleans a model reply into a section body.
///
/// - a surrounding code fence is removed
/// - a leading heading that repeats the section title is dropped
/// - consecutive identical headings collapse into one
/// - runs of blank lines collapse, outer whitespace is trimmed
pub fn normalize_section(kind: SectionKind, text: &str) -> String {
    let text = strip_code_fence(text.trim());
    let mut lines: Vec<&str> = Vec::new();
    let mut last_heading: Option<String> = None;
    let mut seen_content = false;

    for line in text.lines() {
        let line = line.trim_end();
        let trimmed = line.trim();
        if let Some(heading) = heading_text(trimmed) {
            if !seen_content && heading.eq_ignore_ascii_case(kind.title()) {
                continue;
            }
            let key = heading.to_lowercase();
            if last_heading.as_deref() == Some(key.as_str()) {
                continue;
            }
            last_heading = Some(key);
            seen_content = true;
        } else if trimmed.is_empty() {
            if lines.last().map_or(true, |l| l.trim().is_empty()) {
                continue;
            }
        } else {
            last_heading = None;
            seen_content = true;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

/// The text of a Markdown heading (`## Title`) or a bold-only line (`**Title**`).
fn heading_text(line: &str) -> Option<&str> {
    if line.starts_with('#') {
        let rest = line.trim_start_matches('#');
        if !rest.is_empty() && !rest.starts_with(' ') {
            return None;
        }
        return Some(rest.trim().trim_end_matches('#').trim().trim_end_matches(':'));
    }
    if line.len() > 4 && line.starts_with("**") && line.ends_with("**") {
        let inner = &line[2..line.len() - 2];
        if !inner.contains("**") {
            return Some(inner.trim().trim_end_matches(':'));
        }
    }
    None
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") || !text.ends_with("```") || text.len() < 6 {
        return text;
    }
    let inner = &text[3..text.len() - 3];
    // Drop the info string (e.g. "markdown") on the opening fence line.
    match inner.find('\n') {
        Some(newline) => inner[newline + 1..].trim(),
        None => inner.trim(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::generation::prompts::PROPOSAL_SYSTEM;
    use crate::llm_client::fake::ScriptedGenerator;
    use crate::models::proposal::fixtures::{acme_request, relevant_body};
    use crate::models::proposal::{Proposal, ProposalMeta, SectionStatus};

    fn context() -> PromptContext<'static> {
        PromptContext {
            privacy_mode: false,
            transcript_max_chars: 6000,
            insights: None,
        }
    }

    fn config(mode: GenerationMode) -> GenerationConfig {
        GenerationConfig {
            mode,
            retry: RetryPolicy::immediate(3),
            ..GenerationConfig::default()
        }
    }

    fn kind_in_prompt(prompt: &str) -> Option<SectionKind> {
        SectionKind::ALL
            .into_iter()
            .find(|k| prompt.contains(&format!("Write the \"{}\" section", k.title())))
    }

    /// Answers each section prompt with a relevant body for that section.
    fn section_writer() -> ScriptedGenerator {
        ScriptedGenerator::new(|_, prompt| {
            let kind = kind_in_prompt(prompt).ok_or(LlmError::EmptyContent)?;
            Ok(format!("## {}\n\n{}", kind.title(), relevant_body(kind)))
        })
    }

    fn api_error(status: u16) -> LlmError {
        LlmError::Api {
            status,
            message: "scripted".to_string(),
        }
    }

    #[tokio::test]
    async fn test_acme_request_yields_twelve_relevant_sections() {
        let fake = Arc::new(section_writer());
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::PerSection));
        let request = acme_request();

        let outcomes = generator
            .generate_all(&request, &context(), &SectionKind::ALL)
            .await;

        assert_eq!(outcomes.len(), 12);
        let mut proposal = Proposal::new(ProposalMeta::from(&request));
        for (outcome, kind) in outcomes.into_iter().zip(SectionKind::ALL) {
            assert_eq!(outcome.kind, kind);
            let body = outcome.result.unwrap();
            assert!(!body.starts_with("##"), "title heading should be dropped");
            assert!(body.contains("Acme") && body.contains("Globex"));
            proposal.apply_generated(kind, body);
        }
        assert!(proposal.is_complete());
        assert!(proposal.check_invariants().is_ok());
        assert_eq!(fake.calls(), 12);
    }

    #[tokio::test]
    async fn test_failing_section_is_reported_without_aborting_others() {
        let fake = Arc::new(ScriptedGenerator::new(|_, prompt| {
            match kind_in_prompt(prompt) {
                Some(SectionKind::PricingPayment) => Err(api_error(401)),
                Some(kind) => Ok(relevant_body(kind)),
                None => Err(LlmError::EmptyContent),
            }
        }));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::PerSection));

        let outcomes = generator
            .generate_all(&acme_request(), &context(), &SectionKind::ALL)
            .await;

        let failures: Vec<&SectionOutcome> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failures.len(), 1);
        let err = failures[0].result.as_ref().unwrap_err();
        assert_eq!(err.section, Some(SectionKind::PricingPayment));
        assert_eq!(err.kind, GenerationErrorKind::Auth);
        // Auth failures are not retried.
        assert_eq!(fake.calls(), 12);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let attempts = AtomicUsize::new(0);
        let fake = Arc::new(ScriptedGenerator::new(move |_, _| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(api_error(503))
            } else {
                Ok(relevant_body(SectionKind::Appendix))
            }
        }));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::PerSection));
        let prompt = build_section_prompt(&acme_request(), &context(), SectionKind::Appendix);

        let body = generator
            .generate_section(SectionKind::Appendix, &prompt)
            .await
            .unwrap();
        assert!(body.contains("appendix"));
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_max_attempts() {
        let fake = Arc::new(ScriptedGenerator::new(|_, _| Err(api_error(429))));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::PerSection));
        let prompt = build_section_prompt(&acme_request(), &context(), SectionKind::NextSteps);

        let err = generator
            .generate_section(SectionKind::NextSteps, &prompt)
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::RateLimited);
        assert_eq!(err.section, Some(SectionKind::NextSteps));
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn test_heading_only_reply_is_malformed() {
        let fake = Arc::new(ScriptedGenerator::constant("## Risks\n\n## Mitigations"));
        let generator = SectionGenerator::new(fake, &config(GenerationMode::PerSection));
        let prompt = build_section_prompt(&acme_request(), &context(), SectionKind::RisksMitigations);

        let err = generator
            .generate_section(SectionKind::RisksMitigations, &prompt)
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_title_only_reply_is_empty() {
        let fake = Arc::new(ScriptedGenerator::constant("# Appendix\n\n"));
        let generator = SectionGenerator::new(fake, &config(GenerationMode::PerSection));
        let prompt = build_section_prompt(&acme_request(), &context(), SectionKind::Appendix);

        let err = generator
            .generate_section(SectionKind::Appendix, &prompt)
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Empty);
    }

    #[tokio::test]
    async fn test_single_pass_fills_gaps_per_section() {
        let fake = Arc::new(ScriptedGenerator::new(|system, prompt| {
            if system == PROPOSAL_SYSTEM {
                let sections: serde_json::Map<String, serde_json::Value> = SectionKind::ALL
                    .iter()
                    .filter(|k| **k != SectionKind::RoiImpact)
                    .map(|k| (k.title().to_string(), relevant_body(*k).into()))
                    .collect();
                return Ok(format!("```json\n{}\n```", serde_json::json!({ "sections": sections })));
            }
            let kind = kind_in_prompt(prompt).ok_or(LlmError::EmptyContent)?;
            Ok(relevant_body(kind))
        }));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::SinglePass));

        let outcomes = generator
            .generate_all(&acme_request(), &context(), &SectionKind::ALL)
            .await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(fake.calls(), 2);
        let roi = &outcomes[SectionKind::RoiImpact.index()];
        assert_eq!(roi.kind, SectionKind::RoiImpact);
    }

    /// Single-pass reply carrying every section, with `body_for` deciding each body.
    fn proposal_json(body_for: impl Fn(SectionKind) -> String) -> String {
        let sections: serde_json::Map<String, serde_json::Value> = SectionKind::ALL
            .iter()
            .map(|k| (k.title().to_string(), body_for(*k).into()))
            .collect();
        serde_json::json!({ "sections": sections }).to_string()
    }

    fn is_repair(prompt: &str) -> bool {
        prompt.contains("possibly malformed JSON")
    }

    #[tokio::test]
    async fn test_single_pass_heading_only_body_falls_back() {
        let fake = Arc::new(ScriptedGenerator::new(|system, prompt| {
            if system == PROPOSAL_SYSTEM {
                return Ok(proposal_json(|k| match k {
                    SectionKind::RisksMitigations => "## Risks\n\n## Mitigations".to_string(),
                    other => relevant_body(other),
                }));
            }
            let kind = kind_in_prompt(prompt).ok_or(LlmError::EmptyContent)?;
            Ok(format!("{} Written on its own.", relevant_body(kind)))
        }));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::SinglePass));

        let outcomes = generator
            .generate_all(&acme_request(), &context(), &SectionKind::ALL)
            .await;

        assert_eq!(fake.calls(), 2);
        let risks = outcomes[SectionKind::RisksMitigations.index()].result.as_ref().unwrap();
        assert!(risks.ends_with("Written on its own."));
        let appendix = outcomes[SectionKind::Appendix.index()].result.as_ref().unwrap();
        assert_eq!(appendix, &relevant_body(SectionKind::Appendix));
    }

    #[tokio::test]
    async fn test_single_pass_repairs_invalid_json_once() {
        let fake = Arc::new(ScriptedGenerator::new(|system, prompt| {
            if system == PROPOSAL_SYSTEM {
                // Trailing comma: not valid JSON.
                let json = proposal_json(relevant_body);
                return Ok(format!("{},", &json[..json.len() - 1]) + "}");
            }
            if is_repair(prompt) {
                return Ok(proposal_json(relevant_body));
            }
            Err(LlmError::EmptyContent)
        }));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::SinglePass));

        let outcomes = generator
            .generate_all(&acme_request(), &context(), &SectionKind::ALL)
            .await;

        assert_eq!(fake.calls(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert!(is_repair(&fake.prompts()[1]));
    }

    #[tokio::test]
    async fn test_single_pass_falls_back_when_repair_fails() {
        let fake = Arc::new(ScriptedGenerator::new(|system, prompt| {
            if system == PROPOSAL_SYSTEM || is_repair(prompt) {
                return Ok("Sure! Here is your proposal.".to_string());
            }
            let kind = kind_in_prompt(prompt).ok_or(LlmError::EmptyContent)?;
            Ok(relevant_body(kind))
        }));
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::SinglePass));

        let outcomes = generator
            .generate_all(&acme_request(), &context(), &SectionKind::ALL)
            .await;

        assert_eq!(fake.calls(), 2 + 12);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[tokio::test]
    async fn test_single_section_fan_out_calls_once() {
        let fake = Arc::new(section_writer());
        let generator = SectionGenerator::new(fake.clone(), &config(GenerationMode::PerSection));

        let outcomes = generator
            .generate_all(&acme_request(), &context(), &[SectionKind::ScopeOfWork])
            .await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(fake.calls(), 1);

        let single_pass = SectionGenerator::new(fake.clone(), &config(GenerationMode::SinglePass));
        let outcomes = single_pass
            .generate_all(&acme_request(), &context(), &[SectionKind::ScopeOfWork])
            .await;
        assert!(outcomes[0].result.is_ok());
        assert_eq!(fake.calls(), 2);
        let mut proposal = Proposal::new(ProposalMeta::from(&acme_request()));
        proposal.apply_generated(SectionKind::ScopeOfWork, outcomes[0].result.clone().unwrap());
        assert_eq!(
            proposal.section(SectionKind::ScopeOfWork).status,
            SectionStatus::Generated
        );
    }

    #[test]
    fn test_normalize_drops_leading_title_heading() {
        let text = "# Executive Summary\n\nAcme proposes a revamp.";
        assert_eq!(
            normalize_section(SectionKind::ExecutiveSummary, text),
            "Acme proposes a revamp."
        );
        let bold = "**Executive Summary:**\nAcme proposes a revamp.";
        assert_eq!(
            normalize_section(SectionKind::ExecutiveSummary, bold),
            "Acme proposes a revamp."
        );
    }

    #[test]
    fn test_normalize_collapses_duplicate_headings() {
        let text = "Intro.\n\n## Deliverables\n\n## Deliverables\n- Design\n\n\n\n- Build";
        assert_eq!(
            normalize_section(SectionKind::ScopeOfWork, text),
            "Intro.\n\n## Deliverables\n\n- Design\n\n- Build"
        );
    }

    #[test]
    fn test_normalize_keeps_title_heading_after_content() {
        let text = "Opening line.\n\n## Appendix\nMore.";
        assert_eq!(normalize_section(SectionKind::Appendix, text), text);
    }

    #[test]
    fn test_normalize_strips_code_fence() {
        let text = "```markdown\n## Next Steps & CTA\nSign by Friday.\n```";
        assert_eq!(normalize_section(SectionKind::NextSteps, text), "Sign by Friday.");
    }

    #[test]
    fn test_error_classification() {
        let auth = GenerationError::from_llm(None, &api_error(403));
        assert_eq!(auth.kind, GenerationErrorKind::Auth);
        let service = GenerationError::from_llm(None, &api_error(500));
        assert_eq!(service.kind, GenerationErrorKind::Service);
        let empty = GenerationError::from_llm(Some(SectionKind::Appendix), &LlmError::EmptyContent);
        assert_eq!(empty.kind, GenerationErrorKind::Empty);
        assert!(empty.to_string().contains("Appendix"));
    }
}
