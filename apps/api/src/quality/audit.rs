//! Model-graded review of a finished proposal.
//!
//! Complements the deterministic `score`: the model reads the whole proposal against the
//! engagement facts and returns a grade, a short summary, suggestions and edit notes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::generation::generator::{GenerationError, GenerationErrorKind, SectionGenerator};
use crate::generation::prompt_builder::build_audit_prompt;
use crate::models::proposal::{Proposal, ProposalRequest};

const FALLBACK_GRADE: u32 = 70;
const FALLBACK_SUMMARY: &str = "Basic check complete.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAudit {
    pub grade: u32,
    pub summary: String,
    pub suggestions: Vec<String>,
    /// "search text -> replacement text" notes the user may apply by hand.
    pub apply_notes: Vec<String>,
    /// Proposal revision the audit was run against.
    pub revision: u64,
    /// True when the model reply was unusable and the basic verdict was returned.
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
struct AuditReply {
    grade: Option<f64>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    apply_notes: Vec<String>,
}

impl QualityAudit {
    fn basic(revision: u64) -> Self {
        Self {
            grade: FALLBACK_GRADE,
            summary: FALLBACK_SUMMARY.to_string(),
            suggestions: Vec::new(),
            apply_notes: Vec::new(),
            revision,
            fallback: true,
        }
    }

    fn from_reply(reply: AuditReply, revision: u64) -> Option<Self> {
        let grade = reply.grade.filter(|g| g.is_finite())?;
        Some(Self {
            grade: grade.round().clamp(0.0, 100.0) as u32,
            summary: reply.summary.trim().to_string(),
            suggestions: non_blank(reply.suggestions),
            apply_notes: non_blank(reply.apply_notes),
            revision,
            fallback: false,
        })
    }
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Asks the model to review the proposal. A reply without a usable grade degrades to the
/// basic verdict; transport and auth failures are returned as errors.
pub async fn audit_proposal(
    generator: &SectionGenerator,
    request: &ProposalRequest,
    proposal: &Proposal,
    privacy_mode: bool,
) -> Result<QualityAudit, GenerationError> {
    let prompt = build_audit_prompt(request, proposal, privacy_mode);
    match generator.generate_json::<AuditReply>(&prompt).await {
        Ok(reply) => Ok(QualityAudit::from_reply(reply, proposal.revision).unwrap_or_else(|| {
            warn!("Audit reply carried no grade; using the basic verdict");
            QualityAudit::basic(proposal.revision)
        })),
        Err(e) if matches!(e.kind, GenerationErrorKind::Malformed | GenerationErrorKind::Empty) => {
            warn!("Audit reply was unusable ({e}); using the basic verdict");
            Ok(QualityAudit::basic(proposal.revision))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{GenerationConfig, RetryPolicy};
    use crate::llm_client::fake::ScriptedGenerator;
    use crate::llm_client::LlmError;
    use crate::models::proposal::fixtures::{acme_request, filled_proposal};

    fn generator(fake: ScriptedGenerator) -> SectionGenerator {
        let config = GenerationConfig {
            retry: RetryPolicy::immediate(1),
            ..GenerationConfig::default()
        };
        SectionGenerator::new(Arc::new(fake), &config)
    }

    #[tokio::test]
    async fn test_audit_fields_are_parsed_and_trimmed() {
        let fake = ScriptedGenerator::constant(
            r#"```json
{"grade": 86.6, "summary": " Clear and specific. ", "suggestions": ["Name the QA owner", "  "], "apply_notes": ["6 weeks -> six weeks"]}
```"#,
        );
        let proposal = filled_proposal();
        let audit = audit_proposal(&generator(fake), &acme_request(), &proposal, false)
            .await
            .unwrap();
        assert_eq!(audit.grade, 87);
        assert_eq!(audit.summary, "Clear and specific.");
        assert_eq!(audit.suggestions, vec!["Name the QA owner".to_string()]);
        assert_eq!(audit.apply_notes, vec!["6 weeks -> six weeks".to_string()]);
        assert_eq!(audit.revision, proposal.revision);
        assert!(!audit.fallback);
    }

    #[tokio::test]
    async fn test_grade_is_clamped_to_percent() {
        let fake = ScriptedGenerator::constant(r#"{"grade": 140, "summary": "Great."}"#);
        let audit = audit_proposal(&generator(fake), &acme_request(), &filled_proposal(), false)
            .await
            .unwrap();
        assert_eq!(audit.grade, 100);

        let fake = ScriptedGenerator::constant(r#"{"grade": -5, "summary": "Poor."}"#);
        let audit = audit_proposal(&generator(fake), &acme_request(), &filled_proposal(), false)
            .await
            .unwrap();
        assert_eq!(audit.grade, 0);
    }

    #[tokio::test]
    async fn test_prose_or_gradeless_reply_gives_basic_verdict() {
        for reply in ["Looks good to me!", r#"{"summary": "Fine."}"#] {
            let fake = ScriptedGenerator::constant(reply);
            let audit = audit_proposal(&generator(fake), &acme_request(), &filled_proposal(), false)
                .await
                .unwrap();
            assert_eq!(audit.grade, 70, "reply {reply:?}");
            assert_eq!(audit.summary, "Basic check complete.");
            assert!(audit.suggestions.is_empty());
            assert!(audit.apply_notes.is_empty());
            assert!(audit.fallback);
        }
    }

    #[tokio::test]
    async fn test_private_audit_leaves_transcript_out_of_prompt() {
        let fake = Arc::new(ScriptedGenerator::constant(r#"{"grade": 80, "summary": "Ok."}"#));
        let config = GenerationConfig {
            retry: RetryPolicy::immediate(1),
            ..GenerationConfig::default()
        };
        let generator = SectionGenerator::new(fake.clone(), &config);
        let mut request = acme_request();
        request.transcript = Some("Globex wants faster checkout.".to_string());

        audit_proposal(&generator, &request, &filled_proposal(), true)
            .await
            .unwrap();
        let prompts = fake.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("proposal QA expert"));
        assert!(!prompts[0].contains("checkout"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_an_error() {
        let fake = ScriptedGenerator::new(|_, _| {
            Err(LlmError::Api {
                status: 401,
                message: "invalid x-api-key".to_string(),
            })
        });
        let err = audit_proposal(&generator(fake), &acme_request(), &filled_proposal(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Auth);
    }
}
