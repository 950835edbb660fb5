//! Covering email for a finished proposal.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::generation::generator::{GenerationError, GenerationErrorKind, SectionGenerator};
use crate::generation::prompt_builder::build_email_prompt;
use crate::models::proposal::{Proposal, ProposalRequest};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub pitch: String,
    /// True when the model reply was unusable and a minimal template was returned.
    #[serde(default, skip_deserializing)]
    pub fallback: bool,
}

impl EmailDraft {
    fn minimal(project_title: &str) -> Self {
        Self {
            subject: format!("Proposal: {}", project_title.trim()),
            body: "Please find attached.".to_string(),
            summary: String::new(),
            pitch: String::new(),
            fallback: true,
        }
    }
}

/// Composes the covering email. A reply that is not usable JSON degrades to a minimal
/// template; transport and auth failures are returned as errors.
pub async fn compose_email(
    generator: &SectionGenerator,
    request: &ProposalRequest,
    proposal: &Proposal,
) -> Result<EmailDraft, GenerationError> {
    let prompt = build_email_prompt(request, proposal);
    match generator.generate_json::<EmailDraft>(&prompt).await {
        Ok(draft) if !draft.subject.trim().is_empty() && !draft.body.trim().is_empty() => {
            Ok(EmailDraft {
                subject: draft.subject.trim().to_string(),
                body: draft.body.trim().to_string(),
                summary: draft.summary.trim().to_string(),
                pitch: draft.pitch.trim().to_string(),
                fallback: false,
            })
        }
        Ok(_) => {
            warn!("Email reply lacked a subject or body; using the minimal template");
            Ok(EmailDraft::minimal(&proposal.meta.project_title))
        }
        Err(e) if matches!(e.kind, GenerationErrorKind::Malformed | GenerationErrorKind::Empty) => {
            warn!("Email reply was unusable ({e}); using the minimal template");
            Ok(EmailDraft::minimal(&proposal.meta.project_title))
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
    async fn test_email_fields_are_parsed() {
        let fake = ScriptedGenerator::constant(
            r#"{"subject": "Website Revamp proposal for Globex", "body": "Hi team,\n\nAttached.", "summary": "A six week revamp.", "pitch": "More conversions in 6 weeks."}"#,
        );
        let email = compose_email(&generator(fake), &acme_request(), &filled_proposal())
            .await
            .unwrap();
        assert_eq!(email.subject, "Website Revamp proposal for Globex");
        assert_eq!(email.pitch, "More conversions in 6 weeks.");
        assert!(!email.fallback);
    }

    #[tokio::test]
    async fn test_prose_reply_falls_back_to_template() {
        let fake = ScriptedGenerator::constant("Sure! Here is your email.");
        let email = compose_email(&generator(fake), &acme_request(), &filled_proposal())
            .await
            .unwrap();
        assert_eq!(email.subject, "Proposal: Website Revamp");
        assert!(email.fallback);
    }

    #[tokio::test]
    async fn test_auth_failure_is_an_error() {
        let fake = ScriptedGenerator::new(|_, _| {
            Err(LlmError::Api {
                status: 401,
                message: "invalid x-api-key".to_string(),
            })
        });
        let err = compose_email(&generator(fake), &acme_request(), &filled_proposal())
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Auth);
    }
}
