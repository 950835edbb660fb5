//! Transcript insights: a structured summary of the call, extracted once per session.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::generation::generator::{GenerationError, SectionGenerator};
use crate::generation::prompt_builder::{build_insights_prompt, PromptContext};
use crate::models::proposal::ProposalRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptInsights {
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub commitments: Vec<String>,
    #[serde(default)]
    pub timeline_hints: Vec<String>,
    #[serde(default)]
    pub budget_cues: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
}

impl TranscriptInsights {
    pub fn is_empty(&self) -> bool {
        self.groups().iter().all(|(_, items)| items.is_empty())
    }

    /// Renders the non-empty groups as labelled bullet lists for prompt inclusion.
    pub fn to_bullets(&self) -> String {
        self.groups()
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(label, items)| {
                let lines: Vec<String> = items.iter().map(|i| format!("  - {}", i.trim())).collect();
                format!("- {label}:\n{}", lines.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn groups(&self) -> [(&'static str, &Vec<String>); 5] {
        [
            ("Pain points", &self.pain_points),
            ("Commitments", &self.commitments),
            ("Timeline hints", &self.timeline_hints),
            ("Budget cues", &self.budget_cues),
            ("Quotes", &self.quotes),
        ]
    }

    /// Drops blank items and trims the rest.
    fn tidy(mut self) -> Self {
        for list in [
            &mut self.pain_points,
            &mut self.commitments,
            &mut self.timeline_hints,
            &mut self.budget_cues,
            &mut self.quotes,
        ] {
            list.retain(|item| !item.trim().is_empty());
            for item in list.iter_mut() {
                *item = item.trim().to_string();
            }
        }
        self
    }
}

/// Extracts insights from the request's transcript.
///
/// Returns `Ok(None)` when there is nothing the session may send (no transcript, or
/// privacy mode on); the model is not called in that case.
pub async fn extract_insights(
    generator: &SectionGenerator,
    request: &ProposalRequest,
    context: &PromptContext<'_>,
) -> Result<Option<TranscriptInsights>, GenerationError> {
    let Some(prompt) = build_insights_prompt(request, context) else {
        return Ok(None);
    };
    let insights: TranscriptInsights = generator.generate_json(&prompt).await?;
    let insights = insights.tidy();
    info!(
        "Transcript insights extracted: {} pain points, {} commitments",
        insights.pain_points.len(),
        insights.commitments.len()
    );
    Ok(Some(insights))
}
