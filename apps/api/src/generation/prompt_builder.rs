//! Prompt Builder: assembles generation prompts from a request.
//!
//! Deterministic: the same request, context and section always produce the same prompt,
//! so regenerating a single section is reproducible up to the model's own sampling.

use crate::generation::insights::TranscriptInsights;
use crate::generation::prompts::{
    section_guidance, EMAIL_PROMPT_TEMPLATE, INSIGHTS_PROMPT_TEMPLATE,
    JSON_REPAIR_PROMPT_TEMPLATE, PROPOSAL_PROMPT_TEMPLATE, PROPOSAL_SYSTEM,
    QUALITY_AUDIT_PROMPT_TEMPLATE, SECTION_PROMPT_TEMPLATE, SECTION_SYSTEM,
};
use crate::generation::tone::get_tone_guide;
use crate::llm_client::prompts::{FACTS_INSTRUCTION, FORMAT_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::models::proposal::{Proposal, ProposalRequest, SectionKind};

const NO_CALL_CONTEXT: &str = "No call transcript provided.";
/// The audit sees only the opening of the call.
const AUDIT_TRANSCRIPT_CHARS: usize = 1000;

/// A ready-to-send prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPrompt {
    pub system: &'static str,
    pub prompt: String,
}

/// Session-level inputs that shape prompts beyond the request itself.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub privacy_mode: bool,
    pub transcript_max_chars: usize,
    pub insights: Option<&'a TranscriptInsights>,
}

/// Builds the prompt for one section.
pub fn build_section_prompt(
    request: &ProposalRequest,
    context: &PromptContext<'_>,
    kind: SectionKind,
) -> SectionPrompt {
    let tone = get_tone_guide(request.tone);
    let facts = render_facts(request);
    let call_context = render_call_context(request, context);

    let prompt = fill_template(
        SECTION_PROMPT_TEMPLATE,
        &[
            ("facts_instruction", FACTS_INSTRUCTION),
            ("format_instruction", FORMAT_INSTRUCTION),
            ("tone_label", request.tone.label()),
            ("tone_voice", tone.voice),
            ("preferred_phrases", &tone.preferred_phrases.join(", ")),
            ("avoid_phrases", &tone.avoid_phrases.join(", ")),
            ("facts", &facts),
            ("call_context", &call_context),
            ("section_title", kind.title()),
            ("section_guidance", section_guidance(kind)),
            ("language", request.language()),
        ],
    );

    SectionPrompt {
        system: SECTION_SYSTEM,
        prompt,
    }
}

/// Builds the single-call prompt that asks for every section at once as JSON.
pub fn build_proposal_prompt(request: &ProposalRequest, context: &PromptContext<'_>) -> SectionPrompt {
    let tone = get_tone_guide(request.tone);
    let section_list = SectionKind::ALL
        .iter()
        .map(|k| format!("- {}", k.title()))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = fill_template(
        PROPOSAL_PROMPT_TEMPLATE,
        &[
            ("facts_instruction", FACTS_INSTRUCTION),
            ("format_instruction", FORMAT_INSTRUCTION),
            ("tone_label", request.tone.label()),
            ("tone_voice", tone.voice),
            ("avoid_phrases", &tone.avoid_phrases.join(", ")),
            ("facts", &render_facts(request)),
            ("call_context", &render_call_context(request, context)),
            ("language", request.language()),
            ("section_list", &section_list),
        ],
    );

    SectionPrompt {
        system: PROPOSAL_SYSTEM,
        prompt,
    }
}

/// Builds the insight-extraction prompt, or `None` when there is nothing the
/// session may send (no transcript, or privacy mode on).
pub fn build_insights_prompt(
    request: &ProposalRequest,
    context: &PromptContext<'_>,
) -> Option<SectionPrompt> {
    let excerpt = transcript_excerpt(request, context)?;
    Some(SectionPrompt {
        system: JSON_ONLY_SYSTEM,
        prompt: fill_template(INSIGHTS_PROMPT_TEMPLATE, &[("transcript", &excerpt)]),
    })
}

/// Builds the covering-email prompt from the current proposal.
pub fn build_email_prompt(request: &ProposalRequest, proposal: &Proposal) -> SectionPrompt {
    let summary = proposal.section(SectionKind::ExecutiveSummary).body.trim();
    let summary = if summary.is_empty() {
        "(not written yet)"
    } else {
        summary
    };
    SectionPrompt {
        system: JSON_ONLY_SYSTEM,
        prompt: fill_template(
            EMAIL_PROMPT_TEMPLATE,
            &[
                ("tone_label", request.tone.label()),
                ("facts", &render_facts(request)),
                ("executive_summary", summary),
                ("language", request.language()),
            ],
        ),
    }
}

/// Asks for a corrected copy of a reply that did not parse as JSON.
pub fn build_json_repair_prompt(reply: &str) -> SectionPrompt {
    SectionPrompt {
        system: JSON_ONLY_SYSTEM,
        prompt: fill_template(JSON_REPAIR_PROMPT_TEMPLATE, &[("text", reply.trim())]),
    }
}

/// Builds the editorial audit prompt. The transcript opening is included unless
/// privacy mode is on.
pub fn build_audit_prompt(
    request: &ProposalRequest,
    proposal: &Proposal,
    privacy_mode: bool,
) -> SectionPrompt {
    let call_context = match request.transcript_text() {
        Some(text) if !privacy_mode => {
            let cleaned = clean_transcript(text);
            cleaned.chars().take(AUDIT_TRANSCRIPT_CHARS).collect()
        }
        _ => NO_CALL_CONTEXT.to_string(),
    };
    SectionPrompt {
        system: JSON_ONLY_SYSTEM,
        prompt: fill_template(
            QUALITY_AUDIT_PROMPT_TEMPLATE,
            &[
                ("facts", &render_facts(request)),
                ("call_context", &call_context),
                ("proposal_markdown", &proposal.to_markdown()),
            ],
        ),
    }
}

fn render_facts(request: &ProposalRequest) -> String {
    let mut facts = format!(
        "- Company: {}\n- Client: {}\n- Project: {}\n- Goals: {}\n- Budget: {}\n- Timeline: {}",
        request.company_name.trim(),
        request.client_name.trim(),
        request.project_title.trim(),
        request.goals.trim(),
        request.budget.trim(),
        request.timeline.trim(),
    );
    if let Some(notes) = request
        .additional_notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        facts.push_str(&format!("\n- Additional notes: {notes}"));
    }
    if let Some(logo) = &request.logo {
        facts.push_str(&format!("\n- Brand logo supplied ({})", logo.media_type));
    }
    facts
}

fn render_call_context(request: &ProposalRequest, context: &PromptContext<'_>) -> String {
    let Some(excerpt) = transcript_excerpt(request, context) else {
        return NO_CALL_CONTEXT.to_string();
    };
    let mut out = String::new();
    if let Some(insights) = context.insights.filter(|i| !i.is_empty()) {
        out.push_str("Insights from the call:\n");
        out.push_str(&insights.to_bullets());
        out.push_str("\n\n");
    }
    out.push_str("Transcript excerpt (most recent part of the call):\n");
    out.push_str(&excerpt);
    out
}

/// The cleaned transcript bounded to its most recent characters; `None` in privacy mode.
fn transcript_excerpt(request: &ProposalRequest, context: &PromptContext<'_>) -> Option<String> {
    if context.privacy_mode {
        return None;
    }
    let cleaned = clean_transcript(request.transcript_text()?);
    if cleaned.is_empty() {
        return None;
    }
    Some(keep_last_chars(&cleaned, context.transcript_max_chars).to_string())
}

/// Normalises typographic punctuation to ASCII and drops blank lines.
pub fn clean_transcript(text: &str) -> String {
    let normalized: String = text
        .chars()
        .flat_map(|c| -> Box<dyn Iterator<Item = char>> {
            match c {
                '\u{2018}' | '\u{2019}' => Box::new(std::iter::once('\'')),
                '\u{201C}' | '\u{201D}' => Box::new(std::iter::once('"')),
                '\u{2013}' | '\u{2014}' => Box::new(std::iter::once('-')),
                '\u{2026}' => Box::new("...".chars()),
                other => Box::new(std::iter::once(other)),
            }
        })
        .collect();
    normalized
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns the suffix of `text` holding at most `max_chars` characters.
pub fn keep_last_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

/// Substitutes `{key}` placeholders in one pass. Values are never rescanned, so user
/// text containing braces cannot trigger further substitutions.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (close, *v))
        });
        match replaced {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
