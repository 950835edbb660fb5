// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::models::proposal::SectionKind;

/// System prompt for section writing.
pub const SECTION_SYSTEM: &str = "You are an expert proposal writer for agencies and \
    consultancies. You write one section of a client proposal at a time, in the requested \
    tone and language, grounded strictly in the supplied engagement facts. \
    Respond with the section body only.";

/// Section prompt template.
/// Replace: {facts_instruction}, {format_instruction}, {tone_label}, {tone_voice},
///          {preferred_phrases}, {avoid_phrases}, {facts}, {call_context},
///          {section_title}, {section_guidance}, {language}
pub const SECTION_PROMPT_TEMPLATE: &str = r#"{facts_instruction}

{format_instruction}

TONE: {tone_label}
{tone_voice}
Phrases that fit this tone: {preferred_phrases}
Never use: {avoid_phrases}

ENGAGEMENT FACTS:
{facts}

CALL CONTEXT:
{call_context}

Write the "{section_title}" section of the proposal in {language}.
{section_guidance}"#;

/// System prompt for whole-proposal generation; enforces JSON-only output.
pub const PROPOSAL_SYSTEM: &str = "You are an expert proposal writer. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Whole-proposal prompt template.
/// Replace: {facts_instruction}, {format_instruction}, {tone_label}, {tone_voice},
///          {avoid_phrases}, {facts}, {call_context}, {language}, {section_list}
pub const PROPOSAL_PROMPT_TEMPLATE: &str = r#"{facts_instruction}

{format_instruction}

TONE: {tone_label}
{tone_voice}
Never use: {avoid_phrases}

ENGAGEMENT FACTS:
{facts}

CALL CONTEXT:
{call_context}

Write a complete client proposal in {language}. Return ONLY a JSON object of this shape:
{
  "sections": {
    "<section title>": "<markdown body>"
  }
}

Use EXACTLY these section titles as keys, in this order:
{section_list}"#;

/// Transcript insight extraction prompt. Replace `{transcript}` before sending.
pub const INSIGHTS_PROMPT_TEMPLATE: &str = r#"Extract key insights from the call transcript below.

Return a JSON object with this EXACT schema:
{
  "pain_points": ["..."],
  "commitments": ["..."],
  "timeline_hints": ["..."],
  "budget_cues": ["..."],
  "quotes": ["short verbatim quote"]
}

Keep every item under 25 words. Use empty lists where nothing applies.

TRANSCRIPT:
{transcript}"#;

/// Asks the model to turn its own unparseable reply into valid JSON. Replace `{text}`.
pub const JSON_REPAIR_PROMPT_TEMPLATE: &str = r#"You will be given a possibly malformed JSON string. Fix it to be valid JSON.
Keep every key and value; change only what is needed for the JSON to parse.

INPUT:
{text}"#;

/// Editorial review of a finished proposal.
/// Replace: {facts}, {call_context}, {proposal_markdown}
pub const QUALITY_AUDIT_PROMPT_TEMPLATE: &str = r#"You are a proposal QA expert. Review the proposal below against the engagement facts for clarity, consistency, tone and grammar.

ENGAGEMENT FACTS:
{facts}

CALL CONTEXT:
{call_context}

PROPOSAL (Markdown):
{proposal_markdown}

Return a JSON object with this EXACT schema:
{
  "grade": 0-100,
  "summary": "two or three sentences",
  "suggestions": ["concrete improvement"],
  "apply_notes": ["search text -> replacement text"]
}"#;

/// Follow-up email prompt.
/// Replace: {tone_label}, {facts}, {executive_summary}, {language}
pub const EMAIL_PROMPT_TEMPLATE: &str = r#"Write the covering email that accompanies this proposal, in {language}.

TONE: {tone_label}

ENGAGEMENT FACTS:
{facts}

EXECUTIVE SUMMARY OF THE PROPOSAL:
{executive_summary}

Return a JSON object with this EXACT schema:
{
  "subject": "7-10 word subject line",
  "body": "2-4 short paragraphs",
  "summary": "one-paragraph summary of the proposal",
  "pitch": "one-sentence elevator pitch"
}"#;

/// What each section must cover.
pub fn section_guidance(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::CoverPage => {
            "A short cover: project title, prepared by the company for the client, the date \
            placeholder [date], and a one-line statement of intent. No more than 60 words."
        }
        SectionKind::ExecutiveSummary => {
            "Summarise the client's situation, the proposed approach, the expected outcome \
            tied to the goals, the investment and the timeline. 150-250 words."
        }
        SectionKind::ProblemOpportunity => {
            "Describe the problem the client faces and the opportunity in solving it, using \
            the goals and any call context. Reference pain points where provided."
        }
        SectionKind::ProposedSolution => {
            "Explain the proposed solution and why it fits the client's goals. Name the \
            approach, its main components and how it addresses each goal."
        }
        SectionKind::ScopeOfWork => {
            "List deliverables as bullets, each with a one-line description. State what is \
            explicitly out of scope."
        }
        SectionKind::TimelineMilestones => {
            "Lay out milestones as a Markdown table with columns Milestone and Date (or \
            Week), consistent with the stated timeline."
        }
        SectionKind::PricingPayment => {
            "Present the investment consistent with the stated budget, a breakdown table if \
            useful, and payment terms (schedule, invoicing). Do not invent a different total."
        }
        SectionKind::RoiImpact => {
            "Describe the expected impact and the metrics used to measure it, tied to the \
            goals. Use placeholders for figures that are not provided."
        }
        SectionKind::RisksMitigations => {
            "List the main delivery risks as bullets, each with a mitigation."
        }
        SectionKind::TermsConditions => {
            "Standard terms: validity of the proposal, change requests, intellectual \
            property, confidentiality and termination, in plain language."
        }
        SectionKind::NextSteps => {
            "Clear next steps and a call to action for the client to accept the proposal, \
            with an owner for each step."
        }
        SectionKind::Appendix => {
            "Supporting material: assumptions, glossary of terms used, and any notes from \
            the call that did not fit elsewhere."
        }
    }
}
