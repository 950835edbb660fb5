//! Quality Checker: a deterministic, read-only grade for a proposal.
//!
//! Three components, each in 0.0 – 1.0:
//! - length:   mean over sections of min(chars / min_section_chars, 1)
//! - coverage: fraction of key terms (company, client, goal keywords) found in some section
//! - tone:     fraction of sections that are non-empty and free of forbidden phrases
//!
//! grade = round(100 × weighted mean). Every component only ever looks at text that is
//! present, so emptying a section can never raise the grade.

pub mod audit;

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::generation::tone::forbidden_phrases;
use crate::models::proposal::{Proposal, SectionKind};

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityComponents {
    pub length: f64,
    pub coverage: f64,
    pub tone: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionIssue {
    Empty,
    Short,
    OffTone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFlag {
    pub section: SectionKind,
    pub issue: SectionIssue,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub grade: u32, // 0 – 100
    pub threshold: u32,
    pub passed: bool,
    pub components: QualityComponents,
    /// Key terms that appear in no section.
    pub missing_terms: Vec<String>,
    pub suggestions: Vec<String>,
    pub section_flags: Vec<SectionFlag>,
    /// Contradictions worth confirming with the user before sending.
    pub sanity_flags: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Scoring
// ────────────────────────────────────────────────────────────────────────────

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "and", "been", "before", "being", "both", "each", "for", "from",
    "have", "into", "more", "most", "other", "over", "our", "should", "some", "such", "than",
    "that", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "very", "want", "were", "what", "when", "which", "while", "will", "with", "would", "your",
];

/// Scores a proposal. Pure: the same proposal and config always give the same report.
pub fn score(proposal: &Proposal, config: &QualityConfig) -> QualityReport {
    let forbidden = forbidden_phrases(proposal.meta.tone, &config.extra_forbidden_phrases);
    let lowered: Vec<String> = proposal
        .sections
        .iter()
        .map(|s| s.body.to_lowercase())
        .collect();

    let mut section_flags = Vec::new();
    let mut length_sum = 0.0;
    let mut on_tone = 0usize;

    for (section, text) in proposal.sections.iter().zip(&lowered) {
        let chars = section.body.trim().chars().count();
        length_sum += (chars as f64 / config.min_section_chars as f64).min(1.0);

        if chars == 0 {
            section_flags.push(SectionFlag {
                section: section.kind,
                issue: SectionIssue::Empty,
                detail: "section has no content".to_string(),
            });
            continue;
        }
        if chars < config.min_section_chars {
            section_flags.push(SectionFlag {
                section: section.kind,
                issue: SectionIssue::Short,
                detail: format!("{chars} of {} recommended characters", config.min_section_chars),
            });
        }
        let hits: Vec<&str> = forbidden
            .iter()
            .filter(|p| contains_phrase(text, p))
            .map(String::as_str)
            .collect();
        if hits.is_empty() {
            on_tone += 1;
        } else {
            section_flags.push(SectionFlag {
                section: section.kind,
                issue: SectionIssue::OffTone,
                detail: format!("uses {}", quoted_list(&hits)),
            });
        }
    }

    let count = proposal.sections.len() as f64;
    let terms = key_terms(proposal, config.max_goal_keywords);
    let missing_terms: Vec<String> = terms
        .iter()
        .filter(|term| !lowered.iter().any(|text| text.contains(term.as_str())))
        .cloned()
        .collect();
    let coverage = if terms.is_empty() {
        1.0
    } else {
        (terms.len() - missing_terms.len()) as f64 / terms.len() as f64
    };

    let components = QualityComponents {
        length: length_sum / count,
        coverage,
        tone: on_tone as f64 / count,
    };

    let w = &config.weights;
    let total_weight = w.length + w.coverage + w.tone;
    let weighted = if total_weight > 0.0 {
        (w.length * components.length + w.coverage * components.coverage + w.tone * components.tone)
            / total_weight
    } else {
        0.0
    };
    let grade = (weighted * 100.0).round().clamp(0.0, 100.0) as u32;
    let passed = grade >= config.pass_threshold;

    let mut suggestions = suggestions_for(&section_flags, &missing_terms);
    if !passed && suggestions.is_empty() {
        suggestions.push("Review each section for clarity and specific, client-facing detail.".to_string());
    }

    QualityReport {
        grade,
        threshold: config.pass_threshold,
        passed,
        components,
        missing_terms,
        suggestions,
        section_flags,
        sanity_flags: sanity_check(proposal),
    }
}

/// Company, client and up to `max_goal_keywords` distinctive words from the goals,
/// lowercased and deduplicated in first-seen order.
fn key_terms(proposal: &Proposal, max_goal_keywords: usize) -> Vec<String> {
    let meta = &proposal.meta;
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: String| {
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    };
    push(meta.company_name.trim().to_lowercase());
    push(meta.client_name.trim().to_lowercase());

    meta.goals
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| w.chars().count() >= 4 && !STOP_WORDS.contains(&w.as_str()))
        .fold(Vec::<String>::new(), |mut acc, w| {
            if !acc.contains(&w) {
                acc.push(w);
            }
            acc
        })
        .into_iter()
        .take(max_goal_keywords)
        .for_each(push);
    terms
}

/// Contradictions between the inputs and the generated pricing.
fn sanity_check(proposal: &Proposal) -> Vec<String> {
    let mut flags = Vec::new();
    let budget = proposal.meta.budget.trim();
    let pricing = proposal.section(SectionKind::PricingPayment);
    let pricing_text = pricing.body.to_lowercase();

    if !budget.is_empty() && contains_phrase(&pricing_text, "free") {
        flags.push("Pricing mentions 'free' while a budget is specified.".to_string());
    }
    if !budget.is_empty()
        && !pricing_text.trim().is_empty()
        && !pricing_text.contains(&budget.to_lowercase())
    {
        flags.push(format!(
            "The stated budget ({budget}) does not appear in '{}'.",
            pricing.title
        ));
    }
    flags
}

fn suggestions_for(flags: &[SectionFlag], missing_terms: &[String]) -> Vec<String> {
    let mut suggestions: Vec<String> = flags
        .iter()
        .map(|flag| {
            let title = flag.section.title();
            match flag.issue {
                SectionIssue::Empty => format!("Write or regenerate the '{title}' section."),
                SectionIssue::Short => format!("Expand '{title}' ({}).", flag.detail),
                SectionIssue::OffTone => format!("Rephrase '{title}': it {}.", flag.detail),
            }
        })
        .collect();
    if !missing_terms.is_empty() {
        suggestions.push(format!(
            "Mention {} somewhere in the proposal.",
            quoted_list(&missing_terms.iter().map(String::as_str).collect::<Vec<_>>())
        ));
    }
    suggestions
}

/// Case-sensitive phrase search on already-lowercased text. Phrases that start or end with
/// a letter or digit must sit on word boundaries, so "hey" does not match "they".
fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let bounded_start = phrase.chars().next().is_some_and(char::is_alphanumeric);
    let bounded_end = phrase.chars().next_back().is_some_and(char::is_alphanumeric);
    text.match_indices(phrase).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = !bounded_start
            || text[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = !bounded_end
            || text[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

fn quoted_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|i| format!("'{i}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
