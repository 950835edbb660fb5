//! Tone calibration: maps the requested brand tone to voice guidance and phrase lists.
//!
//! The avoid lists feed both the prompts (as instructions) and the quality checker
//! (as tone-consistency signals), so a phrase banned here is also penalised there.

use crate::models::proposal::Tone;

/// Voice guidance calibrated to a specific tone.
#[derive(Debug, Clone)]
pub struct ToneGuide {
    pub voice: &'static str,
    pub preferred_phrases: Vec<&'static str>,
    pub avoid_phrases: Vec<&'static str>,
}

/// Stock phrases that read as filler in any tone.
pub const STOCK_PHRASES: &[&str] = &[
    "as an ai language model",
    "lorem ipsum",
    "[insert",
    "best-in-class",
    "world-class",
    "cutting-edge",
    "synergy",
    "synergies",
    "paradigm shift",
    "think outside the box",
    "at the end of the day",
    "low-hanging fruit",
    "we are thrilled to announce",
];

/// Returns tone-calibrated guidance for the requested tone.
pub fn get_tone_guide(tone: Tone) -> ToneGuide {
    match tone {
        Tone::Formal => ToneGuide {
            voice: "Formal and precise. Third person for the company, complete sentences, \
                no contractions, no exclamation marks.",
            preferred_phrases: vec!["we propose", "the engagement", "deliverables", "in accordance with"],
            avoid_phrases: vec!["awesome", "super excited", "hey", "gonna", "!"],
        },
        Tone::Friendly => ToneGuide {
            voice: "Warm and approachable. Second person, plain words, short sentences.",
            preferred_phrases: vec!["together", "you'll", "we'll help", "happy to"],
            avoid_phrases: vec!["heretofore", "pursuant to", "the undersigned", "aforementioned"],
        },
        Tone::FounderStyle => ToneGuide {
            voice: "Direct, first person, candid about trade-offs, written as the founder \
                speaking to a peer.",
            preferred_phrases: vec!["I", "here's the plan", "what we'll ship", "honestly"],
            avoid_phrases: vec!["pursuant to", "the undersigned", "esteemed client", "leverage"],
        },
        Tone::Professional => ToneGuide {
            voice: "Professional and confident. Clear structure, active voice, concrete outcomes.",
            preferred_phrases: vec!["we will deliver", "outcomes", "milestones", "accountable"],
            avoid_phrases: vec!["awesome", "gonna", "super excited", "no worries"],
        },
        Tone::Warm => ToneGuide {
            voice: "Warm and reassuring. Acknowledge the client's situation before proposing.",
            preferred_phrases: vec!["we understand", "alongside your team", "care", "support"],
            avoid_phrases: vec!["pursuant to", "non-negotiable", "the undersigned"],
        },
        Tone::Bold => ToneGuide {
            voice: "Bold and energetic. Lead with the outcome, strong verbs, short punchy lines.",
            preferred_phrases: vec!["we'll deliver", "ship", "win", "fast"],
            avoid_phrases: vec!["perhaps", "we might", "hopefully", "try to"],
        },
        Tone::Concise => ToneGuide {
            voice: "Concise. Every sentence earns its place; prefer bullets over paragraphs.",
            preferred_phrases: vec!["in short", "scope", "cost", "dates"],
            avoid_phrases: vec!["in order to", "it is important to note that", "needless to say"],
        },
    }
}

/// Every phrase the quality checker treats as off-tone for `tone`, lowercased.
pub fn forbidden_phrases(tone: Tone, extra: &[String]) -> Vec<String> {
    let guide = get_tone_guide(tone);
    let mut phrases: Vec<String> = STOCK_PHRASES
        .iter()
        .chain(guide.avoid_phrases.iter())
        // "!" is enforced through the prompt only; it is too noisy as a text signal.
        .filter(|p| p.chars().any(char::is_alphanumeric))
        .map(|p| p.to_lowercase())
        .chain(extra.iter().map(|p| p.to_lowercase()))
        .collect();
    phrases.sort();
    phrases.dedup();
    phrases
}
