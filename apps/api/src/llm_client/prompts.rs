// Shared prompt fragments.
// Each module that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to every content prompt to keep output tied to the inputs.
pub const FACTS_INSTRUCTION: &str = "\
    CRITICAL: Use only the facts provided below (company, client, project, goals, budget, \
    timeline, notes and call context). Do NOT invent client names, prices, dates or \
    statistics. Where a detail is unknown, write a short placeholder in square brackets \
    such as [confirm start date] instead of guessing.";

/// Instruction keeping section output clean for assembly into one document.
pub const FORMAT_INSTRUCTION: &str = "\
    Write in Markdown. Do NOT repeat the section title as a heading. \
    Use short paragraphs, bullet lists and tables where they help. \
    Do NOT add closing remarks about being an AI or offers to revise.";
