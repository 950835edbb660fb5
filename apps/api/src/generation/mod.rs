// Proposal Generation Engine
// Implements: input validation, prompt building, tone calibration, section generation,
// transcript insights and the covering email.
// All LLM calls go through llm_client; no direct Anthropic calls here.

pub mod email;
pub mod generator;
pub mod handlers;
pub mod insights;
pub mod prompt_builder;
pub mod prompts;
pub mod tone;
pub mod validation;
