// Shared prompt constants and prompt-building utilities.
// Each generator defines its own prompts in generation/prompts.rs.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that asks for numeric scores.
pub const SCORE_RANGE_INSTRUCTION: &str = "\
    All scores are integers from 0 to 100 inclusive. \
    Never return a score outside this range, a fraction, or a string.";

/// Builds a system prompt from a persona line plus the JSON-only rule.
pub fn json_system(persona: &str) -> String {
    format!("{persona} {JSON_ONLY_SYSTEM}")
}
