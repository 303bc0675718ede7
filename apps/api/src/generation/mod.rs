// Pitch generation: six-section records, tolerant extraction, retrying orchestration.
// All LLM calls go through llm_client — no direct HTTP calls here.

pub mod cache;
pub mod extractor;
pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod record;
