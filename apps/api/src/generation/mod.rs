// Artifact generation: per-type generators, the single-flight table and the
// cache manager that ties them to the artifact store and the credit ledger.
// All LLM calls go through llm_client; generators never call a provider directly.

pub mod answer_evaluator;
pub mod cache_manager;
pub mod cover_letter;
pub mod generator;
pub mod handlers;
pub mod interview_prep;
pub mod prompts;
pub mod resume_optimizer;
pub mod session_aggregator;
pub mod single_flight;
pub mod store;
