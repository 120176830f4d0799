//! Local AI extraction: a thin HTTP client for an Ollama-compatible
//! endpoint, a prompt/parse layer that turns one email into a structured
//! extraction, and a per-run circuit breaker that stops hammering a dead
//! model server.

pub mod breaker;
pub mod extractor;
pub mod generator;

pub use breaker::{AiCircuitBreaker, BreakerState};
pub use extractor::{ExtractError, Extraction, Extractor};
pub use generator::{GenerateError, OllamaGenerator, TextGenerator};
