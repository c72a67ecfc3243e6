//! LLM provider abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: the backend handle the relay holds

pub mod box_provider;
pub mod provider;
