//! Turn orchestration and port definitions for Parley.
//!
//! This crate defines the "ports" (`LlmProvider`, `SessionStore`) that the
//! infrastructure layer implements, plus the pure conversation logic: the
//! sliding history window, sentence chunking, reply parsing, the prompt
//! catalog and the turn relay that ties them together. It depends only on
//! `parley-types` -- never on `parley-infra` or any network/database crate.

pub mod chat;
pub mod llm;
pub mod prompt;
