//! HTTP layer for Parley.
//!
//! The `/ws` voice channel, a small REST API at `/api/v1/` with the envelope
//! response format, and `/health`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
