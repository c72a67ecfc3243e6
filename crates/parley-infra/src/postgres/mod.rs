//! Postgres storage layer: the optional write-only turn log.

pub mod turn_log;

pub use turn_log::{TurnLog, TurnLogWriter};
