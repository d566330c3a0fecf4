//! Bridge error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the tool service bridge.
///
/// Cloneable so that every caller waiting on one startup attempt can receive
/// the same failure.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid bridge configuration: {0}")]
    Config(String),

    #[error("failed to spawn tool service: {0}")]
    Spawn(String),

    #[error("tool service did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("tool service exited before becoming ready ({0})")]
    ExitedEarly(String),

    #[error("tool service is not ready")]
    NotReady,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("tool service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
