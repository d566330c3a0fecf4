use thiserror::Error;

/// Errors from model provider calls.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing API credential: set {0}")]
    MissingCredential(String),
    #[error("network: {0}")]
    Network(String),
    #[error("provider api: {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Tool call arguments that do not decode to a JSON object.
#[derive(Debug, Clone, Error)]
#[error("invalid tool arguments: {0}")]
pub struct InvalidArguments(pub String);
