use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("database is closed")]
    Closed,

    #[error("database lock poisoned")]
    Poisoned,

    #[error("worker task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Body returned to the caller when a tool fails.
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => json!({
                "success": false,
                "error": self.to_string(),
                "code": format!("{:?}", err.code),
            }),
            _ => json!({ "success": false, "error": self.to_string() }),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
