use crate::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("the model could not produce a final answer after {executed} tool call(s) ran: {source}")]
    Finalize {
        #[source]
        source: ModelError,
        executed: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
