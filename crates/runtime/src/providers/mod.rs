//! Model provider adapters.
//!
//! Each provider implements [`ModelBackend`](crate::model::ModelBackend) for
//! its specific API.

mod deepseek;

pub use deepseek::{
    API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL, DeepSeekBackend, DeepSeekBackendBuilder,
};
