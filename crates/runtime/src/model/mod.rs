//! Provider-agnostic model types and the backend trait.

mod errors;
mod types;

pub use errors::{InvalidArguments, ModelError};
pub use types::{
    CallKind, FunctionCall, Message, ModelRequest, Phase, Role, ToolCall, ToolChoice, ToolResult,
    ToolSpec,
};

use std::future::Future;

/// Trait for chat model backends.
///
/// Implementations handle the specifics of one provider's API. A call
/// returns the assistant message of the first choice.
pub trait ModelBackend: Send + Sync {
    fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<Message, ModelError>> + Send;
}
