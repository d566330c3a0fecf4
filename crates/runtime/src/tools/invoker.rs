//! Tool invoker trait.

use bridge::{Bridge, ToolOutcome};
use serde_json::Value;
use std::future::Future;

/// Trait for whatever executes tool calls on the orchestrator's behalf.
///
/// This is the boundary between the conversation loop and side effects.
/// `invoke` never fails: problems come back as error outcomes.
pub trait ToolInvoker: Send + Sync {
    /// Make sure invocations can be served, starting the service if needed.
    fn ensure_ready(&self) -> impl Future<Output = bridge::Result<()>> + Send;

    /// Execute one tool with a JSON object of arguments.
    fn invoke(&self, name: &str, args: Value) -> impl Future<Output = ToolOutcome> + Send;
}

impl ToolInvoker for Bridge {
    async fn ensure_ready(&self) -> bridge::Result<()> {
        Bridge::ensure_ready(self).await
    }

    async fn invoke(&self, name: &str, args: Value) -> ToolOutcome {
        Bridge::invoke(self, name, args).await
    }
}
