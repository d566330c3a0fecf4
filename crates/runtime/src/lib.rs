//! dbchat runtime: the conversation loop between a chat model and the
//! database tool service.
//!
//! # Overview
//!
//! - **Orchestrator**: runs one request cycle. It asks the model with the tool
//!   catalog attached, executes any requested tools through a
//!   [`ToolInvoker`], then asks the model again for the final answer.
//! - **ModelBackend**: a trait abstracting chat providers. [`DeepSeekBackend`]
//!   talks to an OpenAI-compatible `chat/completions` endpoint.
//! - **Fallback**: canned keyword replies for when the model is unreachable.
//!
//! # Example
//!
//! ```no_run
//! use bridge::{Bridge, ProcessConfig, ServiceConfig};
//! use runtime::{DeepSeekBackend, Message, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = DeepSeekBackend::builder(std::env::var("DEEPSEEK_API_KEY").ok(), "deepseek-chat")
//!     .build()?;
//! let bridge = Bridge::new(ServiceConfig::spawn(
//!     "http://127.0.0.1:3001",
//!     ProcessConfig::new("dbchat-tools").arg("--watch-stdin"),
//! ))?;
//!
//! let orchestrator = Orchestrator::new(backend, bridge.clone());
//! let reply = orchestrator
//!     .handle_request(&[Message::user("Which tables are there?")])
//!     .await;
//! println!("{}", reply.content);
//!
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod fallback;
pub mod model;
mod orchestrator;
pub mod providers;
pub mod tools;

pub use error::{Error, Result};

pub use model::{
    Message, ModelBackend, ModelError, ModelRequest, Phase, Role, ToolCall, ToolChoice,
    ToolResult, ToolSpec,
};

pub use orchestrator::{Exchange, Orchestrator, Route};

pub use providers::{DeepSeekBackend, DeepSeekBackendBuilder};

pub use tools::{ToolInvoker, ToolName, describe_tools};

pub use bridge::ToolOutcome;
