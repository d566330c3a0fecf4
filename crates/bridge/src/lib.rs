//! Tool execution bridge.
//!
//! This crate owns the lifecycle of the tool execution service (a separate
//! process answering `POST /tools/{name}`) and dispatches tool invocations to
//! it over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use bridge::{Bridge, ProcessConfig, ServiceConfig};
//! use serde_json::json;
//!
//! # async fn example() -> bridge::Result<()> {
//! let process = ProcessConfig::new("dbchat-tools")
//!     .arg("--port")
//!     .arg("3001")
//!     .arg("--watch-stdin");
//! let bridge = Bridge::new(ServiceConfig::spawn("http://127.0.0.1:3001", process))?;
//!
//! bridge.ensure_ready().await?;
//! let outcome = bridge.invoke("get_tables", json!({})).await;
//! println!("{}", outcome.to_content());
//!
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod outcome;
mod service;

pub use error::{Error, Result};
pub use outcome::ToolOutcome;
pub use service::{
    Bridge, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SHUTDOWN_GRACE,
    DEFAULT_STARTUP_TIMEOUT, Launch, ProcessConfig, ServiceConfig, Status,
};
