//! Tool catalog and the seam to the tool execution bridge.

mod catalog;
mod invoker;

pub use catalog::{ToolName, UnknownTool, describe_tools};
pub use invoker::ToolInvoker;
