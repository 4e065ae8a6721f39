//! Tool server layer: process transports, connections, catalog, manager.

pub mod catalog;
pub mod connection;
pub mod errors;
pub mod manager;
pub mod transport;
pub mod types;

pub use catalog::{Tool, ToolCatalog};
pub use connection::{ConnectionState, ToolServerConnection, DEFAULT_CALL_TIMEOUT};
pub use errors::McpError;
pub use manager::{ConnectSummary, ToolDispatcher, ToolServerManager};
pub use types::{ServerDescriptor, ToolOutcome};
