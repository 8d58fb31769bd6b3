/// MCP protocol implementation
///
/// JSON-RPC parsing and tool routing for the habit-sync server.

pub mod protocol;
pub mod server;

pub use server::{tool_definitions, McpServer};
