//! MCP server exposing introspection sessions as tools.

pub mod session;
pub mod tools;
pub mod types;

pub use tools::VmiServer;
