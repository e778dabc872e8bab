//! Model Context Protocol (MCP) server for the Tuba workflow builder.
//!
//! The server exposes five tools (`run`, `status`, `result`,
//! `get_workflow_blocks`, `update_workflow_blocks_data`) backed by a shared
//! [`tuba_api::WorkflowClient`]. It can be hosted over stdio for desktop
//! assistants or over a loopback streamable HTTP endpoint.

pub mod server;

pub use server::{DEFAULT_HTTP_BIND_ADDRESS, HttpEndpoint, TubaWorkflowMcp, UpdateWorkflowBlocksRequest, resolve_bind_address, serve_stdio};
