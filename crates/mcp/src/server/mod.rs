mod core;
mod errors;
mod http;
mod schemas;
mod stdio;

pub use core::TubaWorkflowMcp;
pub use http::{DEFAULT_HTTP_BIND_ADDRESS, HttpEndpoint, resolve_bind_address};
pub use schemas::UpdateWorkflowBlocksRequest;
pub use stdio::serve_stdio;
