use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;
use tracing::info;
use tuba_api::WorkflowClient;

use crate::server::core::TubaWorkflowMcp;

/// Serve the workflow tools over stdin/stdout until the peer disconnects.
///
/// Stdout carries protocol frames only; logging must go to stderr.
pub async fn serve_stdio(client: Arc<WorkflowClient>) -> Result<()> {
    info!("serving MCP over stdio");
    let service = TubaWorkflowMcp::new(client).serve(rmcp::transport::stdio()).await?;
    let reason = service.waiting().await?;
    info!(?reason, "MCP stdio session closed");
    Ok(())
}
