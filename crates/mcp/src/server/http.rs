//! Loopback streamable HTTP endpoint for the workflow tools.
//!
//! Tools read arbitrary paths on this host, so the endpoint only ever binds
//! to a loopback address.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::Router;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tuba_api::WorkflowClient;

use crate::server::core::TubaWorkflowMcp;

/// Address used by `--http` without a value: loopback, ephemeral port.
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "127.0.0.1:0";
/// Route the MCP service is mounted on.
pub const MCP_PATH: &str = "/mcp";

/// Parse `bind_address` (default [`DEFAULT_HTTP_BIND_ADDRESS`]) and require a loopback IP.
pub fn resolve_bind_address(bind_address: Option<&str>) -> Result<SocketAddr> {
    let address = bind_address.unwrap_or(DEFAULT_HTTP_BIND_ADDRESS);
    let parsed: SocketAddr = address
        .parse()
        .with_context(|| format!("invalid MCP HTTP bind address '{address}'"))?;
    if !parsed.ip().is_loopback() {
        bail!("MCP HTTP endpoint must bind to a loopback address, got {parsed}");
    }
    Ok(parsed)
}

/// A bound, not yet serving, MCP HTTP listener.
#[derive(Debug)]
pub struct HttpEndpoint {
    listener: TcpListener,
    address: SocketAddr,
}

impl HttpEndpoint {
    /// Bind `address`, which must be loopback. Port `0` picks a free port.
    pub async fn bind(address: SocketAddr) -> Result<Self> {
        if !address.ip().is_loopback() {
            bail!("MCP HTTP endpoint must bind to a loopback address, got {address}");
        }
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind MCP HTTP endpoint on {address}"))?;
        let address = listener.local_addr()?;
        Ok(Self { listener, address })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// URL MCP clients connect to.
    pub fn url(&self) -> String {
        format!("http://{}{MCP_PATH}", self.address)
    }

    /// Serve the tools until `shutdown` resolves, then close every session.
    ///
    /// Each MCP session gets its own handler; all share `client`.
    pub async fn serve<F>(self, client: Arc<WorkflowClient>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let url = self.url();
        let sessions = CancellationToken::new();
        let service: StreamableHttpService<TubaWorkflowMcp, LocalSessionManager> = StreamableHttpService::new(
            move || Ok(TubaWorkflowMcp::new(Arc::clone(&client))),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: None,
                cancellation_token: sessions.child_token(),
                ..Default::default()
            },
        );
        let router = Router::new().nest_service(MCP_PATH, service);

        info!(%url, "serving MCP over streamable HTTP");
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                sessions.cancel();
            })
            .await
            .with_context(|| format!("MCP HTTP endpoint {url} failed"))?;
        info!(%url, "MCP HTTP endpoint stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;
    use tuba_api::WorkflowConfig;

    fn offline_client() -> Arc<WorkflowClient> {
        let config = WorkflowConfig::new("http://localhost:1", None).unwrap();
        Arc::new(WorkflowClient::new(config).unwrap())
    }

    #[test]
    fn default_bind_address_is_ephemeral_loopback() {
        let address = resolve_bind_address(None).unwrap();
        assert!(address.ip().is_loopback());
        assert_eq!(address.port(), 0);
    }

    #[test]
    fn non_loopback_addresses_are_rejected() {
        assert!(resolve_bind_address(Some("0.0.0.0:8080")).is_err());
        assert!(resolve_bind_address(Some("192.168.1.10:8080")).is_err());
        assert!(resolve_bind_address(Some("not-an-address")).is_err());
        assert!(resolve_bind_address(Some("[::1]:9000")).is_ok());
    }

    #[tokio::test]
    async fn bind_refuses_public_interfaces() {
        let public: SocketAddr = "0.0.0.0:0".parse().unwrap();
        assert!(HttpEndpoint::bind(public).await.is_err());
    }

    #[tokio::test]
    async fn serves_initialize_and_stops_on_shutdown() {
        let endpoint = HttpEndpoint::bind(resolve_bind_address(None).unwrap()).await.unwrap();
        assert_ne!(endpoint.local_addr().port(), 0);
        let url = endpoint.url();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(endpoint.serve(offline_client(), async move {
            let _ = stopped.await;
        }));

        let response = reqwest::Client::new()
            .post(&url)
            .header("Accept", "application/json, text/event-stream")
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": {"name": "endpoint-test", "version": "0.0.0"}
                }
            }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(response.headers().contains_key("mcp-session-id"));
        drop(response);

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
