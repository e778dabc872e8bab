use crate::server::errors::tool_outcome;
use crate::server::schemas::UpdateWorkflowBlocksRequest;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ErrorData, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tuba_api::{ApiError, WorkflowClient};

const SERVER_INSTRUCTIONS: &str = "Tools for the Tuba workflow builder.\n\
FLOW:\n\
1) get_workflow_blocks to read block ids and parameters.\n\
2) update_workflow_blocks_data to change parameters and attach files.\n\
3) run to start the workflow, status to poll it, result to fetch outputs.\n\
FILES:\n\
- File field names use <block_id>_<param_name>.\n\
- files: local paths on the server host; file_urls: downloaded before upload; file_blobs: inline base64.\n\
- A single value or a list is accepted for every field.\n\
ERRORS:\n\
- {\"error\": \"Authentication required\"} means TUBA_WORKFLOW_ACCESS_TOKEN is not configured.";

/// MCP tool handler for the Tuba workflow builder.
#[derive(Clone)]
pub struct TubaWorkflowMcp {
    tool_router: ToolRouter<Self>,
    client: Arc<WorkflowClient>,
}

#[tool_router]
impl TubaWorkflowMcp {
    /// Create a handler issuing requests through `client`.
    pub fn new(client: Arc<WorkflowClient>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            client,
        }
    }

    #[tool(annotations(open_world_hint = true), description = "Run the workflow for a given project")]
    async fn run(&self) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let outcome = self.client.run().await;
        log_outcome("run", start, &outcome);
        tool_outcome(outcome)
    }

    #[tool(annotations(read_only_hint = true), description = "Get the current workflow status")]
    async fn status(&self) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let outcome = self.client.status().await;
        log_outcome("status", start, &outcome);
        tool_outcome(outcome)
    }

    #[tool(
        annotations(open_world_hint = true),
        description = "Fetch workflow results. Zip archives are saved as result.zip in the server's result directory."
    )]
    async fn result(&self) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let outcome = self.client.result().await.map(|result| result.into_value());
        log_outcome("result", start, &outcome);
        tool_outcome(outcome)
    }

    #[tool(annotations(read_only_hint = true), description = "Get workflow blocks configuration")]
    async fn get_workflow_blocks(&self) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let outcome = self.client.workflow_blocks().await;
        log_outcome("get_workflow_blocks", start, &outcome);
        tool_outcome(outcome)
    }

    #[tool(
        annotations(open_world_hint = true),
        description = "Update workflow blocks data. The workflow_blocks parameter is a JSON object that contains the workflow block data in this format: {<block_id>: {<param_name>: <value>}}. The files parameter is a mapping of the file field name to the file path. The file field name should be in the format <block_id>_<param_name>:file_path/file_url/file_blob."
    )]
    async fn update_workflow_blocks_data(&self, param: Parameters<UpdateWorkflowBlocksRequest>) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        let (workflow_blocks, sources) = param.0.into_parts();
        info!(
            blocks = workflow_blocks.len(),
            file_items = sources.item_count(),
            "updating workflow blocks"
        );
        let outcome = self.client.update_workflow_blocks_data(&workflow_blocks, sources).await;
        log_outcome("update_workflow_blocks_data", start, &outcome);
        tool_outcome(outcome)
    }
}

#[tool_handler]
impl ServerHandler for TubaWorkflowMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "TubaWorkflow".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Tuba Workflow MCP".to_string()),
                ..Default::default()
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }
}

fn log_outcome(tool_name: &str, start: Instant, outcome: &Result<Value, ApiError>) {
    let duration_ms = start.elapsed().as_millis();
    match outcome {
        Ok(_) => info!(tool = tool_name, duration_ms, "tool call completed"),
        Err(error) => warn!(tool = tool_name, duration_ms, error_code = error.code(), error = %error, "tool call failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tuba_api::WorkflowConfig;
    use wiremock::matchers::{any, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_for(mock: &MockServer, token: Option<&str>, result_dir: &std::path::Path) -> TubaWorkflowMcp {
        let config = WorkflowConfig::new(mock.uri(), token.map(str::to_string))
            .unwrap()
            .with_result_dir(result_dir);
        TubaWorkflowMcp::new(Arc::new(WorkflowClient::new(config).unwrap()))
    }

    fn update_request(arguments: Value) -> Parameters<UpdateWorkflowBlocksRequest> {
        Parameters(serde_json::from_value(arguments).unwrap())
    }

    #[test]
    fn registers_every_tool() {
        let names: Vec<String> = TubaWorkflowMcp::tool_router()
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for expected in ["run", "status", "result", "get_workflow_blocks", "update_workflow_blocks_data"] {
            assert!(names.iter().any(|name| name == expected), "missing tool {expected}");
        }
    }

    #[tokio::test]
    async fn every_tool_requires_authentication() {
        let mock = MockServer::start().await;
        Mock::given(any()).respond_with(ResponseTemplate::new(200)).expect(0).mount(&mock).await;
        let directory = tempfile::tempdir().unwrap();
        let server = server_for(&mock, None, directory.path());
        let expected = Some(json!({"error": "Authentication required"}));

        assert_eq!(server.run().await.unwrap().structured_content, expected);
        assert_eq!(server.status().await.unwrap().structured_content, expected);
        assert_eq!(server.result().await.unwrap().structured_content, expected);
        assert_eq!(server.get_workflow_blocks().await.unwrap().structured_content, expected);
        let update = server
            .update_workflow_blocks_data(update_request(json!({"files": {"b1_doc": "/does/not/matter"}})))
            .await
            .unwrap();
        assert_eq!(update.structured_content, expected);
    }

    #[tokio::test]
    async fn status_returns_the_decoded_body() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "running"})))
            .mount(&mock)
            .await;
        let directory = tempfile::tempdir().unwrap();

        let result = server_for(&mock, Some("token"), directory.path()).status().await.unwrap();
        assert_eq!(result.structured_content, Some(json!({"state": "running"})));
    }

    #[tokio::test]
    async fn failed_requests_are_reported_not_raised() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock)
            .await;
        let directory = tempfile::tempdir().unwrap();

        let result = server_for(&mock, Some("token"), directory.path()).run().await.unwrap();
        let structured = result.structured_content.unwrap();
        assert!(structured["error"].as_str().unwrap().starts_with("Request failed: "));
    }

    #[tokio::test]
    async fn zip_result_is_saved_and_confirmed() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/result"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"PK\x03\x04archive".to_vec(), "application/zip"))
            .mount(&mock)
            .await;
        let directory = tempfile::tempdir().unwrap();

        let result = server_for(&mock, Some("token"), directory.path()).result().await.unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["status"], "success");
        assert_eq!(std::fs::read(directory.path().join("result.zip")).unwrap(), b"PK\x03\x04archive");
    }

    #[tokio::test]
    async fn update_merges_every_source() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/remote.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("remote-body"))
            .mount(&mock)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/update-workflow-blocks-data"))
            .and(body_string_contains("local-body"))
            .and(body_string_contains("remote-body"))
            .and(body_string_contains("blob-body"))
            .and(body_string_contains("filename=\"remote.txt\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&mock)
            .await;
        let directory = tempfile::tempdir().unwrap();
        let local = directory.path().join("local.txt");
        std::fs::File::create(&local).unwrap().write_all(b"local-body").unwrap();

        let server = server_for(&mock, Some("token"), directory.path());
        let result = server
            .update_workflow_blocks_data(update_request(json!({
                "workflow_blocks": {"b1": {"mode": "fast"}},
                "files": {"b1_input": local.to_string_lossy()},
                "file_urls": format!("{{\"b1_input\": [\"{}/files/remote.txt\"]}}", mock.uri()),
                "file_blobs": {"b1_extra": {"filename": "blob.txt", "content_base64": "YmxvYi1ib2R5"}}
            })))
            .await
            .unwrap();

        assert_eq!(result.structured_content, Some(json!({"ok": true})));
        std::fs::remove_file(&local).unwrap();
    }

    #[tokio::test]
    async fn missing_local_file_is_rejected_before_sending() {
        let mock = MockServer::start().await;
        Mock::given(method("PATCH")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&mock).await;
        let directory = tempfile::tempdir().unwrap();
        let missing = directory.path().join("absent.bin");

        let error = server_for(&mock, Some("token"), directory.path())
            .update_workflow_blocks_data(update_request(json!({"files": {"b1_input": missing.to_string_lossy()}})))
            .await
            .unwrap_err();

        assert_eq!(error.data.unwrap()["error_code"], "FILE_ACCESS_ERROR");
    }

    #[test]
    fn server_info_advertises_tools() {
        let mock_client = WorkflowClient::new(WorkflowConfig::new("http://localhost:1", None).unwrap()).unwrap();
        let info = TubaWorkflowMcp::new(Arc::new(mock_client)).get_info();
        assert_eq!(info.server_info.name, "TubaWorkflow");
        assert!(info.capabilities.tools.is_some());
    }
}
