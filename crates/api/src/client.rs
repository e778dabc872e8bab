//! HTTP client for the Tuba workflow builder API.

use std::path::{Path, PathBuf};
use std::time::Instant;

use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use tuba_types::{FileSources, WorkflowBlocks};

use crate::config::WorkflowConfig;
use crate::error::{ApiError, ApiResult};
use crate::payload::{AssembledPayload, HandleLedger, PayloadAssembler, WORKFLOW_BLOCKS_FIELD};

pub const RUN_PATH: &str = "/run";
pub const STATUS_PATH: &str = "/status";
pub const RESULT_PATH: &str = "/result";
pub const WORKFLOW_BLOCKS_PATH: &str = "/get-workflow-blocks";
pub const UPDATE_WORKFLOW_BLOCKS_PATH: &str = "/update-workflow-blocks-data";

/// File name the result archive is saved under.
pub const RESULT_ARCHIVE_NAME: &str = "result.zip";
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Outcome of fetching workflow results.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowResult {
    /// Decoded JSON response body.
    Json(Value),
    /// Zip archive written to disk.
    Archive { path: PathBuf, bytes: usize },
}

impl WorkflowResult {
    /// JSON shape returned to tool callers.
    pub fn into_value(self) -> Value {
        match self {
            WorkflowResult::Json(value) => value,
            WorkflowResult::Archive { path, bytes } => {
                let in_working_directory = path.parent().is_none_or(|parent| parent.as_os_str().is_empty() || parent == Path::new("."));
                let message = if in_working_directory {
                    format!("{RESULT_ARCHIVE_NAME} has been saved to the current directory.")
                } else {
                    format!("{RESULT_ARCHIVE_NAME} has been saved to {}.", path.display())
                };
                json!({
                    "status": "success",
                    "message": message,
                    "path": path.display().to_string(),
                    "bytes": bytes,
                })
            }
        }
    }
}

/// Thin wrapper around a `reqwest::Client` bound to one [`WorkflowConfig`].
///
/// The bearer credential is attached per request rather than as a default
/// header, so the same pooled client can fetch third-party upload sources
/// without leaking it.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    config: WorkflowConfig,
    http: Client,
    user_agent: String,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig) -> ApiResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json, application/zip"));
        let http = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|error| ApiError::InvalidConfig {
                message: format!("build http client: {error}"),
            })?;

        Ok(Self {
            config,
            http,
            user_agent: format!("tuba-workflow/{}; {}", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Trigger a workflow run.
    pub async fn run(&self) -> ApiResult<Value> {
        self.call_json(Method::POST, RUN_PATH).await
    }

    /// Current workflow status.
    pub async fn status(&self) -> ApiResult<Value> {
        self.call_json(Method::GET, STATUS_PATH).await
    }

    /// Current block configuration.
    pub async fn workflow_blocks(&self) -> ApiResult<Value> {
        self.call_json(Method::GET, WORKFLOW_BLOCKS_PATH).await
    }

    /// Fetch workflow results.
    ///
    /// A response declared as `application/zip` is written verbatim to
    /// `result.zip` in the configured result directory, replacing any existing
    /// file; any other response is decoded as JSON.
    pub async fn result(&self) -> ApiResult<WorkflowResult> {
        let response = self.send_checked(Method::GET, RESULT_PATH).await?;

        if is_zip_response(&response) {
            let body = response.bytes().await.map_err(ApiError::request_failed)?;
            let path = self.config.result_dir().join(RESULT_ARCHIVE_NAME);
            tokio::fs::write(&path, &body).await.map_err(|source| ApiError::ResultWrite {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), bytes = body.len(), "saved workflow result archive");
            return Ok(WorkflowResult::Archive { path, bytes: body.len() });
        }

        response.json::<Value>().await.map(WorkflowResult::Json).map_err(ApiError::request_failed)
    }

    /// Update block parameters and attach files from every source.
    ///
    /// The credential is checked before any file is opened or fetched. Any
    /// assembly failure aborts the call before the update request is sent.
    pub async fn update_workflow_blocks_data(&self, workflow_blocks: &WorkflowBlocks, sources: FileSources) -> ApiResult<Value> {
        self.require_token()?;
        let payload = self.assembler().assemble(sources).await?;
        self.send_update(workflow_blocks, payload).await
    }

    /// Assembler sharing this client's connection pool, without the bearer credential.
    pub fn assembler(&self) -> PayloadAssembler<'_> {
        PayloadAssembler::new(&self.http)
    }

    /// Send an already assembled update payload.
    ///
    /// The payload is consumed; its file handles are closed once the request
    /// completes or fails. A response body that is not JSON is returned as
    /// `{"status_code", "text"}`.
    pub async fn send_update(&self, workflow_blocks: &WorkflowBlocks, payload: AssembledPayload) -> ApiResult<Value> {
        let token = match self.require_token() {
            Ok(token) => token,
            Err(error) => {
                payload.release();
                return Err(error);
            }
        };
        let ledger: HandleLedger = payload.ledger().clone();
        let workflow_blocks_text = serde_json::to_string(workflow_blocks).map_err(ApiError::request_failed)?;
        let part_count = payload.len();

        let request = self.request(Method::PATCH, UPDATE_WORKFLOW_BLOCKS_PATH, token);
        let request = if payload.is_empty() {
            payload.release();
            request.form(&[(WORKFLOW_BLOCKS_FIELD, workflow_blocks_text)])
        } else {
            request.multipart(payload.into_form(workflow_blocks_text)?)
        };

        let start = Instant::now();
        let sent = request.send().await;
        debug!(open_handles = ledger.open_handles(), "update request finished; upload handles released");
        let response = sent.map_err(|error| {
            warn!(error = %error, duration_ms = start.elapsed().as_millis(), "update request failed");
            ApiError::request_failed(error)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::request_failed)?;
        info!(
            status = %status,
            parts = part_count,
            duration_ms = start.elapsed().as_millis(),
            "workflow blocks update completed"
        );
        Ok(serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
            json!({
                "status_code": status.as_u16(),
                "text": text,
            })
        }))
    }

    async fn call_json(&self, method: Method, path: &str) -> ApiResult<Value> {
        let response = self.send_checked(method, path).await?;
        response.json::<Value>().await.map_err(|error| {
            warn!(path = %path, error = %error, "response JSON decode failed");
            ApiError::request_failed(error)
        })
    }

    /// Send an authenticated request and reject transport failures and error statuses.
    async fn send_checked(&self, method: Method, path: &str) -> ApiResult<Response> {
        let token = self.require_token()?;
        let start = Instant::now();
        let response = self
            .request(method.clone(), path, token)
            .send()
            .await
            .map_err(|error| {
                warn!(method = %method, path = %path, error = %error, "http request failed");
                ApiError::request_failed(error)
            })?;

        let status = response.status();
        let response = response.error_for_status().map_err(|error| {
            warn!(
                method = %method,
                path = %path,
                status = %status,
                duration_ms = start.elapsed().as_millis(),
                "http request returned an error status"
            );
            ApiError::request_failed(error)
        })?;
        debug!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "http request completed"
        );
        Ok(response)
    }

    fn require_token(&self) -> ApiResult<&str> {
        self.config.access_token().ok_or(ApiError::AuthenticationRequired)
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url(), path);
        debug!(%method, %url, "building request");

        self.http
            .request(method, url)
            .bearer_auth(token)
            .header(header::USER_AGENT, &self.user_agent)
    }
}

fn is_zip_response(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(ZIP_CONTENT_TYPE))
}
