//! Tuba workflow builder API client.
//!
//! This crate provides the pieces that talk to the remote workflow service:
//!
//! - [`WorkflowConfig`]: base URL, bearer credential, and result directory,
//!   resolved once from the environment
//! - [`WorkflowClient`]: authenticated run/status/result/block calls
//! - [`PayloadAssembler`]: merges local files, remote URLs, and base64 blobs
//!   into the ordered multipart payload of a block update
//!
//! # Example
//!
//! ```ignore
//! use tuba_api::{WorkflowClient, WorkflowConfig};
//!
//! async fn show_status() -> tuba_api::ApiResult<()> {
//!     let client = WorkflowClient::new(WorkflowConfig::from_env()?)?;
//!     println!("{}", client.status().await?);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
pub mod payload;

pub use client::{
    RESULT_ARCHIVE_NAME, RESULT_PATH, RUN_PATH, STATUS_PATH, UPDATE_WORKFLOW_BLOCKS_PATH, WORKFLOW_BLOCKS_PATH, WorkflowClient,
    WorkflowResult,
};
pub use config::{ACCESS_TOKEN_ENV, API_URL_ENV, DEFAULT_API_URL, RESULT_DIR_ENV, WorkflowConfig};
pub use error::{ApiError, ApiResult};
pub use payload::{AssembledPayload, AssemblyWarning, HandleLedger, PartSource, PayloadAssembler, ResolvedFilePart};
