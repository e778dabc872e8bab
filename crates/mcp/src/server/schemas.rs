use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tuba_types::{BlobSources, FileSources, LocalFileSources, RemoteUrlSources, WorkflowBlocks};

/// Decode an argument given either as a JSON value or as a string holding JSON text.
fn json_document_to<T: DeserializeOwned>(document: Value) -> Result<T, String> {
    match document {
        Value::String(text) => serde_json::from_str(&text).map_err(|error| format!("invalid JSON text: {error}")),
        other => serde_json::from_value(other).map_err(|error| error.to_string()),
    }
}

fn deserialize_optional_json_document<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(document) => json_document_to(document).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parameters for `update_workflow_blocks_data`.
///
/// Each argument may also be sent as a string containing JSON text.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UpdateWorkflowBlocksRequest {
    /// Block parameters keyed by block id, then parameter name.
    #[serde(default, deserialize_with = "deserialize_optional_json_document")]
    #[schemars(description = "Block data as {<block_id>: {<param_name>: <value>}}.")]
    pub workflow_blocks: Option<WorkflowBlocks>,
    /// Local file paths keyed by `<block_id>_<param_name>`.
    #[serde(default, deserialize_with = "deserialize_optional_json_document")]
    #[schemars(description = "Local files as {<block_id>_<param_name>: path | [paths]}.")]
    pub files: Option<LocalFileSources>,
    /// Remote URLs keyed by `<block_id>_<param_name>`.
    #[serde(default, deserialize_with = "deserialize_optional_json_document")]
    #[schemars(description = "Remote files as {<block_id>_<param_name>: url | [urls]}. Each URL is downloaded before upload.")]
    pub file_urls: Option<RemoteUrlSources>,
    /// Inline base64 blobs keyed by `<block_id>_<param_name>`.
    #[serde(default, deserialize_with = "deserialize_optional_json_document")]
    #[schemars(
        description = "Inline files as {<block_id>_<param_name>: blob | [blobs]} where blob is {filename?, content_base64, content_type?}."
    )]
    pub file_blobs: Option<BlobSources>,
}

impl UpdateWorkflowBlocksRequest {
    /// Split into block data (empty when absent) and file sources.
    pub fn into_parts(self) -> (WorkflowBlocks, FileSources) {
        (
            self.workflow_blocks.unwrap_or_default(),
            FileSources::from_parts(self.files, self.file_urls, self.file_blobs),
        )
    }
}
