//! File source descriptors for multipart block updates.
//!
//! A block update can attach files from three places: paths on the local
//! filesystem, remote URLs, and inline base64 blobs. Each descriptor maps a
//! form-field name (conventionally `<block_id>_<param_name>`) to one item or an
//! ordered list of items.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Filename used when a source does not provide a usable one.
pub const DEFAULT_FILENAME: &str = "file";

/// A single value or an ordered list of values.
///
/// Both shapes are accepted on the wire; callers normalize through
/// [`OneOrMany::into_vec`] so a single value behaves exactly like a
/// one-element list. Arrays always decode as `Many`, so `[]` carries no
/// values.
#[derive(JsonSchema, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Ordered list of values.
    Many(Vec<T>),
    /// Shorthand for a one-element list.
    One(T),
}

impl<T> OneOrMany<T> {
    /// Normalize into an ordered sequence.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }

    /// Borrowing iterator over the contained values in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value).iter(),
            OneOrMany::Many(values) => values.iter(),
        }
    }

    /// Number of values carried.
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(values) => values.len(),
        }
    }

    /// True for an empty list.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inline file content encoded as base64.
///
/// Only a JSON object is accepted; positional arrays and unknown keys are
/// rejected.
#[derive(JsonSchema, Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlobItem {
    /// Filename presented to the remote service. Falls back to `file`.
    #[serde(default)]
    #[schemars(description = "Filename for the uploaded part. Defaults to 'file'.")]
    pub filename: Option<String>,
    /// Standard-alphabet base64 content.
    #[serde(default)]
    #[schemars(description = "File content encoded as standard base64.")]
    pub content_base64: String,
    /// Declared MIME type of the part, omitted when absent.
    #[serde(default)]
    #[schemars(description = "Optional MIME type declared on the part, for example 'image/png'.")]
    pub content_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BlobFields {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    content_base64: String,
    #[serde(default)]
    content_type: Option<String>,
}

impl<'de> Deserialize<'de> for BlobItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("blob must be an object with content_base64"));
        }
        let fields: BlobFields = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
        Ok(Self {
            filename: fields.filename,
            content_base64: fields.content_base64,
            content_type: fields.content_type,
        })
    }
}

impl BlobItem {
    /// Filename to send, substituting the default for absent or empty names.
    pub fn effective_filename(&self) -> &str {
        match self.filename.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_FILENAME,
        }
    }

    /// Declared content type, treating an empty string as absent.
    pub fn declared_content_type(&self) -> Option<&str> {
        self.content_type.as_deref().filter(|content_type| !content_type.is_empty())
    }
}

/// Field name to local filesystem path(s).
pub type LocalFileSources = IndexMap<String, OneOrMany<String>>;
/// Field name to remote URL(s).
pub type RemoteUrlSources = IndexMap<String, OneOrMany<String>>;
/// Field name to inline blob(s).
pub type BlobSources = IndexMap<String, OneOrMany<BlobItem>>;

/// The three file descriptors of a block update, each optional.
///
/// Absent descriptors are empty mappings. Field order is insertion order and
/// is preserved through assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSources {
    pub local_files: LocalFileSources,
    pub remote_urls: RemoteUrlSources,
    pub blobs: BlobSources,
}

impl FileSources {
    /// Build from optional descriptors as received from a caller.
    pub fn from_parts(local_files: Option<LocalFileSources>, remote_urls: Option<RemoteUrlSources>, blobs: Option<BlobSources>) -> Self {
        Self {
            local_files: local_files.unwrap_or_default(),
            remote_urls: remote_urls.unwrap_or_default(),
            blobs: blobs.unwrap_or_default(),
        }
    }

    /// Total number of items across every source.
    pub fn item_count(&self) -> usize {
        let local: usize = self.local_files.values().map(OneOrMany::len).sum();
        let remote: usize = self.remote_urls.values().map(OneOrMany::len).sum();
        let blobs: usize = self.blobs.values().map(OneOrMany::len).sum();
        local + remote + blobs
    }

    /// True when no source carries any item.
    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}
