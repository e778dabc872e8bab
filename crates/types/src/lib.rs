//! Shared type definitions for the Tuba workflow tools.
//!
//! These types describe the arguments accepted by the block update operation:
//! block parameter values and the file descriptors merged into its multipart
//! payload.

pub mod sources;

use indexmap::IndexMap;
use serde_json::{Map, Value};

pub use sources::{BlobItem, BlobSources, DEFAULT_FILENAME, FileSources, LocalFileSources, OneOrMany, RemoteUrlSources};

/// Block parameter values keyed by `block_id`, then by parameter name.
pub type WorkflowBlocks = IndexMap<String, Map<String, Value>>;
