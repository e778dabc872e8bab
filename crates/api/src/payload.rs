//! Multipart payload assembly for block updates.
//!
//! [`PayloadAssembler`] resolves the three file descriptors of an update into
//! one ordered list of [`ResolvedFilePart`]s:
//!
//! 1. local files, opened now and streamed while the request body is written
//! 2. remote URLs, fetched and fully buffered
//! 3. base64 blobs, decoded in memory
//!
//! Within a source, parts follow the mapping's field order and then each
//! field's list order. The remote service may rely on first-seen-wins per
//! field, so this order must not change.
//!
//! Every local file handle is tracked by a [`HandleLedger`]. A handle is closed
//! when its part is dropped: after the request body has been sent, when the
//! payload is released, or when assembly fails part-way and the partial payload
//! goes out of scope.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine as _, alphabet};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use tuba_types::{BlobItem, DEFAULT_FILENAME, FileSources, OneOrMany};

use crate::error::{ApiError, ApiResult};

/// Form field carrying the serialized block parameters.
pub const WORKFLOW_BLOCKS_FIELD: &str = "workflow_blocks";

/// Standard alphabet, canonical padding, tolerant of non-zero trailing bits.
const BLOB_ENGINE: GeneralPurpose =
    GeneralPurpose::new(&alphabet::STANDARD, GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true));

/// Counts local file handles that are still open.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct HandleLedger {
    open: Arc<AtomicUsize>,
}

impl HandleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles opened through this ledger and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn track(&self, file: File) -> TrackedFile {
        self.open.fetch_add(1, Ordering::SeqCst);
        TrackedFile {
            file,
            open: Arc::clone(&self.open),
        }
    }
}

/// A file handle registered with a [`HandleLedger`]; dropping it closes the file.
#[derive(Debug)]
pub struct TrackedFile {
    file: File,
    open: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedFile {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl Drop for TrackedFile {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Where a resolved part came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartSource {
    LocalFile,
    RemoteUrl,
    Blob,
}

#[derive(Debug)]
enum PartContent {
    /// Open local file, read while the request body is written.
    Stream { file: TrackedFile, length: u64 },
    /// Fully buffered bytes.
    Bytes(Vec<u8>),
}

/// One normalized file attachment of the outgoing multipart body.
#[derive(Debug)]
pub struct ResolvedFilePart {
    field_name: String,
    filename: String,
    content: PartContent,
    content_type: Option<String>,
    source: PartSource,
}

impl ResolvedFilePart {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn source(&self) -> PartSource {
        self.source
    }

    /// Buffered bytes, or `None` for streamed local files.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            PartContent::Bytes(bytes) => Some(bytes),
            PartContent::Stream { .. } => None,
        }
    }

    fn into_multipart(self) -> ApiResult<(String, Part)> {
        let part = match self.content {
            PartContent::Stream { file, length } => Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length),
            PartContent::Bytes(bytes) => Part::bytes(bytes),
        }
        .file_name(self.filename);

        // Declared verbatim; only values that cannot be a header at all are refused.
        let part = match self.content_type {
            Some(content_type) => {
                let value = HeaderValue::from_str(&content_type).map_err(|_| ApiError::InvalidContentType {
                    field: self.field_name.clone(),
                    content_type,
                })?;
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, value);
                part.headers(headers)
            }
            None => part,
        };
        Ok((self.field_name, part))
    }
}

/// Non-fatal conditions observed during assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyWarning {
    /// Blob content was not valid base64 and was replaced with an empty file.
    BlobDecodeFailed { field: String, filename: String, reason: String },
}

/// Ordered parts of an update request together with the ledger of their open handles.
#[derive(Debug)]
pub struct AssembledPayload {
    parts: Vec<ResolvedFilePart>,
    ledger: HandleLedger,
    warnings: Vec<AssemblyWarning>,
}

impl AssembledPayload {
    fn empty(ledger: HandleLedger) -> Self {
        Self {
            parts: Vec::new(),
            ledger,
            warnings: Vec::new(),
        }
    }

    pub fn parts(&self) -> &[ResolvedFilePart] {
        &self.parts
    }

    pub fn warnings(&self) -> &[AssemblyWarning] {
        &self.warnings
    }

    pub fn ledger(&self) -> &HandleLedger {
        &self.ledger
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Close every handle without sending.
    pub fn release(self) {
        let ledger = self.ledger.clone();
        drop(self);
        debug!(open_handles = ledger.open_handles(), "payload released");
    }

    /// Build the multipart form: the `workflow_blocks` text field followed by every part in order.
    ///
    /// Open handles move into the form body and close once it has been sent or dropped.
    pub fn into_form(self, workflow_blocks: String) -> ApiResult<Form> {
        let mut form = Form::new().text(WORKFLOW_BLOCKS_FIELD, workflow_blocks);
        for part in self.parts {
            let (field_name, part) = part.into_multipart()?;
            form = form.part(field_name, part);
        }
        Ok(form)
    }
}

/// Resolves [`FileSources`] into an [`AssembledPayload`].
#[derive(Debug)]
pub struct PayloadAssembler<'a> {
    http: &'a Client,
    ledger: HandleLedger,
}

impl<'a> PayloadAssembler<'a> {
    /// Assembler fetching remote sources with `http`.
    ///
    /// The client must not carry the service credential; remote sources are
    /// arbitrary third-party hosts.
    pub fn new(http: &'a Client) -> Self {
        Self {
            http,
            ledger: HandleLedger::new(),
        }
    }

    /// Track opened handles with an existing ledger.
    pub fn with_ledger(mut self, ledger: HandleLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Resolve every source in order: local files, remote URLs, blobs.
    ///
    /// Any local or remote failure aborts the whole assembly. Handles opened
    /// before the failure are closed when the partial payload is dropped.
    pub async fn assemble(self, sources: FileSources) -> ApiResult<AssembledPayload> {
        let FileSources {
            local_files,
            remote_urls,
            blobs,
        } = sources;
        let mut payload = AssembledPayload::empty(self.ledger.clone());

        for (field_name, paths) in local_files {
            for path in paths.into_vec() {
                let part = self.open_local(&field_name, &path).await?;
                payload.parts.push(part);
            }
        }

        for (field_name, urls) in remote_urls {
            for url in urls.into_vec() {
                let part = self.fetch_remote(&field_name, &url).await?;
                payload.parts.push(part);
            }
        }

        for (field_name, items) in blobs {
            push_blobs(&mut payload, &field_name, items);
        }

        debug!(
            parts = payload.parts.len(),
            open_handles = payload.ledger.open_handles(),
            warnings = payload.warnings.len(),
            "multipart payload assembled"
        );
        Ok(payload)
    }

    async fn open_local(&self, field_name: &str, path: &str) -> ApiResult<ResolvedFilePart> {
        let file_access = |source: io::Error| ApiError::FileAccess {
            path: path.into(),
            source,
        };
        let file = File::open(path).await.map_err(file_access)?;
        let file = self.ledger.track(file);
        let metadata = file.file.metadata().await.map_err(file_access)?;
        if !metadata.is_file() {
            return Err(file_access(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file")));
        }

        debug!(field = %field_name, path = %path, length = metadata.len(), "opened local upload");
        Ok(ResolvedFilePart {
            field_name: field_name.to_string(),
            filename: local_filename(path),
            content: PartContent::Stream {
                file,
                length: metadata.len(),
            },
            content_type: None,
            source: PartSource::LocalFile,
        })
    }

    async fn fetch_remote(&self, field_name: &str, url: &str) -> ApiResult<ResolvedFilePart> {
        let remote_fetch = |reason: String| ApiError::RemoteFetch {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|error| remote_fetch(error.to_string()))?;
        let filename = remote_filename(&parsed);

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|error| remote_fetch(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(field = %field_name, url = %url, status = %status, "remote upload source returned an error status");
            return Err(remote_fetch(format!("HTTP {status}")));
        }
        let bytes = response.bytes().await.map_err(|error| remote_fetch(error.to_string()))?;

        debug!(field = %field_name, url = %url, length = bytes.len(), "fetched remote upload");
        Ok(ResolvedFilePart {
            field_name: field_name.to_string(),
            filename,
            content: PartContent::Bytes(bytes.to_vec()),
            content_type: None,
            source: PartSource::RemoteUrl,
        })
    }
}

fn push_blobs(payload: &mut AssembledPayload, field_name: &str, items: OneOrMany<BlobItem>) {
    for blob in items.into_vec() {
        let filename = blob.effective_filename().to_string();
        let content = match decode_blob(&blob.content_base64) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(field = %field_name, filename = %filename, error = %error, "blob content is not valid base64; sending an empty file");
                payload.warnings.push(AssemblyWarning::BlobDecodeFailed {
                    field: field_name.to_string(),
                    filename: filename.clone(),
                    reason: error.to_string(),
                });
                Vec::new()
            }
        };
        payload.parts.push(ResolvedFilePart {
            field_name: field_name.to_string(),
            filename,
            content: PartContent::Bytes(content),
            content_type: blob.declared_content_type().map(str::to_string),
            source: PartSource::Blob,
        });
    }
}

/// Characters outside the standard alphabet and `=` are skipped before decoding.
fn decode_blob(content_base64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content_base64
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '/' | '='))
        .collect();
    BLOB_ENGINE.decode(compact)
}

/// Base name of a local path.
fn local_filename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Last path segment of a URL, or `file` when it is empty.
pub fn remote_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}
