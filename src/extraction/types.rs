//! Core data types and error definitions for the extraction pipeline.

use crate::backend::TransportError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Reason reported when the backend marks a task failed without saying why.
pub(crate) const DEFAULT_FAILURE_REASON: &str = "Text extraction failed";

/// Errors raised by a cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache store could not be reached or is no longer usable.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    /// The extraction backend refused to clear its own cache.
    #[error("Backend cache clear failed: {0}")]
    Backend(String),
}

/// Errors emitted while turning a document into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The local source could not be read before anything was submitted.
    #[error("Failed to read document source {origin}: {reason}")]
    Encoding {
        /// Path or URL that was being read.
        origin: String,
        /// Human readable cause.
        reason: String,
    },
    /// Network failure or backend rejection on submit or status query.
    #[error("Extraction backend request failed: {0}")]
    Transport(#[from] TransportError),
    /// The backend answered outside the documented protocol.
    #[error("Extraction backend protocol violation: {0}")]
    Protocol(String),
    /// The backend reported the task as failed.
    #[error("Text extraction failed: {0}")]
    Failed(String),
    /// The attempt budget ran out while the task was still pending or processing.
    #[error("Text extraction timed out after {attempts} status checks for task {handle}")]
    Timeout {
        /// Task that never reached a terminal state.
        handle: TaskHandle,
        /// Number of status queries issued.
        attempts: u32,
    },
    /// Cache store failure that could not be degraded.
    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),
    /// The caller-supplied deadline elapsed before the extraction finished.
    #[error("Extraction abandoned after deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl ExtractionError {
    pub(crate) fn encoding(origin: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Encoding {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether resubmitting the whole request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::DeadlineExceeded(_)
        )
    }

    /// Short stable label used in logs, metrics and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encoding { .. } => "encoding",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Failed(_) => "failed",
            Self::Timeout { .. } => "timeout",
            Self::Cache(_) => "cache",
            Self::DeadlineExceeded(_) => "deadline",
        }
    }
}

/// OCR engine the backend should use for image-based pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrStrategy {
    /// Tesseract OCR.
    Tesseract,
    /// EasyOCR.
    EasyOcr,
}

impl OcrStrategy {
    /// Wire name sent in the `ocr_strategy` form field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::EasyOcr => "easyocr",
        }
    }
}

impl fmt::Display for OcrStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "easyocr" => Ok(Self::EasyOcr),
            other => Err(format!("unsupported OCR strategy '{other}'")),
        }
    }
}

/// Per-request knobs forwarded to the backend and the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Optional OCR engine override.
    pub ocr_strategy: Option<OcrStrategy>,
    /// Cache participation; only an explicit `false` bypasses the lookup.
    pub use_cache: Option<bool>,
}

impl ExtractionOptions {
    /// Whether the local cache should be consulted before submitting.
    pub fn cache_lookup_enabled(&self) -> bool {
        self.use_cache != Some(false)
    }
}

/// Where the document bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Local file path.
    File(PathBuf),
    /// Remote document downloaded before submission.
    Url(String),
    /// In-memory payload.
    Bytes {
        /// File name presented to the backend (drives format detection).
        file_name: String,
        /// Raw document bytes.
        data: Vec<u8>,
    },
}

impl DocumentSource {
    /// Wrap raw text as an in-memory document.
    pub fn text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Bytes {
            file_name: file_name.into(),
            data: text.into().into_bytes(),
        }
    }

    /// Human readable origin recorded in errors and result metadata.
    pub fn origin(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            Self::Bytes { file_name, .. } => file_name.clone(),
        }
    }
}

/// One unit of extraction work.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Document to extract.
    pub source: DocumentSource,
    /// Backend and cache options.
    pub options: ExtractionOptions,
}

impl ExtractionRequest {
    /// Build a request with default options.
    pub fn new(source: DocumentSource) -> Self {
        Self {
            source,
            options: ExtractionOptions::default(),
        }
    }

    /// Override the options for this request.
    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Document bytes ready for submission.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// File name sent with the multipart upload.
    pub file_name: String,
    /// Path or URL the bytes were read from.
    pub origin: String,
    /// Raw document bytes.
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`.
    pub fingerprint: String,
}

impl LoadedDocument {
    /// Wrap bytes, computing the content fingerprint.
    pub fn new(file_name: String, origin: String, data: Vec<u8>) -> Self {
        let fingerprint = hex::encode(Sha256::digest(&data));
        Self {
            file_name,
            origin,
            data,
            fingerprint,
        }
    }
}

/// Opaque identifier issued by the backend for one submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Wrap a backend-issued identifier without interpreting it.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw identifier as received.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the handle can address exactly one status resource.
    ///
    /// Blank handles and dot segments (`.`, `..`, or their `%2e` spellings) are normalized away
    /// by URL path handling, so they would query a different resource than the task's.
    pub fn is_addressable(&self) -> bool {
        let decoded = self.0.trim().to_ascii_lowercase().replace("%2e", ".");
        !decoded.is_empty() && decoded != "." && decoded != ".."
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized extraction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted text.
    pub content: String,
    /// Backend-provided metadata (for example the originating source).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExtractionResult {
    /// Record the document origin under `source` unless the backend already did.
    pub(crate) fn ensure_source(&mut self, origin: &str) {
        self.metadata
            .entry("source")
            .or_insert_with(|| Value::String(origin.to_string()));
    }
}

/// Backend-observed lifecycle of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Accepted, not started.
    Pending,
    /// Running on the backend.
    Processing,
    /// Finished with a result.
    Completed(ExtractionResult),
    /// Finished with an error reported by the backend.
    Failed(String),
}

impl TaskStatus {
    /// Completed or failed; no further transitions happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Identity under which a result is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a loaded document and the options that change the output.
    ///
    /// `use_cache` is not part of the key.
    pub fn derive(document: &LoadedDocument, options: &ExtractionOptions) -> Self {
        Self::digest(&[
            "content",
            document.fingerprint.as_str(),
            document.file_name.as_str(),
            strategy_label(options),
        ])
    }

    /// Derive the key for a remote document from its URL, so a hit needs no download.
    ///
    /// The remote document is assumed stable under its URL; `use_cache = false` or a cache clear
    /// picks up a changed upstream document.
    pub fn for_url(url: &str, options: &ExtractionOptions) -> Self {
        Self::digest(&["url", url.trim(), strategy_label(options)])
    }

    fn digest(fields: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest backing the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strategy_label(options: &ExtractionOptions) -> &'static str {
    options
        .ocr_strategy
        .map(OcrStrategy::as_str)
        .unwrap_or("default")
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached result plus insertion bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Result exactly as returned to the first caller.
    pub result: ExtractionResult,
    /// RFC 3339 timestamp of the insertion.
    pub inserted_at: String,
    /// Cache epoch the entry belongs to.
    pub epoch: u64,
}
