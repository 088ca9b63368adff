//! Extraction backend integration.

pub mod client;
pub mod types;

pub use client::{HttpExtractionBackend, build_http_client};
pub use types::TransportError;

use crate::extraction::types::{
    ExtractionError, ExtractionOptions, LoadedDocument, TaskHandle, TaskStatus,
};
use async_trait::async_trait;

/// Interface implemented by extraction backends.
///
/// Implementations keep no per-task state: every call is one round trip, so the poller can
/// repeat `query_status` freely and an abandoned call leaves nothing behind.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Upload a document and return the handle of the created task.
    async fn submit(
        &self,
        document: &LoadedDocument,
        options: &ExtractionOptions,
    ) -> Result<TaskHandle, ExtractionError>;

    /// Observe the current state of a task.
    async fn query_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ExtractionError>;

    /// Drop the backend's own result cache.
    async fn clear_cache(&self) -> Result<(), ExtractionError>;
}
