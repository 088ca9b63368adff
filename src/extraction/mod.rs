//! Document extraction pipeline: source loading, result cache, task polling, and orchestration.

pub mod cache;
pub mod poller;
pub mod source;
mod service;
pub mod types;

pub use cache::{CacheStore, InsertOutcome, MemoryCache};
pub use poller::{PollPolicy, wait_for_result};
pub use service::{ExtractionApi, Extractor};
pub use source::SourceLoader;
pub use types::{
    CacheEntry, CacheError, CacheKey, DocumentSource, ExtractionError, ExtractionOptions,
    ExtractionRequest, ExtractionResult, LoadedDocument, OcrStrategy, TaskHandle, TaskStatus,
};
