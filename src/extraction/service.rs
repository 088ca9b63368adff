//! Extraction service coordinating source loading, the cache, and the backend task lifecycle.

use crate::{
    backend::{ExtractionBackend, HttpExtractionBackend, TransportError},
    config::Config,
    extraction::{
        cache::{CacheStore, MemoryCache},
        poller::{PollPolicy, wait_for_result},
        source::SourceLoader,
        types::{
            CacheError, CacheKey, DocumentSource, ExtractionError, ExtractionRequest,
            ExtractionResult,
        },
    },
    metrics::{ExtractionMetrics, MetricsSnapshot},
};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Turns extraction requests into text, consulting the cache before the backend.
///
/// All collaborators are injected, so the same service runs against the HTTP backend in
/// production and against in-process fakes in tests. Construct it once and share it through an
/// `Arc`; concurrent calls are independent.
pub struct Extractor {
    backend: Arc<dyn ExtractionBackend>,
    cache: Arc<dyn CacheStore>,
    loader: SourceLoader,
    policy: PollPolicy,
    metrics: Arc<ExtractionMetrics>,
}

/// Abstraction over the extraction service used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait ExtractionApi: Send + Sync {
    /// Extract text, answering from the cache when possible.
    async fn extract_text(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError>;

    /// Extract text, giving up once `deadline` has elapsed.
    async fn extract_text_within(
        &self,
        request: ExtractionRequest,
        deadline: Duration,
    ) -> Result<ExtractionResult, ExtractionError>;

    /// Invalidate the local cache and the backend's cache.
    async fn clear_cache(&self) -> Result<(), ExtractionError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl Extractor {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        cache: Arc<dyn CacheStore>,
        loader: SourceLoader,
        policy: PollPolicy,
    ) -> Self {
        Self {
            backend,
            cache,
            loader,
            policy,
            metrics: Arc::new(ExtractionMetrics::new()),
        }
    }

    /// Wire the HTTP backend and an in-process cache from configuration.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let backend = HttpExtractionBackend::from_config(config)?;
        let loader = SourceLoader::new(backend.http_client());
        let capacity = config.cache_max_entries.and_then(NonZeroUsize::new);
        let cache = MemoryCache::with_capacity(capacity);
        tracing::info!(
            backend = %config.extraction_url,
            api_version = %config.api_version,
            poll_max_attempts = config.poll_max_attempts,
            poll_delay_ms = config.poll_delay_ms,
            cache_max_entries = ?config.cache_max_entries,
            "Extraction service initialized"
        );
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(cache),
            loader,
            PollPolicy::from_config(config),
        ))
    }

    /// Polling policy applied to every submitted task.
    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    /// Extract text for `request`.
    ///
    /// Errors are typed and never cached. Cache lookup failures degrade to a miss.
    pub async fn extract_text(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        let origin = request.source.origin();
        let outcome = self.run(request).await;
        if let Err(err) = &outcome {
            self.metrics.record_error(err);
            tracing::warn!(
                source = %origin,
                kind = err.kind(),
                error = %err,
                "Text extraction failed"
            );
        }
        outcome
    }

    /// Extract text, abandoning the work once `deadline` elapses.
    ///
    /// Dropping the in-flight future cancels any outstanding HTTP request.
    pub async fn extract_text_within(
        &self,
        request: ExtractionRequest,
        deadline: Duration,
    ) -> Result<ExtractionResult, ExtractionError> {
        let origin = request.source.origin();
        match tokio::time::timeout(deadline, self.extract_text(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = ExtractionError::DeadlineExceeded(deadline);
                self.metrics.record_error(&err);
                tracing::warn!(source = %origin, ?deadline, "Extraction abandoned at deadline");
                Err(err)
            }
        }
    }

    /// Clear the local cache, then the backend's cache.
    pub async fn clear_cache(&self) -> Result<(), ExtractionError> {
        self.cache.clear().await?;
        self.backend
            .clear_cache()
            .await
            .map_err(|err| CacheError::Backend(err.to_string()))?;
        tracing::info!("Extraction caches cleared");
        Ok(())
    }

    /// Return a snapshot of the extraction counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn run(&self, request: ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        let ExtractionRequest { source, options } = request;
        let origin = source.origin();
        // Remote sources are keyed by URL so a hit costs no download; local ones by content.
        let (key, loaded) = match &source {
            DocumentSource::Url(url) => (CacheKey::for_url(url, &options), None),
            _ => {
                let document = self.loader.load(&source).await?;
                (CacheKey::derive(&document, &options), Some(document))
            }
        };

        // Read before submitting so a clear during polling invalidates this writer.
        let epoch = match self.cache.epoch().await {
            Ok(epoch) => Some(epoch),
            Err(err) => {
                tracing::warn!(error = %err, "Cache epoch unavailable; result will not be cached");
                None
            }
        };

        if options.cache_lookup_enabled() {
            match self.cache.lookup(&key).await {
                Ok(Some(result)) => {
                    self.metrics.record_cache_hit();
                    tracing::info!(source = %origin, key = %key, "Extraction cache hit");
                    return Ok(result);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Cache lookup failed; extracting instead");
                }
            }
        }
        self.metrics.record_cache_miss();

        let document = match loaded {
            Some(document) => document,
            None => self.loader.load(&source).await?,
        };

        let handle = self.backend.submit(&document, &options).await?;
        self.metrics.record_submission();
        tracing::info!(
            source = %document.origin,
            task = %handle,
            ocr_strategy = ?options.ocr_strategy,
            "Extraction task submitted"
        );

        let mut result = wait_for_result(self.backend.as_ref(), &handle, &self.policy).await?;
        self.metrics.record_completion();
        result.ensure_source(&document.origin);

        if let Some(epoch) = epoch {
            match self.cache.insert(key.clone(), result.clone(), epoch).await {
                Ok(outcome) => {
                    tracing::debug!(key = %key, ?outcome, "Extraction result cached")
                }
                Err(err) => tracing::warn!(key = %key, error = %err, "Failed to cache result"),
            }
        }

        tracing::info!(
            source = %document.origin,
            task = %handle,
            characters = result.content.len(),
            "Text extraction completed"
        );
        Ok(result)
    }
}

#[async_trait]
impl ExtractionApi for Extractor {
    async fn extract_text(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        Extractor::extract_text(self, request).await
    }

    async fn extract_text_within(
        &self,
        request: ExtractionRequest,
        deadline: Duration,
    ) -> Result<ExtractionResult, ExtractionError> {
        Extractor::extract_text_within(self, request, deadline).await
    }

    async fn clear_cache(&self) -> Result<(), ExtractionError> {
        Extractor::clear_cache(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        Extractor::metrics_snapshot(self)
    }
}
