//! HTTP surface for Rusty Extract.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /extract` – Extract text from a local path, a URL, or inline text. Accepts optional
//!   `file_name`, `ocr_strategy`, `use_cache`, and `deadline_ms` and returns
//!   `{ "content": string, "metadata": object }`.
//! - `POST /clear-cache` – Drop every cached result locally and on the backend.
//! - `GET /metrics` – Observe cache and backend counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! The HTTP surface shares the same extraction pipeline with the CLI, so behavior is identical
//! across interfaces. Unlike the CLI, callers are remote: a [`SourcePolicy`] confines `path`
//! sources to a configured root directory and keeps `url` sources off unless enabled.

use crate::config::Config;
use crate::extraction::{
    DocumentSource, ExtractionApi, ExtractionError, ExtractionOptions, ExtractionRequest,
    ExtractionResult, OcrStrategy,
};
use crate::metrics::MetricsSnapshot;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File name used for inline text when the caller does not provide one.
const DEFAULT_TEXT_FILE_NAME: &str = "document.txt";

/// Which document sources remote callers may request.
#[derive(Debug, Clone, Default)]
pub struct SourcePolicy {
    root: Option<PathBuf>,
    allow_urls: bool,
}

impl SourcePolicy {
    /// Build a policy. `root` is canonicalized so later containment checks compare real paths.
    pub fn new(root: Option<&Path>, allow_urls: bool) -> std::io::Result<Self> {
        let root = root.map(std::fs::canonicalize).transpose()?;
        Ok(Self { root, allow_urls })
    }

    /// Policy described by `EXTRACTION_SOURCE_ROOT` and `EXTRACTION_ALLOW_URL_SOURCES`.
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        Self::new(config.source_root.as_deref(), config.allow_url_sources)
    }

    /// Resolve `source` or refuse it. Admitted paths are returned in canonical form.
    async fn admit(&self, source: DocumentSource) -> Result<DocumentSource, AppError> {
        match source {
            DocumentSource::File(path) => {
                let Some(root) = &self.root else {
                    return Err(AppError::Forbidden(
                        "`path` sources are disabled on this server".into(),
                    ));
                };
                let candidate = root.join(&path);
                let resolved = tokio::fs::canonicalize(&candidate)
                    .await
                    .map_err(|err| ExtractionError::encoding(path.display().to_string(), err))?;
                if !resolved.starts_with(root) {
                    tracing::warn!(
                        path = %path.display(),
                        "Rejected path outside the configured source root"
                    );
                    return Err(AppError::Forbidden(format!(
                        "`{}` is outside the configured source root",
                        path.display()
                    )));
                }
                Ok(DocumentSource::File(resolved))
            }
            DocumentSource::Url(_) if !self.allow_urls => Err(AppError::Forbidden(
                "`url` sources are disabled on this server".into(),
            )),
            other => Ok(other),
        }
    }
}

struct AppState<S> {
    service: Arc<S>,
    sources: Arc<SourcePolicy>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            sources: Arc::clone(&self.sources),
        }
    }
}

/// Build the HTTP router exposing the extraction API surface.
pub fn create_router<S>(service: Arc<S>, sources: SourcePolicy) -> Router
where
    S: ExtractionApi + 'static,
{
    Router::new()
        .route("/extract", post(extract::<S>))
        .route("/clear-cache", post(clear_cache::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(AppState {
            service,
            sources: Arc::new(sources),
        })
}

/// Request body for the `POST /extract` endpoint.
#[derive(Deserialize)]
struct ExtractRequest {
    /// Local file readable by this server.
    #[serde(default)]
    path: Option<PathBuf>,
    /// Remote document downloaded before submission.
    #[serde(default)]
    url: Option<String>,
    /// Inline document contents.
    #[serde(default)]
    text: Option<String>,
    /// File name presented to the backend for inline text (defaults to `document.txt`).
    #[serde(default)]
    file_name: Option<String>,
    /// Optional OCR engine (`tesseract` | `easyocr`).
    #[serde(default)]
    ocr_strategy: Option<String>,
    /// Set to `false` to bypass the cache lookup.
    #[serde(default)]
    use_cache: Option<bool>,
    /// Abandon the extraction after this many milliseconds.
    #[serde(default)]
    deadline_ms: Option<u64>,
}

impl ExtractRequest {
    fn into_parts(self) -> Result<(ExtractionRequest, Option<Duration>), AppError> {
        let source = match (self.path, self.url, self.text) {
            (Some(path), None, None) => DocumentSource::File(path),
            (None, Some(url), None) => DocumentSource::Url(url),
            (None, None, Some(text)) => DocumentSource::text(
                self.file_name
                    .unwrap_or_else(|| DEFAULT_TEXT_FILE_NAME.to_string()),
                text,
            ),
            _ => {
                return Err(AppError::BadRequest(
                    "exactly one of `path`, `url`, or `text` is required".into(),
                ));
            }
        };
        let ocr_strategy = self
            .ocr_strategy
            .as_deref()
            .map(str::parse::<OcrStrategy>)
            .transpose()
            .map_err(AppError::BadRequest)?;
        let options = ExtractionOptions {
            ocr_strategy,
            use_cache: self.use_cache,
        };
        let deadline = match self.deadline_ms {
            Some(0) => {
                return Err(AppError::BadRequest(
                    "`deadline_ms` must be greater than zero".into(),
                ));
            }
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        Ok((ExtractionRequest::new(source).with_options(options), deadline))
    }
}

/// Extract text from the requested source.
///
/// Validation failures are rejected before the pipeline runs; everything else is mapped from
/// [`ExtractionError`] by [`AppError`].
async fn extract<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractionResult>, AppError>
where
    S: ExtractionApi,
{
    let (mut request, deadline) = request.into_parts()?;
    request.source = state.sources.admit(request.source).await?;
    let service = &state.service;
    let origin = request.source.origin();
    let result = match deadline {
        Some(deadline) => service.extract_text_within(request, deadline).await?,
        None => service.extract_text(request).await?,
    };
    tracing::info!(
        origin = %origin,
        characters = result.content.chars().count(),
        "Extract request completed"
    );
    Ok(Json(result))
}

/// Clear the local and backend caches.
async fn clear_cache<S>(State(state): State<AppState<S>>) -> Result<StatusCode, AppError>
where
    S: ExtractionApi,
{
    state.service.clear_cache().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Return a snapshot of cache and backend counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: ExtractionApi,
{
    Json(state.service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "extract",
                method: "POST",
                path: "/extract",
                description: "Extract text from exactly one of `path` (relative to the server's source root), `url` (when enabled), or `text`. Repeated requests for identical content and options are served from the cache. Response returns { \"content\": string, \"metadata\": object }.",
                request_example: Some(json!({
                    "path": "scans/invoice.pdf",
                    "ocr_strategy": "tesseract",
                    "use_cache": true,
                    "deadline_ms": 45000
                })),
            },
            CommandDescriptor {
                name: "clear_cache",
                method: "POST",
                path: "/clear-cache",
                description: "Invalidate every cached result locally and on the extraction backend.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return cache and backend counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Forbidden(String),
    Extraction(ExtractionError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Extraction(err) => match err {
                ExtractionError::Encoding { .. } => StatusCode::BAD_REQUEST,
                ExtractionError::Failed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ExtractionError::Timeout { .. } | ExtractionError::DeadlineExceeded(_) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                ExtractionError::Transport(_) | ExtractionError::Protocol(_) => {
                    StatusCode::BAD_GATEWAY
                }
                ExtractionError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message) = match self {
            Self::BadRequest(message) => ("bad_request", message),
            Self::Forbidden(message) => ("forbidden", message),
            Self::Extraction(err) => (err.kind(), err.to_string()),
        };
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

impl From<ExtractionError> for AppError {
    fn from(inner: ExtractionError) -> Self {
        Self::Extraction(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{SourcePolicy, create_router, get_commands};
    use crate::extraction::{
        DocumentSource, ExtractionApi, ExtractionError, ExtractionRequest, ExtractionResult,
        OcrStrategy, TaskHandle,
    };
    use crate::metrics::MetricsSnapshot;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Map, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_extract_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let extract = commands
            .iter()
            .find(|cmd| cmd.name == "extract")
            .expect("extract command present");

        assert_eq!(extract.method, "POST");
        assert_eq!(extract.path, "/extract");
        assert!(extract.description.to_lowercase().contains("cache"));
        assert!(commands.iter().any(|cmd| cmd.path == "/clear-cache"));
    }

    #[tokio::test]
    async fn extract_route_forwards_text_and_options() {
        let service = Arc::new(StubExtractionService::succeeding("hello"));
        let app = create_router(service.clone(), SourcePolicy::default());

        let response = post_json(
            app,
            "/extract",
            json!({
                "text": "raw body",
                "file_name": "note.txt",
                "ocr_strategy": "EasyOCR",
                "use_cache": false
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["content"], "hello");

        let calls = service.recorded_calls().await;
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.deadline.is_none());
        assert_eq!(call.request.options.ocr_strategy, Some(OcrStrategy::EasyOcr));
        assert_eq!(call.request.options.use_cache, Some(false));
        match &call.request.source {
            DocumentSource::Bytes { file_name, data } => {
                assert_eq!(file_name, "note.txt");
                assert_eq!(data.as_slice(), b"raw body");
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_is_forwarded() {
        let service = Arc::new(StubExtractionService::succeeding("ok"));
        let sources = SourcePolicy::new(None, true).expect("policy");
        let app = create_router(service.clone(), sources);

        let response = post_json(
            app,
            "/extract",
            json!({ "url": "https://example.org/scan.png", "deadline_ms": 1500 }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let calls = service.recorded_calls().await;
        assert_eq!(calls[0].deadline, Some(Duration::from_millis(1500)));
        assert!(matches!(calls[0].request.source, DocumentSource::Url(_)));
    }

    #[tokio::test]
    async fn ambiguous_source_is_rejected_without_calling_the_service() {
        let service = Arc::new(StubExtractionService::succeeding("unused"));
        let app = create_router(service.clone(), SourcePolicy::default());

        let response = post_json(
            app,
            "/extract",
            json!({ "path": "/tmp/a.pdf", "text": "inline" }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "bad_request");
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn remote_sources_are_refused_by_default() {
        let service = Arc::new(StubExtractionService::succeeding("unused"));

        for payload in [
            json!({ "path": "/etc/shadow" }),
            json!({ "url": "http://169.254.169.254/latest/meta-data" }),
        ] {
            let app = create_router(service.clone(), SourcePolicy::default());
            let response = post_json(app, "/extract", payload).await;

            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_json(response).await["kind"], "forbidden");
        }
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn paths_outside_the_source_root_are_forbidden() {
        let workspace = tempfile::tempdir().expect("temp dir");
        let root = workspace.path().join("documents");
        std::fs::create_dir(&root).expect("root dir");
        let secret = workspace.path().join("secret.txt");
        std::fs::write(&secret, b"hunter2").expect("secret");

        let service = Arc::new(StubExtractionService::succeeding("unused"));
        let sources = SourcePolicy::new(Some(&root), false).expect("policy");

        for path in [
            json!("../secret.txt"),
            json!(secret.display().to_string()),
        ] {
            let app = create_router(service.clone(), sources.clone());
            let response = post_json(app, "/extract", json!({ "path": path })).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn paths_inside_the_source_root_are_resolved() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir(root.path().join("scans")).expect("scans dir");
        std::fs::write(root.path().join("scans/invoice.pdf"), b"%PDF").expect("fixture");

        let service = Arc::new(StubExtractionService::succeeding("invoice text"));
        let sources = SourcePolicy::new(Some(root.path()), false).expect("policy");
        let app = create_router(service.clone(), sources);

        let response = post_json(app, "/extract", json!({ "path": "scans/invoice.pdf" })).await;

        assert_eq!(response.status(), StatusCode::OK);
        let calls = service.recorded_calls().await;
        let expected = std::fs::canonicalize(root.path().join("scans/invoice.pdf"))
            .expect("canonical fixture");
        match &calls[0].request.source {
            DocumentSource::File(path) => assert_eq!(path, &expected),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_path_under_root_is_an_encoding_error() {
        let root = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubExtractionService::succeeding("unused"));
        let sources = SourcePolicy::new(Some(root.path()), false).expect("policy");
        let app = create_router(service.clone(), sources);

        let response = post_json(app, "/extract", json!({ "path": "absent.pdf" })).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "encoding");
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_ocr_strategy_is_a_bad_request() {
        let service = Arc::new(StubExtractionService::succeeding("unused"));
        let app = create_router(service.clone(), SourcePolicy::default());

        let response = post_json(
            app,
            "/extract",
            json!({ "text": "x", "ocr_strategy": "paddle" }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn extraction_errors_map_to_status_codes() {
        let cases = [
            (
                ExtractionError::Encoding {
                    origin: "missing.pdf".into(),
                    reason: "not found".into(),
                },
                StatusCode::BAD_REQUEST,
                "encoding",
            ),
            (
                ExtractionError::Failed("corrupt".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "failed",
            ),
            (
                ExtractionError::Timeout {
                    handle: TaskHandle::new("t"),
                    attempts: 30,
                },
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                ExtractionError::Protocol("queued".into()),
                StatusCode::BAD_GATEWAY,
                "protocol",
            ),
        ];

        for (error, status, kind) in cases {
            let service = Arc::new(StubExtractionService::failing(error));
            let app = create_router(service, SourcePolicy::default());
            let response = post_json(app, "/extract", json!({ "text": "x" })).await;

            assert_eq!(response.status(), status);
            assert_eq!(body_json(response).await["kind"], kind);
        }
    }

    #[tokio::test]
    async fn clear_cache_returns_no_content() {
        let service = Arc::new(StubExtractionService::succeeding("unused"));
        let app = create_router(service.clone(), SourcePolicy::default());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/clear-cache")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(*service.clears.lock().await, 1);
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let service = Arc::new(StubExtractionService::succeeding("unused"));
        let app = create_router(service, SourcePolicy::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["cache_hits"], 4);
        assert_eq!(json["timeouts"], 0);
    }

    async fn post_json(app: axum::Router, uri: &str, payload: serde_json::Value) -> Response {
        app.oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("request"),
        )
        .await
        .expect("router response")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[derive(Debug)]
    struct ExtractCall {
        request: ExtractionRequest,
        deadline: Option<Duration>,
    }

    struct StubExtractionService {
        calls: Mutex<Vec<ExtractCall>>,
        clears: Mutex<usize>,
        outcome: Mutex<Option<ExtractionError>>,
        content: String,
    }

    impl StubExtractionService {
        fn succeeding(content: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                clears: Mutex::new(0),
                outcome: Mutex::new(None),
                content: content.to_string(),
            }
        }

        fn failing(error: ExtractionError) -> Self {
            let service = Self::succeeding("");
            *service.outcome.try_lock().expect("fresh lock") = Some(error);
            service
        }

        async fn recorded_calls(&self) -> Vec<ExtractCall> {
            std::mem::take(&mut *self.calls.lock().await)
        }

        async fn respond(
            &self,
            request: ExtractionRequest,
            deadline: Option<Duration>,
        ) -> Result<ExtractionResult, ExtractionError> {
            self.calls.lock().await.push(ExtractCall { request, deadline });
            if let Some(error) = self.outcome.lock().await.take() {
                return Err(error);
            }
            Ok(ExtractionResult {
                content: self.content.clone(),
                metadata: Map::new(),
            })
        }
    }

    #[async_trait]
    impl ExtractionApi for StubExtractionService {
        async fn extract_text(
            &self,
            request: ExtractionRequest,
        ) -> Result<ExtractionResult, ExtractionError> {
            self.respond(request, None).await
        }

        async fn extract_text_within(
            &self,
            request: ExtractionRequest,
            deadline: Duration,
        ) -> Result<ExtractionResult, ExtractionError> {
            self.respond(request, Some(deadline)).await
        }

        async fn clear_cache(&self) -> Result<(), ExtractionError> {
            *self.clears.lock().await += 1;
            Ok(())
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                cache_hits: 4,
                ..MetricsSnapshot::default()
            }
        }
    }
}
