//! HTTP client wrapper for the extraction backend.

use crate::backend::ExtractionBackend;
use crate::backend::types::{StatusResponse, SubmitResponse, TransportError};
use crate::config::Config;
use crate::extraction::types::{
    ExtractionError, ExtractionOptions, LoadedDocument, TaskHandle, TaskStatus,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = "rusty-extract/0.1";

/// Stateless HTTP transport for the `/api/{version}` extraction protocol.
pub struct HttpExtractionBackend {
    pub(crate) client: Client,
    pub(crate) base_url: Url,
    pub(crate) api_version: String,
}

impl HttpExtractionBackend {
    /// Construct a client for the configured backend.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let client = build_http_client(config.request_timeout())?;
        Self::with_client(client, &config.extraction_url, &config.api_version)
    }

    /// Construct a client around an existing reqwest client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        api_version: &str,
    ) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url).map_err(TransportError::InvalidUrl)?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        tracing::debug!(
            url = %base_url,
            api_version,
            "Initialized extraction backend HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_version: api_version.to_string(),
        })
    }

    /// Client handle shared with the source loader so URL downloads reuse the pool.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }

    /// Build `{base}/api/{version}/{segments..}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("api")
                .push(&self.api_version)
                .extend(segments);
        }
        url
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, ExtractionError> {
        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = TransportError::UnexpectedStatus { status, body };
            tracing::error!(operation, error = %error, "Extraction backend request failed");
            return Err(error.into());
        }

        let bytes = response.bytes().await.map_err(TransportError::from)?;
        serde_json::from_slice(&bytes).map_err(|err| {
            tracing::error!(operation, error = %err, "Extraction backend returned malformed JSON");
            ExtractionError::Protocol(format!("malformed {operation} response: {err}"))
        })
    }
}

#[async_trait]
impl ExtractionBackend for HttpExtractionBackend {
    async fn submit(
        &self,
        document: &LoadedDocument,
        options: &ExtractionOptions,
    ) -> Result<TaskHandle, ExtractionError> {
        let mut form = Form::new().part(
            "file",
            Part::bytes(document.data.clone()).file_name(document.file_name.clone()),
        );
        if let Some(strategy) = options.ocr_strategy {
            form = form.text("ocr_strategy", strategy.as_str());
        }
        if let Some(use_cache) = options.use_cache {
            form = form.text("use_cache", use_cache.to_string());
        }

        let request = self
            .client
            .request(Method::POST, self.endpoint(&["extract"]))
            .multipart(form);
        let handle = self
            .send_json::<SubmitResponse>(request, "submit")
            .await?
            .into_handle()?;

        tracing::debug!(
            task = %handle,
            file_name = %document.file_name,
            bytes = document.data.len(),
            ocr_strategy = ?options.ocr_strategy,
            "Extraction task submitted"
        );
        Ok(handle)
    }

    async fn query_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ExtractionError> {
        if !handle.is_addressable() {
            return Err(ExtractionError::Protocol(format!(
                "task handle '{handle}' cannot be used as a status path segment"
            )));
        }
        let request = self
            .client
            .request(Method::GET, self.endpoint(&["status", handle.as_str()]));
        self.send_json::<StatusResponse>(request, "status")
            .await?
            .into_status()
    }

    async fn clear_cache(&self) -> Result<(), ExtractionError> {
        let response = self
            .client
            .request(Method::POST, self.endpoint(&["clear-cache"]))
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Extraction backend cache cleared");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = TransportError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to clear extraction backend cache");
            Err(error.into())
        }
    }
}

/// Build the shared reqwest client with the per-request timeout applied.
pub fn build_http_client(timeout: Duration) -> Result<Client, TransportError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

fn normalize_base_url(url: &str) -> Result<Url, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed)
}
