//! Reading document bytes from files, URLs, or memory before submission.

use crate::extraction::types::{DocumentSource, ExtractionError, LoadedDocument};
use reqwest::{Client, Url};
use std::path::Path;

const DEFAULT_DOWNLOAD_NAME: &str = "download";

/// Resolves a [`DocumentSource`] into bytes.
///
/// Every failure here is an [`ExtractionError::Encoding`]; nothing has reached the extraction
/// backend yet.
#[derive(Clone)]
pub struct SourceLoader {
    client: Client,
}

impl SourceLoader {
    /// Build a loader that downloads URLs with the supplied client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Read the document bytes.
    pub async fn load(&self, source: &DocumentSource) -> Result<LoadedDocument, ExtractionError> {
        match source {
            DocumentSource::File(path) => load_file(path).await,
            DocumentSource::Url(url) => self.download(url).await,
            DocumentSource::Bytes { file_name, data } => {
                if file_name.trim().is_empty() {
                    return Err(ExtractionError::encoding(
                        source.origin(),
                        "in-memory document needs a file name",
                    ));
                }
                Ok(LoadedDocument::new(
                    file_name.clone(),
                    file_name.clone(),
                    data.clone(),
                ))
            }
        }
    }

    async fn download(&self, raw_url: &str) -> Result<LoadedDocument, ExtractionError> {
        let url = Url::parse(raw_url).map_err(|err| ExtractionError::encoding(raw_url, err))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or(DEFAULT_DOWNLOAD_NAME)
            .to_string();

        tracing::debug!(url = %url, file_name, "Downloading document");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ExtractionError::encoding(raw_url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::encoding(
                raw_url,
                format!("download returned {status}"),
            ));
        }
        let data = response
            .bytes()
            .await
            .map_err(|err| ExtractionError::encoding(raw_url, err))?;

        Ok(LoadedDocument::new(
            file_name,
            raw_url.to_string(),
            data.to_vec(),
        ))
    }
}

async fn load_file(path: &Path) -> Result<LoadedDocument, ExtractionError> {
    let origin = path.display().to_string();
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::encoding(&origin, "path has no usable file name"))?;
    let data = tokio::fs::read(path)
        .await
        .map_err(|err| ExtractionError::encoding(&origin, err))?;
    Ok(LoadedDocument::new(file_name, origin, data))
}
