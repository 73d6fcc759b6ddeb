use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use tokio::io::AsyncWriteExt;

use crate::config::UpdaterConfig;
use crate::error::FetchError;

/// Receives `(bytes_done, bytes_total)`; `bytes_total` is 0 when the server
/// does not report a length.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Transport used to retrieve the manifest and new executables.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into memory.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server answers with a
    /// non-success status.
    async fn fetch(
        &self,
        url: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<u8>, FetchError>;

    /// Fetch `url` and write the body to `dest`, replacing any existing file.
    ///
    /// # Errors
    /// Returns an error if the request fails, the server answers with a
    /// non-success status, or `dest` cannot be written.
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<(), FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: &UpdaterConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(format!("restage/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| FetchError::request(url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url).await?;
        let total = response.content_length().unwrap_or(0);
        let mut body = Vec::new();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| FetchError::request(url, error))?;
            body.extend_from_slice(&chunk);
            if let Some(progress) = &progress {
                progress(body.len() as u64, total);
            }
        }

        debug!("Fetched {} bytes from {url}", body.len());
        Ok(body)
    }

    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<(), FetchError> {
        let response = self.get(url).await?;
        let total = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| FetchError::write(dest, error))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| FetchError::request(url, error))?;
            file.write_all(&chunk)
                .await
                .map_err(|error| FetchError::write(dest, error))?;
            downloaded += chunk.len() as u64;
            if let Some(progress) = &progress {
                progress(downloaded, total);
            }
        }

        file.flush()
            .await
            .map_err(|error| FetchError::write(dest, error))?;

        info!("Download complete: {downloaded} bytes");
        Ok(())
    }
}
