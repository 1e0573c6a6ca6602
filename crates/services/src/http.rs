use async_trait::async_trait;
use futures::StreamExt;
use plugstrap_core::config::NetworkSettings;
use plugstrap_core::{Download, Error, HttpClient, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Environment variables consulted for a GitHub token, in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// HTTP client backed by reqwest.
///
/// Requests to the configured GitHub API host carry a bearer token when
/// `GITHUB_TOKEN` or `GH_TOKEN` is set.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    metadata_timeout: Duration,
    download_timeout: Duration,
    api_host: Option<String>,
    token: Option<String>,
}

impl ReqwestHttpClient {
    /// Create a client from network settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TLS backend cannot be initialised.
    pub fn new(settings: &NetworkSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.metadata_timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("could not build HTTP client: {e}")))?;

        let api_host = reqwest::Url::parse(&settings.github_api_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));

        Ok(Self {
            client,
            metadata_timeout: Duration::from_secs(settings.metadata_timeout_secs),
            download_timeout: Duration::from_secs(settings.download_timeout_secs),
            api_host,
            token,
        })
    }

    /// Whether a bearer token will be sent to the GitHub API.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn auth_for(&self, url: &str) -> Option<HeaderValue> {
        let token = self.token.as_deref()?;
        let host = reqwest::Url::parse(url).ok()?.host_str()?.to_string();
        if self.api_host.as_deref() != Some(host.as_str()) {
            return None;
        }
        HeaderValue::from_str(&format!("Bearer {token}")).ok()
    }

    fn headers_for(&self, url: &str, extra: &[(String, String)]) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::network(url, format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::network(url, format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }
        if let Some(auth) = self.auth_for(url) {
            headers.insert(AUTHORIZATION, auth);
        }
        Ok(headers)
    }

    async fn send(
        &self,
        url: &str,
        headers: HeaderMap,
        limit: Duration,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(limit)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> Error {
    Error::Network {
        url: url.to_string(),
        message: err.to_string(),
        status: err.status().map(|s| s.as_u16()),
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String> {
        debug!(%url, "GET");
        let headers = self.headers_for(url, headers)?;
        let response = self.send(url, headers, self.metadata_timeout).await?;
        response.text().await.map_err(|e| transport_error(url, &e))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<Download> {
        debug!(%url, dest = %dest.display(), "Downloading");
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, Some(parent), "create download directory"))?;
        }

        let mut headers = self.headers_for(url, &[])?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));
        let response = self.send(url, headers, self.download_timeout).await?;

        // Stream into a sibling so an interrupted download never looks complete
        let partial = partial_path(dest);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| Error::io(e, Some(&partial), "create download file"))?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(transport_error(url, &e));
                }
            };
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, Some(&partial), "write download"))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::io(e, Some(&partial), "flush download"))?;
        drop(file);

        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| Error::io(e, Some(dest), "finish download"))?;

        Ok(Download {
            bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}
