use crate::error::FetchError;
use crate::models::AnnouncementDescriptor;
use crate::retry::{with_retry, RetryConfig};
use crate::traits::DocumentSource;
use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;
use url::Url;

const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub checksum: String,
}

/// Builds the one HTTP client shared by every outbound call of a run.
/// A proxy that cannot be parsed fails here, before any request is sent.
pub fn build_http_client(proxy: Option<&str>, timeout: Duration) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("idx-suspension/", env!("CARGO_PKG_VERSION")));

    if let Some(proxy) = proxy {
        let proxy = Proxy::all(parse_proxy(proxy)?)
            .map_err(|error| FetchError::TransportConfig(format!("invalid proxy address: {error}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|error| FetchError::TransportConfig(error.to_string()))
}

/// Validates a proxy address up front; reqwest only notices an unusable
/// proxy once the first request goes out.
fn parse_proxy(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    // `user:pass@host:port` would otherwise parse with `user` as the scheme.
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let url = Url::parse(&candidate)
        .map_err(|error| FetchError::TransportConfig(format!("invalid proxy address: {error}")))?;
    if !PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(FetchError::TransportConfig(format!(
            "unsupported proxy scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(FetchError::TransportConfig("proxy address has no host".to_string()));
    }
    Ok(url)
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub struct HttpDocumentFetcher {
    client: Client,
    retry: RetryConfig,
}

impl HttpDocumentFetcher {
    pub fn new(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| classify_transport_error(url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| classify_transport_error(url, error))?;
        Ok(bytes.to_vec())
    }
}

fn classify_transport_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_builder() {
        return FetchError::TransportConfig(error.to_string());
    }
    FetchError::Connection {
        url: url.to_string(),
        details: error.to_string(),
    }
}

fn classify_status(url: &Url, status: StatusCode) -> FetchError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::NotFound {
            url: url.to_string(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => FetchError::Connection {
            url: url.to_string(),
            details: status.to_string(),
        },
        status if status.is_server_error() => FetchError::Connection {
            url: url.to_string(),
            details: status.to_string(),
        },
        status => FetchError::Rejected {
            url: url.to_string(),
            status: status.as_u16(),
        },
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentFetcher {
    async fn fetch(&self, descriptor: &AnnouncementDescriptor) -> Result<FetchedDocument, FetchError> {
        let url = Url::parse(&descriptor.document_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| FetchError::NotFound {
                url: descriptor.document_url.clone(),
            })?;

        let bytes = with_retry(&self.retry, || self.fetch_once(&url)).await?;
        let checksum = digest_bytes(&bytes);
        debug!(url = %url, size = bytes.len(), sha256 = %checksum, "fetched document");

        Ok(FetchedDocument {
            url: url.into(),
            bytes,
            checksum,
        })
    }
}
