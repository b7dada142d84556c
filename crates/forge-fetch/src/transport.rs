//! HTTP transport
//!
//! Forges issue every request through [`Transport`]. Metadata bodies are read
//! whole (size-capped); archive bodies are handed to the tree store as a
//! stream.

use crate::config::FetchSettings;
use reqwest::blocking::Client;
use std::io::Read;
use thiserror::Error;

/// Errors that can occur during a transfer
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// IO error while reading the body
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Metadata response too large
    #[error("Content too large: more than {max} bytes")]
    ContentTooLarge { max: u64 },

    /// Metadata response is not text
    #[error("Response is not valid UTF-8")]
    NotUtf8,
}

/// Maximum size of a metadata response (10 MB)
pub const MAX_METADATA_SIZE: u64 = 10 * 1024 * 1024;

/// A request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Issues GET requests and returns the response body as a stream
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        headers: &[HttpHeader],
    ) -> Result<Box<dyn Read + Send>, TransportError>;
}

/// Read a metadata body into a string, refusing anything over
/// [`MAX_METADATA_SIZE`]
pub fn read_metadata(body: &mut dyn Read) -> Result<String, TransportError> {
    let mut content = Vec::new();
    body.take(MAX_METADATA_SIZE + 1).read_to_end(&mut content)?;
    if content.len() as u64 > MAX_METADATA_SIZE {
        return Err(TransportError::ContentTooLarge {
            max: MAX_METADATA_SIZE,
        });
    }
    String::from_utf8(content).map_err(|_| TransportError::NotUtf8)
}

/// [`Transport`] over a blocking reqwest client
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the timeouts from `settings`
    pub fn new(settings: &FetchSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.timeout())
            .user_agent(format!("forge-fetch/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        url: &str,
        headers: &[HttpHeader],
    ) -> Result<Box<dyn Read + Send>, TransportError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        let mut request = self.client.get(url);
        for header in headers {
            request = request.header(header.name.as_str(), header.value.as_str());
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(Box::new(response))
    }
}
