//! Registry transport
//!
//! The registry is reached through plain request/response exchanges keyed by
//! verb, path segments and a form-encoded body. [`HttpRegistryTransport`] carries them
//! over HTTP; tests substitute [`ScriptedRegistry`](crate::testing::ScriptedRegistry).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{RegistryError, RegistryResult};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Request verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMethod {
    Post,
    Put,
}

impl fmt::Display for RegistryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryMethod::Post => f.write_str("POST"),
            RegistryMethod::Put => f.write_str("PUT"),
        }
    }
}

/// A request to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRequest {
    pub method: RegistryMethod,
    /// Unencoded path segments, relative to the registry base URL
    pub segments: Vec<String>,
    /// Form fields, sent as `application/x-www-form-urlencoded`
    pub form: Vec<(String, String)>,
}

impl RegistryRequest {
    pub fn new(method: RegistryMethod, segments: &[&str], form: Vec<(String, String)>) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            form,
        }
    }

    /// Unencoded path, for logs and assertions
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Value of a form field, if present
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw registry response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryResponse {
    pub status: u16,
    pub body: String,
}

/// Carries registry requests to the remote side
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn execute(&self, request: RegistryRequest) -> RegistryResult<RegistryResponse>;
}

/// Registry transport over HTTP
#[derive(Debug, Clone)]
pub struct HttpRegistryTransport {
    client: Client,
    base_url: Url,
}

impl HttpRegistryTransport {
    /// Create a transport for the registry at `base_url` (e.g. "http://mysensors:4711")
    pub fn new(base_url: &str) -> RegistryResult<Self> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_config(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of a resource below the base URL
    ///
    /// Any path prefix of the base URL is kept. Each segment is
    /// percent-encoded, so `/`, `?` and `#` in an id stay inside it.
    pub fn endpoint<I>(&self, segments: I) -> RegistryResult<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RegistryTransport for HttpRegistryTransport {
    async fn execute(&self, request: RegistryRequest) -> RegistryResult<RegistryResponse> {
        let url = self.endpoint(&request.segments)?;
        debug!(method = %request.method, %url, "Registry request");

        let builder = match request.method {
            RegistryMethod::Post => self.client.post(url),
            RegistryMethod::Put => self.client.put(url),
        };
        let response = builder.form(&request.form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(RegistryResponse { status, body })
    }
}
