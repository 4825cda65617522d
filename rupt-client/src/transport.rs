//! Authenticated request/response exchange with the Rupt service
//!
//! A transport failure never surfaces as an error: the call resolves with no
//! body and the failure is logged. Only a missing client id is an error, and
//! it is raised before any I/O.

use async_trait::async_trait;
use rupt_core::{config_error, Credentials, ErrorContext, RuptError, RuptResult};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A request ready to send. The body is already JSON-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Encode `body` as JSON. Fails with an encoding error before any I/O.
    pub fn post<T: Serialize + ?Sized>(path: impl Into<String>, body: &T) -> RuptResult<Self> {
        let encoded = serde_json::to_vec(body).map_err(|e| RuptError::Encoding {
            message: format!("Failed to encode request body: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("transport").with_operation("encode_body"),
        })?;

        Ok(Self {
            method: Method::Post,
            path: path.into(),
            body: Some(encoded),
        })
    }

    /// Decoded body, for assertions in tests and debug logging
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// Request/response seam between device operations and the network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`. `Ok(None)` means the call did not complete.
    async fn request(
        &self,
        credentials: Option<&Credentials>,
        request: ApiRequest,
    ) -> RuptResult<Option<Vec<u8>>>;
}

/// Reject absent credentials or an empty client id
pub fn require_credentials(credentials: Option<&Credentials>) -> RuptResult<&Credentials> {
    match credentials {
        Some(creds) if !creds.client_id.is_empty() => Ok(creds),
        _ => Err(config_error!(
            "clientID must not be nil",
            "transport",
            "require_credentials",
            suggestion = "Call configure() with a client id before any network call"
        )),
    }
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> RuptResult<Self> {
        let client = create_http_client(timeout_seconds)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// HTTP client with the JSON headers every call carries
pub fn create_http_client(timeout_seconds: u64) -> RuptResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("rupt-rust/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()
        .map_err(|e| RuptError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        credentials: Option<&Credentials>,
        request: ApiRequest,
    ) -> RuptResult<Option<Vec<u8>>> {
        let credentials = require_credentials(credentials)?;
        let url = self.url_for(&request.path);

        debug!(method = request.method.as_str(), path = %request.path, "Sending request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let mut builder = builder.header(
            reqwest::header::AUTHORIZATION,
            credentials.authorization_value(),
        );
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %request.path, error = %e, "Request failed");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                path = %request.path,
                status = status.as_u16(),
                "Service returned an error status"
            );
        }

        match response.bytes().await {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(e) => {
                warn!(path = %request.path, error = %e, "Failed to read response body");
                Ok(None)
            }
        }
    }
}
