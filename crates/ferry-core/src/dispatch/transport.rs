//! Network transport for dispatching operations

use std::future::Future;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::models::OperationId;
use crate::util::compact_text;

use super::HttpMethod;

/// Header carrying the operation id for server-side de-duplication.
pub const OPERATION_ID_HEADER: &str = "X-Operation-Id";
/// Marks requests replayed from the offline queue.
pub const SYNC_REQUEST_HEADER: &str = "X-Sync-Request";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// A fully resolved request for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub operation_id: OperationId,
    pub method: HttpMethod,
    pub url: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Faults below the HTTP status level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Known to be offline; nothing was sent
    #[error("offline")]
    Offline,
    /// The connection could not be established; nothing was sent
    #[error("connection failed: {0}")]
    Connect(String),
    /// No response within the dispatch timeout
    #[error("request timed out")]
    Timeout,
    /// Failed after the request may have reached the server
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether the server may have applied the request.
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout | Self::Request(_))
    }
}

/// Sends one request and reports the raw response.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: DispatchRequest,
    ) -> impl Future<Output = std::result::Result<TransportResponse, TransportError>> + Send;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport without a client-level timeout.
    ///
    /// Each request is bounded by the dispatcher, whose timeout can be
    /// changed while the queue runs.
    pub fn new(auth_token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(SYNC_REQUEST_HEADER, HeaderValue::from_static("true"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| {
                Error::Configuration(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            auth_token: auth_token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn classify_error(error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

impl Transport for HttpTransport {
    async fn send(
        &self,
        request: DispatchRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let id = request.operation_id.to_string();

        let mut builder = self
            .client
            .request(method, &request.url)
            .header(OPERATION_ID_HEADER, &id)
            .header(IDEMPOTENCY_KEY_HEADER, &id)
            .json(&request.body);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| Self::classify_error(&error))?;
        let status = response.status().as_u16();
        // The status decides the outcome; a body that fails to read only loses detail
        let body = response.text().await.unwrap_or_default();

        Ok(TransportResponse {
            status,
            body: compact_text(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguity_of_transport_errors() {
        assert!(!TransportError::Offline.is_ambiguous());
        assert!(!TransportError::Connect("refused".to_string()).is_ambiguous());
        assert!(TransportError::Timeout.is_ambiguous());
        assert!(TransportError::Request("reset".to_string()).is_ambiguous());
    }

    #[test]
    fn debug_redacts_token() {
        let transport = HttpTransport::new(Some("secret-token".to_string())).unwrap();
        let debug = format!("{transport:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn blank_token_is_dropped() {
        let transport = HttpTransport::new(Some("  ".to_string())).unwrap();
        assert!(transport.auth_token.is_none());
    }
}
