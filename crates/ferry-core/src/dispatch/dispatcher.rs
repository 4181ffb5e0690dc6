//! Single-operation dispatch and outcome classification

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connectivity::ConnectivityMonitor;
use crate::models::SyncOperation;

use super::{DispatchRequest, EndpointResolver, Transport, TransportError};

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    /// Worth trying again later
    Retryable(String),
    /// Will never succeed; skip remaining attempts
    Fatal(String),
}

impl DispatchOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// How an HTTP status is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Fatal,
}

/// Classify an HTTP status code.
///
/// 408, 425 and 429 are client-side codes that describe transient conditions,
/// so they retry along with 5xx. Every other 4xx is a rejection.
pub const fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        408 | 425 | 429 => StatusClass::Retryable,
        400..=499 => StatusClass::Fatal,
        _ => StatusClass::Retryable,
    }
}

/// Sends one operation and reports what happened. Holds no queue state.
pub struct Dispatcher<T> {
    transport: T,
    resolver: Arc<dyn EndpointResolver>,
    connectivity: Arc<ConnectivityMonitor>,
    timeout_ms: AtomicU64,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        transport: T,
        resolver: Arc<dyn EndpointResolver>,
        connectivity: Arc<ConnectivityMonitor>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            connectivity,
            timeout_ms: AtomicU64::new(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn resolver(&self) -> &dyn EndpointResolver {
        self.resolver.as_ref()
    }

    /// Deliver `operation` once.
    pub async fn dispatch(&self, operation: &SyncOperation) -> DispatchOutcome {
        if !self.connectivity.is_online() {
            return DispatchOutcome::Retryable(TransportError::Offline.to_string());
        }

        let Some(endpoint) = self.resolver.resolve(operation.kind) else {
            return DispatchOutcome::Fatal(format!("no endpoint for {}", operation.kind));
        };
        let url = match endpoint.render(operation.scope.as_deref()) {
            Ok(url) => url,
            Err(error) => return DispatchOutcome::Fatal(error.to_string()),
        };

        let request = DispatchRequest {
            operation_id: operation.id,
            method: endpoint.method,
            url,
            body: operation.payload.clone(),
        };
        tracing::debug!(
            "Dispatching {} {} {} ({})",
            operation.id,
            request.method,
            request.url,
            operation.kind
        );

        let result = tokio::time::timeout(self.timeout(), self.transport.send(request))
            .await
            .unwrap_or(Err(TransportError::Timeout));

        match result {
            Ok(response) => match classify_status(response.status) {
                StatusClass::Success => DispatchOutcome::Success,
                StatusClass::Retryable => {
                    DispatchOutcome::Retryable(http_reason(response.status, &response.body))
                }
                StatusClass::Fatal => {
                    DispatchOutcome::Fatal(http_reason(response.status, &response.body))
                }
            },
            // Still replayed: the server de-duplicates on the operation id
            Err(error) if error.is_ambiguous() && !endpoint.retry_safe => {
                tracing::warn!(
                    "{} ({}) may already be applied; replaying with the same operation id",
                    operation.id,
                    operation.kind
                );
                DispatchOutcome::Retryable(format!(
                    "{error}; may already be applied, replayed under the same operation id"
                ))
            }
            Err(error) => DispatchOutcome::Retryable(error.to_string()),
        }
    }
}

fn http_reason(status: u16, body: &str) -> String {
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Endpoint, HttpMethod, StaticEndpointResolver, TransportResponse};
    use crate::models::OperationKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a fixed result and records every request.
    struct FixedTransport {
        reply: std::result::Result<TransportResponse, TransportError>,
        delay: Duration,
        seen: Mutex<Vec<DispatchRequest>>,
    }

    impl FixedTransport {
        fn status(status: u16) -> Self {
            Self::result(Ok(TransportResponse {
                status,
                body: String::new(),
            }))
        }

        fn result(reply: std::result::Result<TransportResponse, TransportError>) -> Self {
            Self {
                reply,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for FixedTransport {
        async fn send(
            &self,
            request: DispatchRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    fn dispatcher(transport: FixedTransport, online: bool) -> Dispatcher<FixedTransport> {
        Dispatcher::new(
            transport,
            Arc::new(StaticEndpointResolver::with_defaults("https://api.example.com")),
            Arc::new(ConnectivityMonitor::new(online)),
            Duration::from_secs(15),
        )
    }

    fn lineup() -> SyncOperation {
        SyncOperation::new(OperationKind::LineupChange, json!({"slot": "QB"}), 5, 0)
            .with_scope("league-1")
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(204), StatusClass::Success);
        assert_eq!(classify_status(400), StatusClass::Fatal);
        assert_eq!(classify_status(422), StatusClass::Fatal);
        assert_eq!(classify_status(429), StatusClass::Retryable);
        assert_eq!(classify_status(408), StatusClass::Retryable);
        assert_eq!(classify_status(500), StatusClass::Retryable);
        assert_eq!(classify_status(503), StatusClass::Retryable);
        assert_eq!(classify_status(302), StatusClass::Retryable);
    }

    #[tokio::test]
    async fn success_builds_request_from_endpoint() {
        let dispatcher = dispatcher(FixedTransport::status(200), true);
        let operation = lineup();

        assert_eq!(dispatcher.dispatch(&operation).await, DispatchOutcome::Success);

        let seen = dispatcher.transport().seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].operation_id, operation.id);
        assert_eq!(seen[0].method, HttpMethod::Put);
        assert_eq!(
            seen[0].url,
            "https://api.example.com/api/leagues/league-1/lineup"
        );
        assert_eq!(seen[0].body, json!({"slot": "QB"}));
    }

    #[tokio::test]
    async fn offline_fails_fast_without_sending() {
        let dispatcher = dispatcher(FixedTransport::status(200), false);
        let outcome = dispatcher.dispatch(&lineup()).await;

        assert_eq!(outcome, DispatchOutcome::Retryable("offline".to_string()));
        assert!(dispatcher.transport().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_rejection_is_fatal() {
        let dispatcher = dispatcher(
            FixedTransport::result(Ok(TransportResponse {
                status: 422,
                body: "bad slot".to_string(),
            })),
            true,
        );
        assert_eq!(
            dispatcher.dispatch(&lineup()).await,
            DispatchOutcome::Fatal("HTTP 422: bad slot".to_string())
        );
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let dispatcher = dispatcher(FixedTransport::status(503), true);
        assert_eq!(
            dispatcher.dispatch(&lineup()).await,
            DispatchOutcome::Retryable("HTTP 503".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retryable_for_retry_safe_kinds() {
        let mut transport = FixedTransport::status(200);
        transport.delay = Duration::from_secs(60);
        let dispatcher = dispatcher(transport, true);

        assert_eq!(
            dispatcher.dispatch(&lineup()).await,
            DispatchOutcome::Retryable("request timed out".to_string())
        );
    }

    #[tokio::test]
    async fn ambiguous_failure_is_retried_when_not_retry_safe() {
        let dispatcher = dispatcher(
            FixedTransport::result(Err(TransportError::Request("reset".to_string()))),
            true,
        );
        let chat = SyncOperation::new(OperationKind::ChatMessage, json!({}), 5, 0)
            .with_scope("league-1");

        match dispatcher.dispatch(&chat).await {
            DispatchOutcome::Retryable(reason) => {
                assert!(reason.starts_with("request failed: reset"), "{reason}");
                assert!(reason.contains("may already be applied"), "{reason}");
            }
            other => panic!("expected a retry, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retryable_when_not_retry_safe() {
        let mut transport = FixedTransport::status(200);
        transport.delay = Duration::from_secs(60 * 60);
        let dispatcher = dispatcher(transport, true);
        let chat = SyncOperation::new(OperationKind::ChatMessage, json!({}), 5, 0)
            .with_scope("league-1");

        assert!(matches!(
            dispatcher.dispatch(&chat).await,
            DispatchOutcome::Retryable(reason) if reason.starts_with("request timed out")
        ));
    }

    #[tokio::test]
    async fn connect_failure_stays_retryable_when_not_retry_safe() {
        let dispatcher = dispatcher(
            FixedTransport::result(Err(TransportError::Connect("refused".to_string()))),
            true,
        );
        let chat = SyncOperation::new(OperationKind::ChatMessage, json!({}), 5, 0)
            .with_scope("league-1");

        assert!(matches!(
            dispatcher.dispatch(&chat).await,
            DispatchOutcome::Retryable(_)
        ));
    }

    #[tokio::test]
    async fn unmapped_kind_is_fatal() {
        let dispatcher = Dispatcher::new(
            FixedTransport::status(200),
            Arc::new(StaticEndpointResolver::new().with_route(
                OperationKind::ChatMessage,
                Endpoint::new("https://x/chat", HttpMethod::Post),
            )),
            Arc::new(ConnectivityMonitor::new(true)),
            Duration::from_secs(1),
        );

        assert!(matches!(
            dispatcher.dispatch(&lineup()).await,
            DispatchOutcome::Fatal(_)
        ));
    }

    #[test]
    fn timeout_can_be_updated() {
        let dispatcher = dispatcher(FixedTransport::status(200), true);
        dispatcher.set_timeout(Duration::from_secs(3));
        assert_eq!(dispatcher.timeout(), Duration::from_secs(3));
    }
}
