//! Delivery of queued operations to the remote service

mod dispatcher;
mod endpoint;
mod transport;

pub use dispatcher::{classify_status, DispatchOutcome, Dispatcher, StatusClass};
pub use endpoint::{Endpoint, EndpointResolver, HttpMethod, StaticEndpointResolver, SCOPE_PLACEHOLDER};
pub use transport::{
    DispatchRequest, HttpTransport, Transport, TransportError, TransportResponse,
    IDEMPOTENCY_KEY_HEADER, OPERATION_ID_HEADER, SYNC_REQUEST_HEADER,
};
