//! Courier: an HTTP client request lifecycle engine.

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod observability;
pub mod policy;
pub mod request;
pub mod resilience;
pub mod security;
pub mod session;
pub mod transport;

pub use config::schema::CourierConfig;
pub use error::{ErrorKind, RequestError, SessionError, TransportError, TransportErrorKind};
pub use http::{CachePolicy, HeaderSet, Method, RequestDescriptor, Response, ResponseHead};
pub use interceptor::{Adapter, Interceptor, Retrier, RetryDecision};
pub use request::{DataRequest, RequestHandle, RequestOptions, RequestState, StreamEvent, StreamRequest};
pub use session::{Session, SessionBuilder, TaskId, Transport, TransportEvents};
pub use transport::HyperTransport;
