//! HTTP value types.
//!
//! # Data Flow
//! ```text
//! caller
//!     → descriptor.rs (RequestDescriptor: method, url, headers, body, policy)
//!     → [adapting stage produces new descriptors per attempt]
//!     → transport
//!     → response.rs (ResponseHead, Response<T>)
//!     → caller
//! ```
//!
//! # Design Decisions
//! - Plain values, no I/O; safe to share across threads without locking
//! - Headers keep insertion order and compare names case-insensitively

pub mod descriptor;
pub mod headers;
pub mod method;
pub mod response;

pub use descriptor::{BodySource, CachePolicy, RequestDescriptor, StreamFactory};
pub use headers::{Header, HeaderSet};
pub use method::Method;
pub use response::{Response, ResponseHead};
