//! Sessions: request factories bound to one transport.
//!
//! # Data Flow
//! ```text
//! Session::request(descriptor)
//!     → RequestInner (tracked in router.rs)
//!     → driver.rs: adapt → Transport::create_task → rebind task → start
//!
//! Transport callbacks (transport.rs contract)
//!     → delegate.rs (TransportEvents)
//!     → router.rs lookup: task → request
//!     → challenge / redirect / cache decisions, body bytes, completion
//!     → driver.rs: validate → retrier → next attempt or finish
//! ```
//!
//! # Responsibilities
//! - Own the session-level defaults: interceptor chain, redirect and cache
//!   handlers, credential provider, trust manager, monitors
//! - Route every transport event to the request that owns the task
//! - Invalidate: cancel all tasks and fail every registered request
//!
//! # Design Decisions
//! - Requests are owned by their caller handles; the session holds weak
//!   references only
//! - The transport is a trait object so tests can script one in-process

pub mod builder;
pub mod delegate;
pub(crate) mod driver;
pub(crate) mod router;
pub mod shared;
pub mod transport;

pub use builder::SessionBuilder;
pub use delegate::{ResponseDisposition, TransportEvents};
pub(crate) use shared::SessionShared;
pub use shared::Session;
pub use transport::{TaskId, Transport};
