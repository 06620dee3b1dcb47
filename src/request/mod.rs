//! Request lifecycle.
//!
//! # Data Flow
//! ```text
//! Session::submit
//!     → inner.rs (RequestInner: Initialized)
//!     → session driver: Adapting → Ready → Running
//!     → transport events: response head, body chunks, completion
//!     → validation.rs (acceptance criteria)
//!     → retry loop back to Adapting, or finish
//!     → delivery.rs (decode, then hand the single outcome to the caller)
//!     → handle.rs (DataRequest<T> future / StreamRequest stream)
//! ```
//!
//! # Design Decisions
//! - The caller's handle owns the request; the session only keeps weak
//!   references, so dropping every handle cancels the task
//! - Finishing is guarded by an atomic flag: exactly one delivery even under
//!   concurrent completion signals
//! - Cancellation always wins over any outcome not yet delivered

pub mod delivery;
pub mod handle;
pub mod inner;
pub mod state;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};

pub use delivery::StreamEvent;
pub use handle::{DataRequest, RequestHandle, StreamRequest};
pub use inner::RequestOptions;
pub use state::{Progress, RequestState};
pub use validation::{Validation, ValidationFailure};

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique, monotonically increasing request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}
