//! Redirect and cache decision points.
//!
//! # Data Flow
//! ```text
//! Transport proposes a redirect hop:
//!     → request RedirectHandler, else session default, else follow as proposed
//!     → RedirectDisposition back to the transport
//!
//! Transport proposes storing a response:
//!     → request CacheHandler, else session default, else store as proposed
//!     → CacheDisposition back to the transport
//! ```
//!
//! # Design Decisions
//! - Handlers are pure functions of (context, proposal); no side effects
//! - Freshness follows Cache-Control/Expires only, with no heuristic
//!   lifetime for responses that carry neither

pub mod cache;
pub mod redirect;

pub use cache::{CacheControl, CacheDisposition, CacheHandler, CachedResponse, ResponseCacher};
pub use redirect::{RedirectDisposition, RedirectHandler, Redirector};
