//! Transport implementations.
//!
//! # Data Flow
//! ```text
//! Transport::start(task)
//!     → client.rs: policy lookup in store.rs (CachePolicy + freshness)
//!     → hit: response head + body from the store, no network
//!     → miss: hyper-util client request
//!         → 3xx: redirect proposal → follow or deliver
//!         → 401: challenge → retry with credential or deliver
//!         → response head → body chunks → storage proposal → store.rs
//!     → task_completed (exactly once)
//! ```
//!
//! # Design Decisions
//! - Task control (pause/resume/cancel) is a watch channel per task
//! - No callback runs while a task-table guard is held

pub mod client;
pub mod store;

pub use client::HyperTransport;
pub use store::ResponseStore;
