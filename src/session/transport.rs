//! The transport capability the session drives.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TransportError;
use crate::http::RequestDescriptor;
use crate::session::TransportEvents;

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of one transport-level task (one attempt of a request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a process-unique task ID.
    pub fn next() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Opens sockets, speaks HTTP and reports back through [`TransportEvents`].
///
/// Contract:
/// - `create_task` must not emit events; `start` begins the work
/// - events for one task arrive in order: response head, data, completion
/// - every started or cancelled task reports `task_completed` exactly once
/// - control calls on unknown or finished tasks are no-ops
pub trait Transport: Send + Sync {
    fn create_task(&self, descriptor: &RequestDescriptor, events: TransportEvents) -> Result<TaskId, TransportError>;

    fn start(&self, task: TaskId);

    fn cancel(&self, task: TaskId);

    fn pause(&self, task: TaskId);

    fn resume(&self, task: TaskId);
}
