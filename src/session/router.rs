//! Task → request routing table.
//!
//! # Responsibilities
//! - Map the live task of every in-flight request back to it
//! - Track every outstanding request so invalidation can fail all of them
//!
//! # Design Decisions
//! - Holds only weak references; the caller's handle owns the request
//! - One mutex guards both maps so `rebind` is atomic with respect to lookups

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::request::inner::RequestInner;
use crate::request::RequestId;
use crate::session::TaskId;

#[derive(Default)]
struct Routes {
    tasks: HashMap<TaskId, Weak<RequestInner>>,
    requests: HashMap<RequestId, Weak<RequestInner>>,
}

#[derive(Default)]
pub(crate) struct TaskRouter {
    routes: Mutex<Routes>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().expect("task router mutex poisoned")
    }

    /// Start tracking a request that has no task yet.
    pub fn track(&self, request: &Arc<RequestInner>) {
        self.lock()
            .requests
            .insert(request.id(), Arc::downgrade(request));
    }

    pub fn register(&self, task: TaskId, request: &Arc<RequestInner>) {
        let mut routes = self.lock();
        routes.tasks.insert(task, Arc::downgrade(request));
        routes
            .requests
            .insert(request.id(), Arc::downgrade(request));
    }

    pub fn lookup(&self, task: TaskId) -> Option<Arc<RequestInner>> {
        let request = self.lock().tasks.get(&task).and_then(Weak::upgrade);
        if request.is_none() {
            tracing::trace!(task = %task, "No request registered for task");
        }
        request
    }

    pub fn unregister(&self, task: TaskId) -> bool {
        self.lock().tasks.remove(&task).is_some()
    }

    /// Swap `old` for `new` in one step.
    pub fn rebind(&self, old: Option<TaskId>, new: TaskId, request: &Arc<RequestInner>) {
        let mut routes = self.lock();
        if let Some(old) = old {
            routes.tasks.remove(&old);
        }
        routes.tasks.insert(new, Arc::downgrade(request));
        routes
            .requests
            .insert(request.id(), Arc::downgrade(request));
    }

    /// Forget a finished or dropped request and its task mapping.
    pub fn unregister_request(&self, id: RequestId, task: Option<TaskId>) {
        let mut routes = self.lock();
        routes.requests.remove(&id);
        if let Some(task) = task {
            routes.tasks.remove(&task);
        }
    }

    /// Remove everything, returning the requests that are still alive.
    pub fn drain(&self) -> Vec<Arc<RequestInner>> {
        let mut routes = self.lock();
        routes.tasks.clear();
        routes
            .requests
            .drain()
            .filter_map(|(_, request)| request.upgrade())
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestDescriptor;
    use crate::interceptor::Interceptor;
    use crate::observability::CompositeMonitor;
    use crate::request::delivery::StreamDelivery;
    use crate::request::RequestOptions;

    fn request() -> Arc<RequestInner> {
        let (delivery, _receiver) = StreamDelivery::new();
        Arc::new(RequestInner::new(
            RequestDescriptor::get("http://example.com"),
            Interceptor::new(),
            RequestOptions::default(),
            Arc::new(CompositeMonitor::default()),
            Weak::new(),
            Box::new(delivery),
        ))
    }

    #[test]
    fn test_register_lookup_unregister() {
        let router = TaskRouter::new();
        let request = request();
        let task = TaskId::next();

        router.register(task, &request);
        assert_eq!(router.lookup(task).map(|r| r.id()), Some(request.id()));
        assert!(router.unregister(task));
        assert!(router.lookup(task).is_none());
        assert_eq!(router.request_count(), 1);
    }

    #[test]
    fn test_rebind_keeps_single_mapping() {
        let router = TaskRouter::new();
        let request = request();
        let (first, second) = (TaskId::next(), TaskId::next());

        router.register(first, &request);
        router.rebind(Some(first), second, &request);

        assert_eq!(router.task_count(), 1);
        assert!(router.lookup(first).is_none());
        assert!(router.lookup(second).is_some());
    }

    #[test]
    fn test_weak_entries_do_not_keep_requests_alive() {
        let router = TaskRouter::new();
        let task = TaskId::next();
        {
            let request = request();
            router.register(task, &request);
        }
        assert!(router.lookup(task).is_none());
        assert!(router.drain().is_empty());
    }
}
