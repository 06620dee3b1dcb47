//! Response caching decisions and HTTP freshness rules.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::DateTime;

use crate::http::{HeaderSet, Method, RequestDescriptor, ResponseHead};

/// A response as held in (or proposed for) a response store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub head: ResponseHead,
    pub body: Bytes,
    pub stored_at: SystemTime,
}

impl CachedResponse {
    pub fn new(head: ResponseHead, body: Bytes) -> Self {
        Self {
            head,
            body,
            stored_at: SystemTime::now(),
        }
    }
}

/// Answer to a proposed cache write.
#[derive(Debug, Clone)]
pub enum CacheDisposition {
    Store(CachedResponse),
    DoNotStore,
}

impl CacheDisposition {
    pub fn is_store(&self) -> bool {
        matches!(self, CacheDisposition::Store(_))
    }
}

/// Decides whether a response is written to the store.
pub trait CacheHandler: Send + Sync {
    fn cache(&self, proposed: CachedResponse, request: &RequestDescriptor) -> CacheDisposition;
}

type ModifyFn = dyn Fn(CachedResponse) -> Option<CachedResponse> + Send + Sync;

#[derive(Clone)]
enum Behavior {
    Store,
    DoNotStore,
    Modify(Arc<ModifyFn>),
}

/// Stock [`CacheHandler`].
#[derive(Clone)]
pub struct ResponseCacher {
    behavior: Behavior,
}

impl ResponseCacher {
    pub fn cache() -> Self {
        Self {
            behavior: Behavior::Store,
        }
    }

    pub fn do_not_cache() -> Self {
        Self {
            behavior: Behavior::DoNotStore,
        }
    }

    /// Rewrite the proposal; returning `None` skips the write.
    pub fn modify<F>(f: F) -> Self
    where
        F: Fn(CachedResponse) -> Option<CachedResponse> + Send + Sync + 'static,
    {
        Self {
            behavior: Behavior::Modify(Arc::new(f)),
        }
    }
}

impl CacheHandler for ResponseCacher {
    fn cache(&self, proposed: CachedResponse, _request: &RequestDescriptor) -> CacheDisposition {
        match &self.behavior {
            Behavior::Store => CacheDisposition::Store(proposed),
            Behavior::DoNotStore => CacheDisposition::DoNotStore,
            Behavior::Modify(f) => f(proposed).map_or(CacheDisposition::DoNotStore, CacheDisposition::Store),
        }
    }
}

impl fmt::Debug for ResponseCacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let behavior = match self.behavior {
            Behavior::Store => "cache",
            Behavior::DoNotStore => "do_not_cache",
            Behavior::Modify(_) => "modify",
        };
        f.debug_struct("ResponseCacher").field("behavior", &behavior).finish()
    }
}

/// Parsed `Cache-Control` directives relevant to a private cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    pub fn parse(headers: &HeaderSet) -> Self {
        let mut directives = CacheControl::default();
        let Some(value) = headers.get("cache-control") else {
            return directives;
        };

        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (directive, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "no-store" => directives.no_store = true,
                "no-cache" => directives.no_cache = true,
                "max-age" => directives.max_age = arg.and_then(|a| a.parse().ok()),
                _ => {}
            }
        }
        directives
    }
}

/// Statuses a cache may store without extra directives.
const CACHEABLE_STATUSES: [u16; 10] = [200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

/// Whether a response to `request` may be written to the store at all.
pub fn is_storable(request: &RequestDescriptor, head: &ResponseHead) -> bool {
    if *request.method() != Method::Get || !CACHEABLE_STATUSES.contains(&head.status) {
        return false;
    }
    !CacheControl::parse(request.headers()).no_store && !CacheControl::parse(&head.headers).no_store
}

/// Whether the request asks to bypass stored responses.
pub fn request_bypasses_cache(headers: &HeaderSet) -> bool {
    let control = CacheControl::parse(headers);
    control.no_cache
        || control.no_store
        || control.max_age == Some(0)
        || headers
            .get("pragma")
            .is_some_and(|p| p.to_ascii_lowercase().contains("no-cache"))
}

fn http_date(headers: &HeaderSet, name: &str) -> Option<SystemTime> {
    let value = headers.get(name)?;
    let parsed = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let secs = u64::try_from(parsed.timestamp()).ok()?;
    Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}

/// How long a stored response stays fresh, if it says so explicitly.
/// `received` stands in for a missing `Date` header.
pub fn freshness_lifetime(head: &ResponseHead, received: SystemTime) -> Option<Duration> {
    let control = CacheControl::parse(&head.headers);
    if control.no_store || control.no_cache {
        return Some(Duration::ZERO);
    }
    if let Some(max_age) = control.max_age {
        return Some(Duration::from_secs(max_age));
    }

    // An unparseable Expires means "already expired".
    head.headers.get("expires")?;
    let Some(expires) = http_date(&head.headers, "expires") else {
        return Some(Duration::ZERO);
    };
    let date = http_date(&head.headers, "date").unwrap_or(received);
    Some(expires.duration_since(date).unwrap_or(Duration::ZERO))
}

/// Whether `entry` can be served at `now` without contacting the origin.
pub fn is_fresh(entry: &CachedResponse, now: SystemTime) -> bool {
    let Some(lifetime) = freshness_lifetime(&entry.head, entry.stored_at) else {
        return false;
    };
    let age_header = entry
        .head
        .headers
        .get("age")
        .and_then(|a| a.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_default();
    let resident = now.duration_since(entry.stored_at).unwrap_or_default();
    age_header + resident < lifetime
}
