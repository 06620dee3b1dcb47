//! Redirect handling.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::http::{Method, RequestDescriptor, ResponseHead};

/// Maximum redirect hops a transport follows for one task.
pub const MAX_REDIRECTS: usize = 10;

/// Answer to a proposed redirect.
#[derive(Debug, Clone)]
pub enum RedirectDisposition {
    /// Follow with the given (possibly modified) descriptor.
    Follow(RequestDescriptor),
    /// Stop and hand the redirect response itself to the request.
    DoNotFollow,
}

/// Decides whether a redirect hop is followed.
pub trait RedirectHandler: Send + Sync {
    fn redirect(&self, proposed: RequestDescriptor, response: &ResponseHead) -> RedirectDisposition;
}

type ModifyFn = dyn Fn(RequestDescriptor, &ResponseHead) -> Option<RequestDescriptor> + Send + Sync;

#[derive(Clone)]
enum Behavior {
    Follow,
    DoNotFollow,
    Modify(Arc<ModifyFn>),
}

/// Stock [`RedirectHandler`].
#[derive(Clone)]
pub struct Redirector {
    behavior: Behavior,
}

impl Redirector {
    pub fn follow() -> Self {
        Self {
            behavior: Behavior::Follow,
        }
    }

    pub fn do_not_follow() -> Self {
        Self {
            behavior: Behavior::DoNotFollow,
        }
    }

    /// Rewrite each hop; returning `None` stops following.
    pub fn modify<F>(f: F) -> Self
    where
        F: Fn(RequestDescriptor, &ResponseHead) -> Option<RequestDescriptor> + Send + Sync + 'static,
    {
        Self {
            behavior: Behavior::Modify(Arc::new(f)),
        }
    }
}

impl RedirectHandler for Redirector {
    fn redirect(&self, proposed: RequestDescriptor, response: &ResponseHead) -> RedirectDisposition {
        match &self.behavior {
            Behavior::Follow => RedirectDisposition::Follow(proposed),
            Behavior::DoNotFollow => RedirectDisposition::DoNotFollow,
            Behavior::Modify(f) => match f(proposed, response) {
                Some(descriptor) => RedirectDisposition::Follow(descriptor),
                None => RedirectDisposition::DoNotFollow,
            },
        }
    }
}

impl fmt::Debug for Redirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let behavior = match self.behavior {
            Behavior::Follow => "follow",
            Behavior::DoNotFollow => "do_not_follow",
            Behavior::Modify(_) => "modify",
        };
        f.debug_struct("Redirector").field("behavior", &behavior).finish()
    }
}

pub fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Build the descriptor a transport proposes for a redirect response.
///
/// 303 always becomes a bodiless GET, as does a POST answered with 301 or
/// 302. 307/308 keep method and body. Credentials are not carried to a
/// different host.
pub fn propose_redirect(current: &RequestDescriptor, response: &ResponseHead) -> Option<RequestDescriptor> {
    if !is_redirect_status(response.status) {
        return None;
    }
    let location = response.headers.get("location")?;
    let base = Url::parse(&response.url).or_else(|_| current.resolve_url()).ok()?;
    let target = base.join(location.trim()).ok()?;

    let mut proposed = current.clone().with_url(target.to_string());

    let rewrite_to_get = match response.status {
        303 => !matches!(current.method(), Method::Head),
        301 | 302 => matches!(current.method(), Method::Post),
        _ => false,
    };
    if rewrite_to_get {
        proposed = proposed
            .with_method(Method::Get)
            .without_body()
            .without_header("content-type")
            .without_header("content-length");
    }

    if base.host_str() != target.host_str() || base.port_or_known_default() != target.port_or_known_default() {
        proposed = proposed.without_header("authorization").without_header("cookie");
    }

    Some(proposed)
}
