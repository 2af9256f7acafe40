//! The invocation seam between the router and whatever transport
//! actually reaches a backend.
//!
//! The router never opens connections itself. Each backend is paired
//! with an [`Invoker`], an opaque capability that carries a request to
//! that one backend and returns its response or failure. Anything that
//! can produce a future fits: an HTTP client wrapper, an in-process
//! service, or a simulated backend in tests.

use futures::future::BoxFuture;
use std::future::Future;

/// Boxed error returned by invokers.
///
/// Invokers report transport- or application-level failures through
/// this type; the router only cares that a failure happened, never why.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A capability that delivers one request to one backend.
///
/// `Q` is the request payload and `S` the response payload; both are
/// opaque to the router. Implementations must be safe to call
/// concurrently, since a backend can have many requests in flight.
pub trait Invoker<Q, S>: Send + Sync {
    /// Deliver `request` to the backend this invoker is bound to.
    fn invoke(&self, request: Q) -> BoxFuture<'_, Result<S, BoxError>>;
}

/// Wrap an async closure as an [`Invoker`].
///
/// Convenient for tests and small programs:
///
/// ```
/// use rudder::{invoker_fn, BoxError};
///
/// let echo = invoker_fn(|req: String| async move { Ok::<_, BoxError>(req) });
/// # let _ = echo;
/// ```
pub fn invoker_fn<F>(f: F) -> FnInvoker<F> {
    FnInvoker { f }
}

/// [`Invoker`] implementation backed by a closure. See [`invoker_fn`].
pub struct FnInvoker<F> {
    f: F,
}

impl<Q, S, F, Fut> Invoker<Q, S> for FnInvoker<F>
where
    F: Fn(Q) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, BoxError>> + Send + 'static,
{
    fn invoke(&self, request: Q) -> BoxFuture<'_, Result<S, BoxError>> {
        Box::pin((self.f)(request))
    }
}
