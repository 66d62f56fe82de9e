//! Handler trait and type erasure.
//!
//! The router holds handlers of different types in one table, so each is
//! boxed behind [`ErasedHandler`]:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← plain route handler
//!        ↓ router.on(Method::Get, "/", hello)
//! Arc::new(FnHandler(hello))                       ← BoxedHandler
//!
//! Resource::builder("widgets").get(…).build()      ← resource
//!        ↓ router.api(ApiRoute::new(…), resource)
//! Arc<Resource>                                     ← also a BoxedHandler
//!
//! handler.call(req, args)  at request time          ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::api_error::ApiError;
use crate::args::Args;
use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a response or
/// the error that replaces it.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, args: Args) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Outcome conversion ────────────────────────────────────────────────────────

/// What a plain route handler may return: anything [`IntoResponse`], or a
/// `Result` whose error is an [`ApiError`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Response, Error>;
}

impl<T: IntoResponse> IntoOutcome for T {
    fn into_outcome(self) -> Result<Response, Error> {
        Ok(self.into_response())
    }
}

impl<T: IntoResponse> IntoOutcome for Result<T, ApiError> {
    fn into_outcome(self) -> Result<Response, Error> {
        self.map(IntoResponse::into_response).map_err(Error::Api)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid plain route handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// Sealed: only the blanket impl below satisfies it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    // Plain handlers read raw parameters through `Request::param`; the
    // converted arguments are only for resources.
    fn call(&self, req: Request, _args: Args) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}
