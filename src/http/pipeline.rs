//! Deferred middleware pipeline.
//!
//! # Responsibilities
//! - Collect middleware from the built-ins and from middleware hooks
//! - Apply it after all routes exist, so every route is wrapped
//!
//! # Ordering
//! ```text
//! request → built-ins → first registered → ... → last registered → handler
//! ```
//!
//! `Router::layer` only wraps routes added before it, and the last layer
//! added is the outermost. The pipeline records layers in registration
//! order and replays them in reverse once routing is complete.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::Route;
use axum::Router;
use tower::{Layer, Service};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::recovery;
use crate::observability::metrics;

type Wrapper = Box<dyn FnOnce(Router) -> Router + Send>;

/// Ordered list of router wrappers.
#[derive(Default)]
pub struct Pipeline {
    wrappers: Vec<Wrapper>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in middleware: request id, tracing, request metrics, panic
    /// recovery, permissive CORS and the request timeout.
    #[allow(deprecated)]
    pub fn with_builtins(request_timeout: Duration) -> Self {
        let mut pipeline = Self::new();
        pipeline
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(axum::middleware::from_fn(metrics::track_requests))
            .layer(CatchPanicLayer::custom(recovery::handle_panic))
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(request_timeout));
        pipeline
    }

    /// Append a tower layer.
    pub fn layer<L>(&mut self, layer: L) -> &mut Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.wrap(move |router| router.layer(layer))
    }

    /// Append an arbitrary router transformation.
    pub fn wrap<F>(&mut self, wrapper: F) -> &mut Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.wrappers.push(Box::new(wrapper));
        self
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Wrap `router`; the first appended layer ends up outermost.
    pub fn apply(self, router: Router) -> Router {
        self.wrappers
            .into_iter()
            .rev()
            .fold(router, |router, wrap| wrap(router))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("layers", &self.wrappers.len())
            .finish()
    }
}
