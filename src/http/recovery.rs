//! Panic recovery for request handlers.
//!
//! A panicking handler yields a single 500 response and one `error` record
//! with the panic message and a backtrace. The connection, the listener
//! and every other request carry on.

use std::any::Any;
use std::backtrace::Backtrace;

use axum::body::Body;
use axum::http::{header, Response, StatusCode};

use crate::observability::metrics;

/// A recovered handler panic.
#[derive(Debug, Clone, thiserror::Error)]
#[error("handler panicked: {message}")]
pub struct RequestPanic {
    pub message: String,
}

impl RequestPanic {
    /// Extract the message from a panic payload.
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Panic handler for `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let panic = RequestPanic::from_payload(payload.as_ref());
    let backtrace = Backtrace::force_capture();
    tracing::error!(
        error = %panic,
        stacktrace = %backtrace,
        "Recovered from handler panic"
    );
    metrics::record_panic();

    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
