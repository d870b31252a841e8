//! Health-check listener.
//!
//! # Responsibilities
//! - Serve `GET <uri>` on a dedicated port
//! - Report 200 `ok` while the server is serving, 503 otherwise
//!
//! # Design Decisions
//! - Separate listener so probes keep working while the main listener is
//!   saturated or draining
//! - Reads the lifecycle state directly; holds no reference to the server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::lifecycle::{LifecycleState, StateCell};
use crate::net::ListenerError;

/// Health-check listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSettings {
    pub addr: SocketAddr,
    pub uri: String,
}

impl HealthCheckSettings {
    /// Settings for `uri` on all interfaces at `port`.
    pub fn new(port: u16, uri: impl Into<String>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            uri: uri.into(),
        }
    }

    /// Route path, with a leading slash added when missing.
    pub fn path(&self) -> String {
        if self.uri.starts_with('/') {
            self.uri.clone()
        } else {
            format!("/{}", self.uri)
        }
    }
}

async fn health(State(state): State<Arc<StateCell>>) -> (StatusCode, &'static str) {
    match state.get() {
        LifecycleState::Serving => (StatusCode::OK, "ok"),
        other => {
            tracing::debug!(state = %other, "Health check while not serving");
            (StatusCode::SERVICE_UNAVAILABLE, other.as_str())
        }
    }
}

/// Router answering health checks for `state`.
pub fn router(settings: &HealthCheckSettings, state: Arc<StateCell>) -> Router {
    Router::new()
        .route(&settings.path(), get(health))
        .with_state(state)
}

/// Bind the health listener and serve it in the background.
///
/// Returns the bound address and the task serving it.
pub async fn spawn(
    settings: &HealthCheckSettings,
    state: Arc<StateCell>,
) -> Result<(SocketAddr, JoinHandle<()>), ListenerError> {
    let listener = TcpListener::bind(settings.addr)
        .await
        .map_err(|source| ListenerError::Bind {
            addr: settings.addr,
            source,
        })?;
    let addr = listener.local_addr().unwrap_or(settings.addr);
    let app = router(settings, state);

    tracing::info!(address = %addr, uri = %settings.path(), "Health check listener started");
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Health check listener failed");
        }
    });
    Ok((addr, task))
}
