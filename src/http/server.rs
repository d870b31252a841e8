//! HTTP server and its lifecycle.
//!
//! # Responsibilities
//! - Run init options, start the health and diagnostics listeners and
//!   install signal handling when the server is created
//! - Apply hooks in order (Service → Middleware → Router) and bind
//! - Serve HTTP/1.1 with header, request and size limits
//! - Shut down exactly once: hooks, grace interval, stop accepting, drain
//!
//! # Data Flow
//! ```text
//! serve():    Created → Serving → hooks → bind → accept loop
//! shutdown(): ShuttingDown → shutdown hooks → grace → close listener
//!             → drain until deadline (abort the rest) → Stopped
//! ```
//!
//! # Design Decisions
//! - Connections are served by hyper directly rather than `axum::serve`,
//!   so the header read timeout, the header buffer limit and the
//!   forced abort at the deadline are all under our control
//! - Every connection task lives in a `JoinSet`; nothing outlives `serve`
//! - The closing deadline travels on a watch channel, so a connection
//!   accepted after the close still sees it

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use futures_util::FutureExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{watch, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tower::ServiceExt;

use crate::config::SystemConfig;
use crate::context::AppContext;
use crate::health::{self, HealthCheckSettings};
use crate::http::pipeline::Pipeline;
use crate::http::recovery::RequestPanic;
use crate::lifecycle::hooks::{
    Hook, HookKind, HookRegistry, HookResult, MiddlewareHook, RouterHook, ServiceHook,
    ShutdownHook,
};
use crate::lifecycle::{signals, InitOption, LifecycleState, ShutdownSignal, StateCell};
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;

/// Time allowed for a client to send the request head.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Time allowed for a handler to produce its response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Largest accepted request head.
pub const MAX_HEADER_BYTES: usize = 1 << 20;

// hyper rejects smaller read buffers
const MIN_BUF_SIZE: usize = 8192;

/// Error type for the server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server cannot start serving from state {0}")]
    InvalidState(LifecycleState),

    #[error("service hook {index} failed: {source}")]
    Startup {
        index: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Wait between the shutdown hooks and closing the listener.
    pub grace_interval: Duration,
    /// Bound on the whole shutdown sequence.
    pub shutdown_max_age: Duration,
    pub header_read_timeout: Duration,
    pub request_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_connections: usize,
    /// Shut down on SIGINT, SIGHUP and SIGTERM.
    pub handle_signals: bool,
    pub health_check: Option<HealthCheckSettings>,
    /// Prometheus exposition address.
    pub diagnostics_addr: Option<SocketAddr>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

impl ServerSettings {
    pub fn from_config(system: &SystemConfig) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], system.addr)),
            grace_interval: Duration::from_millis(system.grace_interval_ms),
            shutdown_max_age: Duration::from_secs(system.shutdown_max_age_secs),
            header_read_timeout: HEADER_READ_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            max_header_bytes: MAX_HEADER_BYTES,
            max_connections: system.max_connections,
            handle_signals: true,
            health_check: None,
            diagnostics_addr: None,
        }
    }
}

struct Inner {
    settings: ServerSettings,
    context: AppContext,
    hooks: Mutex<HookRegistry>,
    state: Arc<StateCell>,
    listener_done: ShutdownSignal,
    stopped: ShutdownSignal,
    close: watch::Sender<Option<Instant>>,
    bound: watch::Sender<Option<SocketAddr>>,
    shutdown_once: OnceCell<()>,
    connections: ConnectionTracker,
    health_addr: OnceLock<SocketAddr>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// HTTP server with hook registries and graceful shutdown.
///
/// Cheap to clone; every clone drives the same lifecycle.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

/// Marks the listener as finished when `serve` returns or is dropped.
struct ListenerDone<'a>(&'a ShutdownSignal);

impl Drop for ListenerDone<'_> {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

impl Server {
    /// Run `options` in order and prepare the server.
    ///
    /// Installs the signal listener (when enabled) before returning.
    pub async fn new(
        context: AppContext,
        settings: ServerSettings,
        options: Vec<InitOption>,
    ) -> Result<Self, ServerError> {
        for option in options {
            option.run(&context).await;
        }

        let (close, _) = watch::channel(None);
        let (bound, _) = watch::channel(None);
        let server = Self {
            inner: Arc::new(Inner {
                settings,
                context,
                hooks: Mutex::new(HookRegistry::new()),
                state: Arc::new(StateCell::new()),
                listener_done: ShutdownSignal::new(),
                stopped: ShutdownSignal::new(),
                close,
                bound,
                shutdown_once: OnceCell::new(),
                connections: ConnectionTracker::new(),
                health_addr: OnceLock::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let settings = &server.inner.settings;
        if let Some(addr) = settings.diagnostics_addr {
            metrics::init_metrics(addr);
        }
        if let Some(health_check) = &settings.health_check {
            match health::spawn(health_check, Arc::clone(&server.inner.state)).await {
                Ok((addr, task)) => {
                    let _ = server.inner.health_addr.set(addr);
                    server.inner.tasks.lock().push(task);
                }
                Err(e) => tracing::error!(error = %e, "Failed to start health check listener"),
            }
        }
        if settings.handle_signals {
            // Exits on its own once the server has stopped
            signals::spawn_signal_listener(server.clone())?;
        }

        Ok(server)
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.context
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Address of the health-check listener, once started.
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.inner.health_addr.get().copied()
    }

    /// Connections currently open on the main listener.
    pub fn active_connections(&self) -> u64 {
        self.inner.connections.active_count()
    }

    /// Number of registered hooks of `kind`.
    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.inner.hooks.lock().len(kind)
    }

    /// Append a hook.
    ///
    /// Service, middleware and router hooks only take effect if registered
    /// before `serve`; shutdown hooks if registered before `shutdown`.
    pub fn register(&self, hook: Hook) {
        self.inner.hooks.lock().push(hook);
    }

    pub fn register_service<F>(&self, hook: F)
    where
        F: Fn(&Server) -> HookResult + Send + Sync + 'static,
    {
        let hook: Arc<dyn ServiceHook> = Arc::new(hook);
        self.register(Hook::Service(hook));
    }

    pub fn register_middleware<F>(&self, hook: F)
    where
        F: Fn(&mut Pipeline) + Send + Sync + 'static,
    {
        let hook: Arc<dyn MiddlewareHook> = Arc::new(hook);
        self.register(Hook::Middleware(hook));
    }

    pub fn register_routers<F>(&self, hook: F)
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        let hook: Arc<dyn RouterHook> = Arc::new(hook);
        self.register(Hook::Router(hook));
    }

    pub fn register_shutdown<F, Fut>(&self, hook: F)
    where
        F: Fn(Server) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HookResult> + Send + 'static,
    {
        let hook: Arc<dyn ShutdownHook> = Arc::new(hook);
        self.register(Hook::Shutdown(hook));
    }

    /// Address the listener is bound to.
    ///
    /// Resolves once bound, or with `None` if the server stopped first.
    pub async fn listening(&self) -> Option<SocketAddr> {
        let mut bound = self.inner.bound.subscribe();
        tokio::select! {
            addr = bound.wait_for(Option::is_some) => addr.ok().and_then(|addr| *addr),
            _ = self.inner.listener_done.wait() => *self.inner.bound.borrow(),
            _ = self.inner.stopped.wait() => *self.inner.bound.borrow(),
        }
    }

    /// Resolve once the server reached `Stopped`.
    pub async fn stopped(&self) {
        self.inner.stopped.wait().await
    }

    /// Apply hooks, bind and serve until shut down.
    ///
    /// Returns `Ok(())` after an intentional shutdown has completed, or
    /// the error that stopped the listener.
    pub async fn serve(&self) -> Result<(), ServerError> {
        self.inner
            .state
            .transition(LifecycleState::Created, LifecycleState::Serving)
            .map_err(ServerError::InvalidState)?;
        let done = ListenerDone(&self.inner.listener_done);

        let result = self.run().await;
        drop(done);

        match result {
            Ok(()) => {
                self.stopped().await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Server stopped with error");
                self.finish();
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<(), ServerError> {
        let app = self.build_app()?;
        let settings = &self.inner.settings;

        let listener = Listener::bind(settings.addr, settings.max_connections).await?;
        let local = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind {
                addr: settings.addr,
                source,
            })?;
        self.inner.bound.send_replace(Some(local));
        tracing::info!(address = %local, "Server listening");

        self.accept_loop(listener, app).await
    }

    fn build_app(&self) -> Result<Router, ServerError> {
        let (services, middlewares, routers) = {
            let hooks = self.inner.hooks.lock();
            (hooks.services(), hooks.middlewares(), hooks.routers())
        };

        for (index, hook) in services.iter().enumerate() {
            hook.start(self)
                .map_err(|source| ServerError::Startup { index, source })?;
        }

        let mut pipeline = Pipeline::with_builtins(self.inner.settings.request_timeout);
        for hook in &middlewares {
            hook.install(&mut pipeline);
        }

        let router = routers
            .iter()
            .fold(Router::new(), |router, hook| hook.install(router));

        tracing::debug!(
            services = services.len(),
            middlewares = middlewares.len(),
            routers = routers.len(),
            "Hooks applied"
        );
        Ok(pipeline.apply(router))
    }

    async fn accept_loop(&self, listener: Listener, app: Router) -> Result<(), ServerError> {
        let settings = &self.inner.settings;
        let mut close = self.inner.close.subscribe();
        let mut connections = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                deadline = wait_for_close(&mut close) => break Ok(deadline),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            permit,
                            self.inner.connections.track(),
                            app.clone(),
                            self.inner.close.subscribe(),
                            settings.header_read_timeout,
                            settings.max_header_bytes,
                        ));
                    }
                    Err(e) if e.is_transient() => {
                        tracing::debug!(error = %e, "Transient accept error");
                    }
                    Err(e) => break Err(e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
            }
        };

        // Stop accepting before draining
        drop(listener);

        let deadline = match &outcome {
            Ok(deadline) => *deadline,
            Err(_) => {
                let deadline = Instant::now() + settings.shutdown_max_age;
                self.inner.close.send_replace(Some(deadline));
                deadline
            }
        };
        drain(&mut connections, deadline).await;

        outcome.map(|_| ()).map_err(ServerError::Listener)
    }

    /// Shut down with a deadline of now + `shutdown_max_age`.
    pub async fn shutdown(&self) {
        let deadline = Instant::now() + self.inner.settings.shutdown_max_age;
        self.shutdown_with_deadline(deadline).await
    }

    /// Shut down, draining connections until `deadline`.
    ///
    /// Idempotent: concurrent and repeated callers all wait for the same
    /// single run and return once the server is `Stopped`.
    pub async fn shutdown_with_deadline(&self, deadline: Instant) {
        self.inner
            .shutdown_once
            .get_or_init(|| self.run_shutdown(deadline))
            .await;
    }

    async fn run_shutdown(&self, deadline: Instant) {
        let previous = self.inner.state.advance(LifecycleState::ShuttingDown);
        tracing::info!(
            from = previous.map(|s| s.as_str()).unwrap_or("stopped"),
            "Shutting down"
        );

        let hooks = self.inner.hooks.lock().shutdowns();
        for (index, hook) in hooks.iter().enumerate() {
            match AssertUnwindSafe(hook.shutdown(self.clone()))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => tracing::debug!(hook = index, "Shutdown hook finished"),
                Ok(Err(e)) => {
                    tracing::error!(hook = index, error = %e, "Shutdown hook failed");
                    metrics::record_shutdown_hook_failure();
                }
                Err(payload) => {
                    let panic = RequestPanic::from_payload(payload.as_ref());
                    tracing::error!(hook = index, error = %panic.message, "Shutdown hook panicked");
                    metrics::record_shutdown_hook_failure();
                }
            }
        }

        tokio::time::sleep(self.inner.settings.grace_interval).await;

        self.inner.close.send_replace(Some(deadline));
        if previous == Some(LifecycleState::Serving) {
            self.inner.listener_done.wait().await;
        }
        self.finish();
    }

    /// Move to `Stopped` and tear down background tasks.
    fn finish(&self) {
        self.inner.state.advance(LifecycleState::Stopped);
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        if self.inner.stopped.trigger() {
            tracing::info!("Server stopped");
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.inner.settings.addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolve with the closing deadline once the listener is told to close.
async fn wait_for_close(close: &mut watch::Receiver<Option<Instant>>) -> Instant {
    loop {
        let current = *close.borrow_and_update();
        if let Some(deadline) = current {
            return deadline;
        }
        if close.changed().await.is_err() {
            return Instant::now();
        }
    }
}

/// Wait for every connection until `deadline`, then abort the rest.
async fn drain(connections: &mut JoinSet<()>, deadline: Instant) {
    if connections.is_empty() {
        return;
    }
    tracing::info!(connections = connections.len(), "Draining connections");

    let drained = tokio::time::timeout_at(deadline, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            remaining = connections.len(),
            "Shutdown deadline reached, aborting connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
    app: Router,
    mut close: watch::Receiver<Option<Instant>>,
    header_read_timeout: Duration,
    max_header_bytes: usize,
) {
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        app.clone().oneshot(request.map(Body::new))
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout)
        .max_buf_size(max_header_bytes.max(MIN_BUF_SIZE));

    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = wait_for_close(&mut close) => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %guard.id(),
            peer_addr = %peer,
            error = %e,
            "Connection closed with error"
        );
    }
}
