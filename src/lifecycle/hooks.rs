//! Hook registry.
//!
//! # Responsibilities
//! - Hold every registered hook in one ordered list
//! - Hand out the hooks of one category in registration order
//!
//! # Categories
//! ```text
//! Service    → started before the listener binds (background workers)
//! Middleware → wraps every route, first registered is outermost
//! Router     → adds routes
//! Shutdown   → awaited one at a time when the server shuts down
//! ```
//!
//! # Design Decisions
//! - Append-only: no dedup, no removal
//! - Closures implement the hook traits, so most callers never name them

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::http::pipeline::Pipeline;
use crate::http::server::Server;

/// Outcome of a fallible hook.
pub type HookResult = Result<(), Box<dyn StdError + Send + Sync>>;

/// Starts work that must exist before the listener binds.
pub trait ServiceHook: Send + Sync {
    fn start(&self, server: &Server) -> HookResult;
}

/// Installs request middleware.
pub trait MiddlewareHook: Send + Sync {
    fn install(&self, pipeline: &mut Pipeline);
}

/// Adds routes to the router.
pub trait RouterHook: Send + Sync {
    fn install(&self, router: Router) -> Router;
}

/// Releases resources during shutdown.
///
/// Must not call [`Server::shutdown`]: it would wait on itself.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    async fn shutdown(&self, server: Server) -> HookResult;
}

impl<F> ServiceHook for F
where
    F: Fn(&Server) -> HookResult + Send + Sync,
{
    fn start(&self, server: &Server) -> HookResult {
        self(server)
    }
}

impl<F> MiddlewareHook for F
where
    F: Fn(&mut Pipeline) + Send + Sync,
{
    fn install(&self, pipeline: &mut Pipeline) {
        self(pipeline)
    }
}

impl<F> RouterHook for F
where
    F: Fn(Router) -> Router + Send + Sync,
{
    fn install(&self, router: Router) -> Router {
        self(router)
    }
}

#[async_trait]
impl<F, Fut> ShutdownHook for F
where
    F: Fn(Server) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    async fn shutdown(&self, server: Server) -> HookResult {
        self(server).await
    }
}

/// A registered hook.
#[derive(Clone)]
pub enum Hook {
    Service(Arc<dyn ServiceHook>),
    Middleware(Arc<dyn MiddlewareHook>),
    Router(Arc<dyn RouterHook>),
    Shutdown(Arc<dyn ShutdownHook>),
}

/// Hook category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Service,
    Middleware,
    Router,
    Shutdown,
}

impl Hook {
    pub fn kind(&self) -> HookKind {
        match self {
            Hook::Service(_) => HookKind::Service,
            Hook::Middleware(_) => HookKind::Middleware,
            Hook::Router(_) => HookKind::Router,
            Hook::Shutdown(_) => HookKind::Shutdown,
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Hook").field(&self.kind()).finish()
    }
}

/// Ordered, append-only hook list.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    pub fn len(&self, kind: HookKind) -> usize {
        self.hooks.iter().filter(|h| h.kind() == kind).count()
    }

    pub fn services(&self) -> Vec<Arc<dyn ServiceHook>> {
        self.hooks
            .iter()
            .filter_map(|h| match h {
                Hook::Service(hook) => Some(Arc::clone(hook)),
                _ => None,
            })
            .collect()
    }

    pub fn middlewares(&self) -> Vec<Arc<dyn MiddlewareHook>> {
        self.hooks
            .iter()
            .filter_map(|h| match h {
                Hook::Middleware(hook) => Some(Arc::clone(hook)),
                _ => None,
            })
            .collect()
    }

    pub fn routers(&self) -> Vec<Arc<dyn RouterHook>> {
        self.hooks
            .iter()
            .filter_map(|h| match h {
                Hook::Router(hook) => Some(Arc::clone(hook)),
                _ => None,
            })
            .collect()
    }

    pub fn shutdowns(&self) -> Vec<Arc<dyn ShutdownHook>> {
        self.hooks
            .iter()
            .filter_map(|h| match h {
                Hook::Shutdown(hook) => Some(Arc::clone(hook)),
                _ => None,
            })
            .collect()
    }
}
