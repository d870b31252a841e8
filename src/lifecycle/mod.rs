//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, hooks.rs):
//!     Init options → Service hooks → Middleware hooks → Router hooks → Bind
//!
//! Shutdown (shutdown.rs, hooks.rs):
//!     Signal or shutdown() → Shutdown hooks in order → Grace interval
//!     → Stop accepting → Drain connections until the deadline → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGHUP → Trigger graceful shutdown
//!     SIGUSR1/SIGUSR2/SIGQUIT → Logged and ignored
//! ```
//!
//! # Design Decisions
//! - Ordered startup: hooks by category, listener last
//! - Ordered shutdown: hooks, grace, stop accept, drain
//! - Shutdown has a deadline: connections still open then are aborted

pub mod hooks;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use hooks::{
    Hook, HookKind, HookRegistry, HookResult, MiddlewareHook, RouterHook, ServiceHook,
    ShutdownHook,
};
pub use shutdown::ShutdownSignal;
pub use startup::{with_mongo, with_mysql, with_redis, InitOption};
pub use state::{LifecycleState, StateCell};
