//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (hyper HTTP/1.1 connection, lifecycle)
//!     → pipeline.rs (built-in and hook middleware)
//!     → recovery.rs (panic → 500)
//!     → router hooks → handler
//! ```

pub mod pipeline;
pub mod recovery;
pub mod server;

pub use pipeline::Pipeline;
pub use recovery::RequestPanic;
pub use server::{Server, ServerError, ServerSettings};
