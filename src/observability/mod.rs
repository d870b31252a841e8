//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one rotated file per tier)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → rotation.rs (size-rotated, compressed files)
//!     → stdout echo (optional)
//!     → Metrics endpoint on the diagnostics port (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The global `tracing` dispatcher is the single logging authority
//! - Logging is installed before any other component that might log
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
pub mod rotation;

pub use logging::{LoggerGuard, LoggingError, Tier};
