//! Structured logging.
//!
//! # Responsibilities
//! - Build the process-wide `tracing` subscriber
//! - Route each level to its own rotated file (`server_<tier>.log`)
//! - Optionally echo every tier to stdout
//! - Flush all destinations exactly once at final shutdown
//!
//! # Tier Wiring
//! ```text
//! level = debug (or unknown) → debug, info, warn, error
//! level = info               → info, warn, error
//! level = warn               → warn, error
//! level = error              → error
//! ```
//!
//! # Design Decisions
//! - Each tier only accepts records of its own level, so a record lands in
//!   exactly one file
//! - Files never carry ANSI escapes; colour only applies to the console echo
//! - `RUST_LOG`, when set, narrows what reaches any tier
//! - A log directory that cannot be created is a fatal startup error

use std::fmt as std_fmt;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Level, Metadata};
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

use crate::config::LogConfig;
use crate::observability::rotation::{RotatingFile, RotationPolicy};

type Base = Layered<EnvFilter, Registry>;
type TierLayer = Box<dyn Layer<Base> + Send + Sync>;

/// The subscriber produced by [`build_subscriber`].
pub type LogSubscriber = Layered<Vec<TierLayer>, Base>;

/// Error type for logger initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", .path.display())]
    Directory { path: PathBuf, source: io::Error },

    #[error("failed to open log file {}: {source}", .path.display())]
    File { path: PathBuf, source: io::Error },

    #[error("a global logger is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// A level-specific log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Debug,
    Info,
    Warn,
    Error,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Debug => "debug",
            Tier::Info => "info",
            Tier::Warn => "warn",
            Tier::Error => "error",
        }
    }

    /// File name of this tier's destination.
    pub fn file_name(&self) -> String {
        format!("server_{}.log", self.as_str())
    }

    /// Whether a record at `level` belongs to this tier.
    pub fn accepts(&self, level: &Level) -> bool {
        match self {
            Tier::Debug => *level == Level::DEBUG || *level == Level::TRACE,
            Tier::Info => *level == Level::INFO,
            Tier::Warn => *level == Level::WARN,
            Tier::Error => *level == Level::ERROR,
        }
    }

    /// Tiers wired for a configured minimum level.
    pub fn wired_for(level: &str) -> &'static [Tier] {
        match level {
            "info" => &[Tier::Info, Tier::Warn, Tier::Error],
            "warn" => &[Tier::Warn, Tier::Error],
            "error" => &[Tier::Error],
            _ => &[Tier::Debug, Tier::Info, Tier::Warn, Tier::Error],
        }
    }
}

/// Timestamp with the configured prefix in front.
#[derive(Debug, Clone)]
struct PrefixedTime {
    prefix: String,
}

impl FormatTime for PrefixedTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std_fmt::Result {
        write!(
            w,
            "{}{}",
            self.prefix,
            chrono::Local::now().format("%Y/%m/%d - %H:%M:%S%.3f")
        )
    }
}

/// Owner of the log destinations.
///
/// Keep it alive for the process lifetime and call [`LoggerGuard::flush`]
/// once during final shutdown. Dropping an unflushed guard flushes it.
#[derive(Debug)]
pub struct LoggerGuard {
    files: Vec<(Tier, RotatingFile)>,
    flushed: AtomicBool,
}

impl LoggerGuard {
    /// Tiers wired by this logger, in wiring order.
    pub fn tiers(&self) -> Vec<Tier> {
        self.files.iter().map(|(tier, _)| *tier).collect()
    }

    /// Active file path for every wired tier.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(_, file)| file.path()).collect()
    }

    /// Synchronize every destination to durable storage.
    ///
    /// Only the first call does any work; returns `false` for later calls.
    pub fn flush(&self) -> io::Result<bool> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        for (_, file) in &self.files {
            file.sync()?;
        }
        io::stdout().flush()?;
        Ok(true)
    }
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("failed to flush logs: {}", e);
        }
    }
}

fn tier_layer(
    tier: Tier,
    config: &LogConfig,
    writer: impl for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
    ansi: bool,
) -> TierLayer {
    let filter = filter_fn(move |meta: &Metadata<'_>| tier.accepts(meta.level()));
    let layer = fmt::layer()
        .with_writer(writer)
        .with_timer(PrefixedTime {
            prefix: config.prefix.clone(),
        })
        .with_ansi(ansi)
        .with_file(config.show_line)
        .with_line_number(config.show_line);

    if config.format == "json" {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

/// Build the tiered subscriber without installing it.
pub fn build_subscriber(config: &LogConfig) -> Result<(LogSubscriber, LoggerGuard), LoggingError> {
    let dir = PathBuf::from(&config.director);
    if !dir.is_dir() {
        fs::create_dir_all(&dir).map_err(|source| LoggingError::Directory {
            path: dir.clone(),
            source,
        })?;
    }

    let console_ansi = config.encode_level.contains("Color");
    let mut layers: Vec<TierLayer> = Vec::new();
    let mut files = Vec::new();

    for &tier in Tier::wired_for(&config.level) {
        let path = dir.join(tier.file_name());
        let file = RotatingFile::open(&path, RotationPolicy::default())
            .map_err(|source| LoggingError::File { path, source })?;

        layers.push(tier_layer(tier, config, file.clone(), false));
        if config.log_in_console {
            layers.push(tier_layer(tier, config, io::stdout, console_ansi));
        }
        files.push((tier, file));
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));
    let subscriber = Registry::default().with(env_filter).with(layers);

    Ok((
        subscriber,
        LoggerGuard {
            files,
            flushed: AtomicBool::new(false),
        },
    ))
}

/// Build the tiered subscriber and install it as the global default.
pub fn init(config: &LogConfig) -> Result<LoggerGuard, LoggingError> {
    let (subscriber, guard) = build_subscriber(config)?;
    tracing::subscriber::set_global_default(subscriber)?;
    tracing::debug!(
        level = %config.level,
        directory = %config.director,
        tiers = ?guard.tiers(),
        "Logger initialized"
    );
    Ok(guard)
}
