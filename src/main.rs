//! Service bootstrap binary.
//!
//! # Startup
//!
//! ```text
//! parse flags → resolve environment → load conf/<env>/<name>.{json,yaml,ini}
//!     → logger (fatal on error) → backends (logged on error)
//!     → server: hooks → bind → serve
//! ```
//!
//! Configuration and logger errors exit with status 1 before any listener
//! is bound. SIGINT, SIGHUP and SIGTERM shut the server down gracefully.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;

use service_bootstrap::cli::Cli;
use service_bootstrap::config::{ConfigStore, Environment, CONFIG_NAMESPACE};
use service_bootstrap::health::HealthCheckSettings;
use service_bootstrap::lifecycle::startup;
use service_bootstrap::observability::logging;
use service_bootstrap::{AppContext, Server, ServerSettings};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.verbose {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let environment = match Environment::resolve(&cli.env) {
        Ok(environment) => environment,
        Err(e) => {
            eprintln!("service-bootstrap: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let store = match ConfigStore::load(
        Path::new(CONFIG_NAMESPACE),
        environment.as_str(),
        cli.config_name(),
    ) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("service-bootstrap: failed to load config: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let config = store.snapshot();
    let guard = match logging::init(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("service-bootstrap: failed to initialize logger: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    tracing::info!(
        environment = %environment,
        version = %config.system.version,
        "service-bootstrap starting"
    );
    if let Some(path) = store.path() {
        tracing::info!(path = %path.display(), "Using configuration file");
    }

    let _watcher = match store.watch(|config| {
        tracing::info!(level = %config.log.level, "Configuration reloaded");
    }) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Configuration reload disabled");
            None
        }
    };

    let context = AppContext::new(Arc::clone(&store));
    let mut settings = ServerSettings::from_config(&config.system);
    settings.health_check = Some(HealthCheckSettings::new(
        cli.health_check_port,
        cli.health_check_uri.clone(),
    ));
    if cli.enable_pprof {
        settings.diagnostics_addr = Some(([0, 0, 0, 0], cli.pprof_port).into());
    }

    let options = startup::configured_backends(&context);
    let server = Server::new(context, settings, options).await?;
    server.register_routers(|router: Router| router.route("/ping", get(|| async { "pong" })));

    let result = server.serve().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Server exited with error");
    }

    tracing::info!("Shutdown complete");
    guard.flush()?;
    result?;
    Ok(ExitCode::SUCCESS)
}
