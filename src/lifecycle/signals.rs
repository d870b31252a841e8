//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers before the server is handed to the caller
//! - Translate SIGINT, SIGHUP and SIGTERM into a graceful shutdown
//! - Log and ignore SIGUSR1, SIGUSR2 and SIGQUIT
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered synchronously so a signal arriving right
//!   after construction is not lost
//! - The shutdown deadline is taken when the signal arrives
//! - The task exits once the server has stopped

use std::io;

use tokio::task::JoinHandle;

use crate::http::server::Server;

#[cfg(unix)]
pub fn spawn_signal_listener(server: Server) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        let name = loop {
            tokio::select! {
                _ = interrupt.recv() => break "SIGINT",
                _ = hangup.recv() => break "SIGHUP",
                _ = terminate.recv() => break "SIGTERM",
                _ = user1.recv() => tracing::info!(signal = "SIGUSR1", "Ignoring signal"),
                _ = user2.recv() => tracing::info!(signal = "SIGUSR2", "Ignoring signal"),
                _ = quit.recv() => tracing::info!(signal = "SIGQUIT", "Ignoring signal"),
                _ = server.stopped() => return,
            }
        };

        tracing::info!(signal = name, "Shutdown signal received");
        server.shutdown().await;
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(server: Server) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                tracing::info!(signal = "ctrl_c", "Shutdown signal received");
                server.shutdown().await;
            }
            _ = server.stopped() => {}
        }
    }))
}
