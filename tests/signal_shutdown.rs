//! SIGTERM drives a graceful shutdown.
//!
//! Lives in its own test binary: the signal is delivered to the whole
//! process.

#![cfg(unix)]

mod common;

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use service_bootstrap::{LifecycleState, Server};

use common::{client, new_server, ping_routes, start, test_settings, url};

#[tokio::test]
async fn sigterm_runs_hooks_and_stops() {
    let mut settings = test_settings();
    settings.handle_signals = true;
    settings.grace_interval = Duration::from_millis(200);
    let server = new_server(settings).await;
    server.register_routers(ping_routes);

    let hooks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hooks);
    server.register_shutdown(move |_server: Server| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let (addr, running) = start(&server).await;
    let response = client().get(url(addr, "/ping")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "pong");

    let sent = Instant::now();
    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("server did not stop after SIGTERM")
        .unwrap()
        .unwrap();

    assert!(sent.elapsed() >= Duration::from_millis(200));
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
    assert_eq!(server.state(), LifecycleState::Stopped);
}
