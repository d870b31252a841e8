//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use service_bootstrap::{AppConfig, AppContext, Server, ServerError, ServerSettings};
use tokio::task::JoinHandle;

/// Settings for a server on an ephemeral loopback port without signal
/// handling, with a short grace interval.
pub fn test_settings() -> ServerSettings {
    ServerSettings {
        addr: "127.0.0.1:0".parse().unwrap(),
        grace_interval: Duration::from_millis(50),
        shutdown_max_age: Duration::from_secs(3),
        handle_signals: false,
        ..ServerSettings::default()
    }
}

pub async fn new_server(settings: ServerSettings) -> Server {
    Server::new(
        AppContext::from_config(AppConfig::default()),
        settings,
        Vec::new(),
    )
    .await
    .unwrap()
}

/// Add `GET /ping` answering `pong`.
pub fn ping_routes(router: Router) -> Router {
    router.route("/ping", get(|| async { "pong" }))
}

/// Run `serve` in the background and wait until the listener is bound.
pub async fn start(server: &Server) -> (SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let running = tokio::spawn({
        let server = server.clone();
        async move { server.serve().await }
    });
    let addr = tokio::time::timeout(Duration::from_secs(5), server.listening())
        .await
        .expect("server did not bind in time")
        .expect("server stopped before binding");
    (addr, running)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}
