//! Live configuration reload seen by request handlers.

mod common;

use std::fs;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use service_bootstrap::{AppContext, ConfigStore, Server};

use common::{client, start, test_settings, url};

async fn current_level(State(context): State<AppContext>) -> String {
    context.snapshot().log.level.clone()
}

#[tokio::test]
async fn handlers_observe_reloaded_snapshot() {
    let root = tempfile::tempdir().unwrap();
    let env_dir = root.path().join("testing");
    fs::create_dir_all(&env_dir).unwrap();
    // The json document wins over the yaml one
    fs::write(env_dir.join("main.yaml"), "log:\n  level: error\n").unwrap();
    fs::write(env_dir.join("main.json"), r#"{"log": {"level": "info"}}"#).unwrap();

    let store = Arc::new(ConfigStore::load(root.path(), "testing", "main").unwrap());
    assert_eq!(store.path().unwrap(), env_dir.join("main.json"));

    let (tx, rx) = mpsc::channel();
    let _watcher = store
        .watch(move |config| {
            let _ = tx.send(config.log.level.clone());
        })
        .unwrap();

    let context = AppContext::new(Arc::clone(&store));
    let server = Server::new(context, test_settings(), Vec::new()).await.unwrap();
    let state = server.context().clone();
    server.register_routers(move |router: Router| {
        router.route("/level", get(current_level).with_state(state.clone()))
    });

    let (addr, running) = start(&server).await;
    let level = client().get(url(addr, "/level")).send().await.unwrap();
    assert_eq!(level.text().await.unwrap(), "info");

    // Let the watcher settle before writing
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(env_dir.join("main.json"), r#"{"log": {"level": "debug"}}"#).unwrap();

    let seen = tokio::task::spawn_blocking(move || loop {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(level) if level == "debug" => return Some(level),
            Ok(_) => continue,
            Err(_) => return None,
        }
    })
    .await
    .unwrap();
    assert_eq!(seen.as_deref(), Some("debug"));

    let level = client().get(url(addr, "/level")).send().await.unwrap();
    assert_eq!(level.text().await.unwrap(), "debug");

    server.shutdown().await;
    running.await.unwrap().unwrap();
}
