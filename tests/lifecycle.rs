//! Server lifecycle integration tests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderValue;
use axum::middleware::{from_fn, Next};
use axum::routing::get;
use axum::Router;
use service_bootstrap::health::HealthCheckSettings;
use service_bootstrap::lifecycle::HookKind;
use service_bootstrap::{LifecycleState, Pipeline, Server};

use common::{client, new_server, ping_routes, start, test_settings, url};

#[tokio::test]
async fn ping_end_to_end() {
    let server = new_server(test_settings()).await;
    server.register_routers(ping_routes);
    let (addr, running) = start(&server).await;
    assert_eq!(server.state(), LifecycleState::Serving);

    let response = client().get(url(addr, "/ping")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "pong");

    let missing = client().get(url(addr, "/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    server.shutdown().await;
    assert_eq!(server.state(), LifecycleState::Stopped);
    running.await.unwrap().unwrap();

    // The listener is closed
    assert!(client().get(url(addr, "/ping")).send().await.is_err());
}

#[tokio::test]
async fn shutdown_hooks_run_in_order_then_grace() {
    let mut settings = test_settings();
    settings.grace_interval = Duration::from_millis(300);
    let server = new_server(settings).await;
    server.register_routers(ping_routes);

    let log: Arc<Mutex<Vec<(&'static str, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    for name in ["h1", "h2", "h3"] {
        let log = Arc::clone(&log);
        server.register_shutdown(move |_server: Server| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push((name, Instant::now()));
                if name == "h2" {
                    return Err("h2 failed".into());
                }
                Ok(())
            }
        });
    }

    let (_addr, running) = start(&server).await;
    server.shutdown().await;
    let finished = Instant::now();
    running.await.unwrap().unwrap();

    let log = log.lock().unwrap();
    let names: Vec<_> = log.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["h1", "h2", "h3"]);
    let last_hook = log[2].1;
    assert!(finished.duration_since(last_hook) >= Duration::from_millis(300));
}

#[tokio::test]
async fn panicking_shutdown_hook_is_skipped() {
    let server = new_server(test_settings()).await;
    let ran_after = Arc::new(AtomicUsize::new(0));

    server.register_shutdown(|_server: Server| async move {
        if true {
            panic!("hook exploded");
        }
        Ok(())
    });
    let counter = Arc::clone(&ran_after);
    server.register_shutdown(move |_server: Server| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let (_addr, running) = start(&server).await;
    server.shutdown().await;
    running.await.unwrap().unwrap();
    assert_eq!(ran_after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_shutdowns_run_hooks_once() {
    let server = new_server(test_settings()).await;
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    server.register_shutdown(move |_server: Server| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    });

    let (_addr, running) = start(&server).await;
    let callers: Vec<_> = (0..8)
        .map(|_| {
            let server = server.clone();
            tokio::spawn(async move {
                server.shutdown().await;
                server.state()
            })
        })
        .collect();

    for caller in callers {
        assert_eq!(caller.await.unwrap(), LifecycleState::Stopped);
    }
    running.await.unwrap().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Later calls return at once without rerunning hooks
    server.shutdown().await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn startup_hooks_run_by_category() {
    let server = new_server(test_settings()).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    // Registered in reverse category order on purpose
    let router_log = Arc::clone(&log);
    server.register_routers(move |router: Router| {
        router_log.lock().unwrap().push("router");
        ping_routes(router)
    });
    let middleware_log = Arc::clone(&log);
    server.register_middleware(move |_: &mut Pipeline| {
        middleware_log.lock().unwrap().push("middleware");
    });
    let service_log = Arc::clone(&log);
    server.register_service(move |_: &Server| {
        service_log.lock().unwrap().push("service");
        Ok(())
    });
    assert_eq!(server.hook_count(HookKind::Service), 1);
    assert_eq!(server.hook_count(HookKind::Middleware), 1);
    assert_eq!(server.hook_count(HookKind::Router), 1);
    assert_eq!(server.hook_count(HookKind::Shutdown), 0);

    let (_addr, running) = start(&server).await;
    assert_eq!(*log.lock().unwrap(), vec!["service", "middleware", "router"]);

    server.shutdown().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn middleware_wraps_routes_registered_later() {
    let server = new_server(test_settings()).await;
    server.register_middleware(|pipeline: &mut Pipeline| {
        pipeline.layer(from_fn(|req: axum::extract::Request, next: Next| async move {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert("x-wrapped", HeaderValue::from_static("yes"));
            response
        }));
    });
    server.register_routers(ping_routes);

    let (addr, running) = start(&server).await;
    let response = client().get(url(addr, "/ping")).send().await.unwrap();
    assert_eq!(response.headers()["x-wrapped"], "yes");

    server.shutdown().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn handler_panic_is_recovered() {
    let server = new_server(test_settings()).await;
    server.register_routers(|router: Router| {
        ping_routes(router).route(
            "/boom",
            get(|| async {
                if true {
                    panic!("handler exploded");
                }
                "unreachable"
            }),
        )
    });

    let (addr, running) = start(&server).await;
    let client = client();

    let response = client.get(url(addr, "/boom")).send().await.unwrap();
    assert_eq!(response.status(), 500);

    // The listener keeps serving
    let response = client.get(url(addr, "/ping")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(server.state(), LifecycleState::Serving);

    server.shutdown().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn in_flight_request_completes_during_shutdown() {
    let server = new_server(test_settings()).await;
    server.register_routers(|router: Router| {
        router.route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                "done"
            }),
        )
    });

    let (addr, running) = start(&server).await;
    let request = tokio::spawn(client().get(url(addr, "/slow")).send());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.active_connections(), 1);

    server.shutdown().await;
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "done");
    running.await.unwrap().unwrap();
    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn deadline_aborts_stuck_connections() {
    let server = new_server(test_settings()).await;
    server.register_routers(|router: Router| {
        router.route(
            "/stuck",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        )
    });

    let (addr, running) = start(&server).await;
    let request = tokio::spawn(client().get(url(addr, "/stuck")).send());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server
        .shutdown_with_deadline(tokio::time::Instant::now() + Duration::from_millis(300))
        .await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(server.state(), LifecycleState::Stopped);

    assert!(request.await.unwrap().is_err());
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn hooks_registered_while_serving() {
    let server = new_server(test_settings()).await;
    server.register_routers(ping_routes);
    let (addr, running) = start(&server).await;

    // Routes added after serve are not picked up
    server.register_routers(|router: Router| router.route("/late", get(|| async { "late" })));
    let response = client().get(url(addr, "/late")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    // Shutdown hooks added before shutdown still run
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    server.register_shutdown(move |_server: Server| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    server.shutdown().await;
    running.await.unwrap().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_check_follows_lifecycle() {
    let mut settings = test_settings();
    settings.health_check = Some(HealthCheckSettings {
        addr: "127.0.0.1:0".parse().unwrap(),
        uri: "/health".into(),
    });
    let server = new_server(settings).await;
    let health = server.health_addr().unwrap();
    let client = client();

    let response = client.get(url(health, "/health")).send().await.unwrap();
    assert_eq!(response.status(), 503);

    let (_addr, running) = start(&server).await;
    let response = client.get(url(health, "/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    server.shutdown().await;
    running.await.unwrap().unwrap();
}
