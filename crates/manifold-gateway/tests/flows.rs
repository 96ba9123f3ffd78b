//! Event-protocol tests for the asynchronous gateway.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use manifold_gateway::{
    AsyncGateway, ClientEvent, GatewayConfig, RequestScope, Scope, ServerEvent,
};
use manifold_router::{events, Bind, PathRule, Reply, Router, SocketMessage};
use serde_json::json;
use tokio::sync::mpsc;

fn channels() -> (
    mpsc::Sender<ClientEvent>,
    mpsc::Receiver<ClientEvent>,
    mpsc::Sender<ServerEvent>,
    mpsc::Receiver<ServerEvent>,
) {
    let (client_tx, client_rx) = mpsc::channel(16);
    let (server_tx, server_rx) = mpsc::channel(16);
    (client_tx, client_rx, server_tx, server_rx)
}

fn http_scope(method: &str, path: &str, headers: Vec<(String, String)>) -> RequestScope {
    RequestScope {
        method: method.to_string(),
        path: path.to_string(),
        query_string: String::new(),
        headers,
    }
}

#[tokio::test]
async fn lifespan_handshake_dispatches_events() {
    let counts = Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)));

    let mut app = Router::new();
    let c = Arc::clone(&counts);
    app.route_fn(PathRule::on_event(events::STARTUP), move |_| {
        let c = Arc::clone(&c);
        async move {
            c.0.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::None)
        }
    });
    let c = Arc::clone(&counts);
    app.route_fn(PathRule::on_event(events::SHUTDOWN), move |_| {
        let c = Arc::clone(&c);
        async move {
            c.1.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::None)
        }
    });

    let gateway = AsyncGateway::new(Arc::new(app), GatewayConfig::default());
    let (client_tx, client_rx, server_tx, mut server_rx) = channels();

    client_tx.send(ClientEvent::LifespanStartup).await.unwrap();
    client_tx.send(ClientEvent::LifespanShutdown).await.unwrap();
    gateway
        .serve(Scope::Lifespan, client_rx, server_tx)
        .await
        .unwrap();

    assert_eq!(server_rx.recv().await, Some(ServerEvent::StartupComplete));
    assert_eq!(server_rx.recv().await, Some(ServerEvent::ShutdownComplete));
    assert_eq!(counts.0.load(Ordering::SeqCst), 1);
    assert_eq!(counts.1.load(Ordering::SeqCst), 1);
    assert!(gateway.shutdown_signal().is_triggered());
}

#[tokio::test]
async fn http_flow_accumulates_chunks_and_responds() {
    let mut app = Router::new();
    app.route_fn(PathRule::post("/control").bind(Bind::BodyJson), |inv| async move {
        Ok(Reply::from(json!({"echo": inv.args.body_json()})))
    });

    let gateway = AsyncGateway::new(Arc::new(app), GatewayConfig::default());
    let (client_tx, client_rx, server_tx, mut server_rx) = channels();

    let body = b"{\"cmd\": \"start\"}";
    client_tx
        .send(ClientEvent::RequestBody {
            data: Bytes::from(&body[..8]),
            more: true,
        })
        .await
        .unwrap();
    client_tx
        .send(ClientEvent::RequestBody {
            data: Bytes::from(&body[8..]),
            more: false,
        })
        .await
        .unwrap();

    gateway
        .serve(
            Scope::Http(http_scope("POST", "/control", vec![])),
            client_rx,
            server_tx,
        )
        .await
        .unwrap();

    match server_rx.recv().await {
        Some(ServerEvent::ResponseStart { status, headers }) => {
            assert_eq!(status, 200);
            assert!(headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "application/json"));
        }
        other => panic!("expected response start, got {other:?}"),
    }
    match server_rx.recv().await {
        Some(ServerEvent::ResponseBody { data, more }) => {
            assert!(!more);
            let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
            assert_eq!(value, json!({"echo": {"cmd": "start"}}));
        }
        other => panic!("expected response body, got {other:?}"),
    }
}

#[tokio::test]
async fn http_flow_rejects_forged_lifecycle_methods() {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let mut app = Router::new();
    let counter = Arc::clone(&teardowns);
    app.route_fn(PathRule::on_event(events::SHUTDOWN), move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::None)
        }
    });

    let gateway = AsyncGateway::new(Arc::new(app), GatewayConfig::default());
    let (_client_tx, client_rx, server_tx, mut server_rx) = channels();

    gateway
        .serve(
            Scope::Http(http_scope("shutdown", "/shutdown", vec![])),
            client_rx,
            server_tx,
        )
        .await
        .unwrap();

    match server_rx.recv().await {
        Some(ServerEvent::ResponseStart { status, .. }) => assert_eq!(status, 501),
        other => panic!("expected 501, got {other:?}"),
    }
    assert_eq!(teardowns.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn http_flow_rejects_oversized_declaration_before_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut app = Router::new();
    let counter = Arc::clone(&calls);
    app.route_fn(PathRule::post("/upload").bind(Bind::BodyBytes), move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::None)
        }
    });

    let gateway = AsyncGateway::new(Arc::new(app), GatewayConfig { max_body_size: 16 });
    let (_client_tx, client_rx, server_tx, mut server_rx) = channels();

    // No body event is ever sent; the declared length alone must reject.
    gateway
        .serve(
            Scope::Http(http_scope(
                "POST",
                "/upload",
                vec![("content-length".into(), "1024".into())],
            )),
            client_rx,
            server_tx,
        )
        .await
        .unwrap();

    match server_rx.recv().await {
        Some(ServerEvent::ResponseStart { status, .. }) => assert_eq!(status, 413),
        other => panic!("expected 413, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn http_flow_rejects_oversized_accumulation() {
    let mut app = Router::new();
    app.route_fn(PathRule::post("/upload").bind(Bind::BodyBytes), |_| async {
        Ok(Reply::None)
    });

    let gateway = AsyncGateway::new(Arc::new(app), GatewayConfig { max_body_size: 4 });
    let (client_tx, client_rx, server_tx, mut server_rx) = channels();

    client_tx
        .send(ClientEvent::RequestBody {
            data: Bytes::from_static(b"over the limit"),
            more: false,
        })
        .await
        .unwrap();

    gateway
        .serve(
            Scope::Http(http_scope("POST", "/upload", vec![])),
            client_rx,
            server_tx,
        )
        .await
        .unwrap();

    match server_rx.recv().await {
        Some(ServerEvent::ResponseStart { status, .. }) => assert_eq!(status, 413),
        other => panic!("expected 413, got {other:?}"),
    }
}

#[tokio::test]
async fn websocket_flow_echoes_through_claimed_handler() {
    let mut app = Router::new();
    app.route_fn(PathRule::websocket("/ws/echo"), |inv| async move {
        let socket = inv.socket.expect("socket bound");
        while let Some(message) = socket.recv().await {
            match message {
                SocketMessage::Text(text) => {
                    if socket
                        .send(SocketMessage::text(format!("echo: {text}")))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                SocketMessage::Close => break,
                SocketMessage::Binary(_) => {}
            }
        }
        Ok(Reply::None)
    });

    let gateway = AsyncGateway::new(Arc::new(app), GatewayConfig::default());
    let (client_tx, client_rx, server_tx, mut server_rx) = channels();

    client_tx.send(ClientEvent::Connect).await.unwrap();
    client_tx
        .send(ClientEvent::MessageText("ping".into()))
        .await
        .unwrap();

    let serve = tokio::spawn({
        let scope = Scope::Websocket(http_scope("WEBSOCKET", "/ws/echo", vec![]));
        async move { gateway.serve(scope, client_rx, server_tx).await }
    });

    assert_eq!(server_rx.recv().await, Some(ServerEvent::Accept));
    assert_eq!(
        server_rx.recv().await,
        Some(ServerEvent::MessageText("echo: ping".into()))
    );

    client_tx.send(ClientEvent::Disconnect).await.unwrap();
    serve.await.unwrap().unwrap();
    assert_eq!(
        server_rx.recv().await,
        Some(ServerEvent::Close { code: 1000 })
    );
}

#[tokio::test]
async fn websocket_flow_refuses_when_unclaimed() {
    let gateway = AsyncGateway::new(Arc::new(Router::new()), GatewayConfig::default());
    let (client_tx, client_rx, server_tx, mut server_rx) = channels();

    client_tx.send(ClientEvent::Connect).await.unwrap();
    gateway
        .serve(
            Scope::Websocket(http_scope("WEBSOCKET", "/ws/none", vec![])),
            client_rx,
            server_tx,
        )
        .await
        .unwrap();

    assert_eq!(
        server_rx.recv().await,
        Some(ServerEvent::Close { code: 1003 })
    );
}
