//! End-to-end tests for the middleware components mounted on a router.

use std::sync::Arc;

use http::StatusCode;
use manifold_core::{Content, Method, Request, Response, ShutdownSignal};
use manifold_middleware::{hash_password, AuthGate, StaticFiles};
use manifold_router::{PathRule, Reply, Router};
use serde_json::json;
use tempfile::TempDir;

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>manifold</h1>").unwrap();
    std::fs::create_dir(dir.path().join("css")).unwrap();
    std::fs::write(dir.path().join("css").join("site.css"), "body{}").unwrap();
    dir
}

async fn get(app: &Router, url: &str) -> Response {
    let req = Arc::new(Request::new(Method::Get, url));
    app.dispatch(&req, &ShutdownSignal::new()).await.unwrap()
}

#[tokio::test]
async fn serves_files_with_mime_types() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/static").into_router(),
    ));

    let resp = get(&app, "/static/css/site.css").await;
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(resp.content_type(), Some("text/css; charset=utf-8"));
    assert_eq!(resp.content(), &Content::Bytes("body{}".into()));
}

#[tokio::test]
async fn serves_index_file_for_bare_prefix() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/static")
            .index_file("index.html")
            .into_router(),
    ));

    let resp = get(&app, "/static").await;
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(resp.content_type(), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn traversal_attempt_is_a_404_not_a_read() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path().join("css"), "/").into_router(),
    ));

    let resp = get(&app, "/../index.html").await;
    assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authoritative_miss_wins_over_later_handler() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/").into_router(),
    ));
    app.route_fn(PathRule::get("/missing.html"), |_| async move {
        Ok(Reply::from("dynamic"))
    });

    let resp = get(&app, "/missing.html").await;
    assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_authoritative_miss_propagates() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/")
            .authoritative(false)
            .into_router(),
    ));
    app.route_fn(PathRule::get("/missing.html"), |_| async move {
        Ok(Reply::from("dynamic"))
    });

    let resp = get(&app, "/missing.html").await;
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(resp.content(), &Content::Text("dynamic".to_string()));
}

#[tokio::test]
async fn authoritative_miss_claims_the_request() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/").into_router(),
    ));

    let req = Arc::new(Request::new(Method::Get, "/missing.html"));
    let resp = app.dispatch(&req, &ShutdownSignal::new()).await.unwrap();
    assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    assert!(req.is_aborted());
}

#[tokio::test]
async fn non_authoritative_miss_leaves_request_unclaimed() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/")
            .authoritative(false)
            .into_router(),
    ));

    let req = Arc::new(Request::new(Method::Get, "/missing.html"));
    app.dispatch(&req, &ShutdownSignal::new()).await.unwrap();
    assert!(!req.is_aborted());
}

#[tokio::test]
async fn excluded_prefix_reaches_dynamic_routes() {
    let dir = site();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/").exclude("api").into_router(),
    ));
    app.route_fn(PathRule::get("/api/channels"), |_| async move {
        Ok(Reply::from(json!(["temperature"])))
    });

    let resp = get(&app, "/api/channels").await;
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(resp.content(), &Content::Json(json!(["temperature"])));
}

#[tokio::test]
async fn auth_gate_fronts_static_files() {
    let dir = site();
    let hash = hash_password("scan").unwrap();
    let mut app = Router::new();
    app.add_middleware(Arc::new(
        AuthGate::new("lab").credential("op", hash).into_router(),
    ));
    app.add_middleware(Arc::new(
        StaticFiles::new(dir.path(), "/static").into_router(),
    ));

    let resp = get(&app, "/static/index.html").await;
    assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);

    let credentials = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        "op:scan",
    );
    let req = Arc::new(
        Request::new(Method::Get, "/static/index.html")
            .with_header("Authorization", format!("Basic {credentials}")),
    );
    let resp = app.dispatch(&req, &ShutdownSignal::new()).await.unwrap();
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(req.principal(), Some("op"));
}
