//! # Manifold
//!
//! **Request routing and dispatch framework for data-acquisition services**
//!
//! Manifold is a small application framework built around one idea: a
//! request is offered to every matching handler, and the handlers'
//! responses are merged into a single answer. That makes cross-cutting
//! concerns (authentication, static assets, instrumentation) ordinary
//! routed components instead of a separate middleware calculus.
//!
//! - **Routing** – compiled [`PathRule`](router::PathRule) patterns with
//!   placeholder capture, trailing wildcards, and typed parameter binding
//! - **Composition** – middleware and sub-application routers merged into
//!   one dispatch tree with ordered startup and reverse-order shutdown
//! - **Transports** – a synchronous environ-driven gateway and an
//!   asynchronous three-flow event gateway with websocket support
//! - **Batteries** – Basic-auth gate and static file responder included
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use manifold::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut app = Router::new();
//! app.route_fn(
//!     PathRule::get("/channels/{name}").param(ParamSpec::str("name")),
//!     |inv| async move {
//!         let name = inv.args.str("name").unwrap_or("unknown").to_string();
//!         Ok(Reply::from(serde_json::json!({ "channel": name })))
//!     },
//! );
//!
//! let req = Arc::new(Request::new(Method::Get, "/channels/temperature"));
//! let resp = app.dispatch(&req, &ShutdownSignal::new()).await.unwrap();
//! assert_eq!(resp.status_code(), http::StatusCode::OK);
//! # }
//! ```
//!
//! ## Dispatch
//!
//! ```text
//! Gateway → Request → middlewares → own routes → sub-applications
//!                           ↓            ↓              ↓
//!            Response ← merge ←────── merge ←──────── merge
//! ```
//!
//! Higher status codes dominate the merge, so a gate's 401 survives even
//! when later handlers answer 200; equal-status contents are combined.

#![doc(html_root_url = "https://docs.rs/manifold/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the request/response model
pub use manifold_core as core;

// Re-export the route table and dispatch core
pub use manifold_router as router;

// Re-export the transport adapters
pub use manifold_gateway as gateway;

// Re-export the bundled middleware components
pub use manifold_middleware as middleware;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use manifold::prelude::*;
/// ```
pub mod prelude {
    pub use manifold_core::{
        Cancelled, Content, DispatchResult, Method, Request, Response, ShutdownSignal,
    };

    // Routing and handler types
    pub use manifold_router::{
        events, handler_fn, Args, Bind, Handler, HandlerError, HandlerResult, Invocation,
        ParamKind, ParamSpec, PathRule, Reply, Router, Socket, SocketMessage,
    };

    // Transport adapters
    pub use manifold_gateway::{AsyncGateway, GatewayConfig, SyncGateway};

    // Bundled middleware
    pub use manifold_middleware::{hash_password, AuthGate, StaticFiles};
}
