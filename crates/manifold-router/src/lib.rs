//! Route table and dispatch core for Manifold.
//!
//! This crate implements the three moving parts of the dispatcher:
//!
//! - [`PathRule`]: a compiled URL pattern plus explicit parameter-binding
//!   descriptors. Built once at registration time, immutable afterwards,
//!   reused for every matching attempt.
//! - [`Router`]: a node owning ordered lists of routes, middleware routers,
//!   and child sub-applications. Dispatch folds every contribution into a
//!   single merged [`Response`](manifold_core::Response).
//! - [`Socket`]: the duplex channel handed to the one handler that claims a
//!   websocket request.
//!
//! # Dispatch model
//!
//! For a normal request the router tries middlewares first (so they can
//! veto via [`Request::abort`](manifold_core::Request::abort) or contribute
//! headers before real handlers run), then its own routes in registration
//! order, then sub-applications, merging each partial response. A handler
//! failure is logged and contributes nothing; cooperative-shutdown
//! cancellation propagates instead.
//!
//! Lifecycle events (`startup`/`shutdown`) reuse the same machinery with a
//! synthetic request; `shutdown` walks each list in reverse registration
//! order so resources are torn down opposite to acquisition.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use manifold_core::{Method, Request, ShutdownSignal};
//! use manifold_router::{ParamSpec, PathRule, Reply, Router};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut app = Router::new();
//! app.route_fn(
//!     PathRule::get("/hello/{name}").param(ParamSpec::str("name")),
//!     |inv| async move {
//!         let name = inv.args.str("name").unwrap_or("world").to_string();
//!         Ok(Reply::from(format!("hello {name}")))
//!     },
//! );
//!
//! let req = Arc::new(Request::new(Method::Get, "/hello/dashboard"));
//! let resp = app.dispatch(&req, &ShutdownSignal::new()).await.unwrap();
//! assert_eq!(resp.status_code(), http::StatusCode::OK);
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/manifold-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod handler;
mod router;
mod rule;
mod socket;

pub use handler::{handler_fn, BoxFuture, Handler, HandlerError, HandlerResult, Invocation, Reply};
pub use router::{events, Router};
pub use rule::{Args, Bind, ParamKind, ParamSpec, PathRule, RuleMethod};
pub use socket::{Socket, SocketError, SocketMessage};
