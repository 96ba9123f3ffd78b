//! Transport adapters for Manifold.
//!
//! Two gateway bindings terminate in the same
//! [`Router::dispatch`](manifold_router::Router::dispatch):
//!
//! - [`SyncGateway`]: one call per request, driven by an environ-style
//!   metadata map plus a blocking body reader. Fundamentally
//!   request-at-a-time: no duplex support, so websocket routes are never
//!   reachable through it. Exists for simple or legacy hosting setups.
//! - [`AsyncGateway`]: an event-stream protocol with three flows
//!   (lifespan, http, websocket) and explicit start/body/end framing in
//!   both directions. The adapter of record for real deployments; the
//!   only one that can host long-lived bidirectional channels.
//!
//! Both share the body-size-cap policy from [`GatewayConfig`]: a declared
//! content length over the cap is rejected with 413 before any body byte
//! is read.

#![doc(html_root_url = "https://docs.rs/manifold-gateway/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod asgi;
mod config;
mod sync;

pub use asgi::{AsyncGateway, ClientEvent, RequestScope, Scope, ServerEvent};
pub use config::GatewayConfig;
pub use sync::{Environ, GatewayResponse, SyncGateway};

use thiserror::Error;

/// Adapter-level failures.
///
/// These are transport problems, not application errors: application
/// failures are contained at the handler boundary and never surface here.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The peer violated the event protocol (wrong event for the flow).
    #[error("transport protocol violation: {0}")]
    Protocol(String),

    /// The event channel to the transport closed mid-flow.
    #[error("transport event channel closed")]
    ChannelClosed,

    /// I/O failure while reading a request body or building the runtime.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
