//! Handler trait and invocation types.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use manifold_core::{Request, Response, ShutdownSignal};
use serde_json::Value;
use thiserror::Error;

use crate::rule::Args;
use crate::socket::Socket;

/// A boxed future, as stored behind the type-erased handler trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a handler receives for one invocation.
pub struct Invocation {
    /// The request being dispatched.
    pub request: Arc<Request>,
    /// Arguments bound by the matched rule.
    pub args: Args,
    /// The claimed duplex socket, on the websocket path only.
    pub socket: Option<Socket>,
    /// Cooperative shutdown signal. Long-running handlers select on this
    /// and return [`HandlerError::Cancelled`] when it fires.
    pub shutdown: ShutdownSignal,
}

/// What a handler contributes to the merged response.
///
/// Plain values are wrapped into a [`Response`] using the rule's default
/// status; a full `Response` passes through unchanged.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Contribute nothing (an empty, propagating response).
    None,
    /// JSON content.
    Json(Value),
    /// Text content.
    Text(String),
    /// Raw bytes with a content type.
    Bytes(Bytes, String),
    /// A fully formed response.
    Response(Response),
}

impl Reply {
    /// Wraps this reply into a response, applying `default_status` to
    /// plain values.
    #[must_use]
    pub fn into_response(self, default_status: StatusCode) -> Response {
        match self {
            Self::None => Response::empty(),
            Self::Json(v) => Response::json(v).status(default_status),
            Self::Text(s) => Response::text(s).status(default_status),
            Self::Bytes(b, ct) => Response::bytes(b, ct).status(default_status),
            Self::Response(r) => r,
        }
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<Value> for Reply {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Response> for Reply {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

/// Handler-side failure modes.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler observed the shutdown signal; propagated, not logged.
    #[error("handler cancelled by shutdown")]
    Cancelled,
    /// Any other failure; logged by the dispatch loop, after which the
    /// handler simply contributes nothing.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// A failure with a formatted detail message.
    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }
}

/// Result type returned by handlers.
pub type HandlerResult = Result<Reply, HandlerError>;

/// A type-erased route handler.
pub trait Handler: Send + Sync + 'static {
    /// Handles one invocation.
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, HandlerResult>;
}

/// Wraps an async closure as a [`Handler`].
///
/// # Example
///
/// ```rust
/// use manifold_router::{handler_fn, Reply};
///
/// let handler = handler_fn(|inv| async move {
///     let _ = inv.request.path();
///     Ok(Reply::from("pong"))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

/// Adapter making a closure usable as a [`Handler`]. See [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(invocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::Content;
    use serde_json::json;

    #[test]
    fn test_plain_reply_gets_default_status() {
        let resp = Reply::from(json!({"ok": true})).into_response(StatusCode::CREATED);
        assert_eq!(resp.status_code(), StatusCode::CREATED);
        assert_eq!(resp.content(), &Content::Json(json!({"ok": true})));
    }

    #[test]
    fn test_full_response_keeps_its_status() {
        let resp = Reply::from(Response::with_status(StatusCode::UNAUTHORIZED))
            .into_response(StatusCode::OK);
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_none_reply_propagates() {
        let resp = Reply::from(()).into_response(StatusCode::OK);
        assert!(!resp.has_opinion());
    }

    #[test]
    fn test_fn_handler_invocation() {
        use manifold_core::Method;

        let handler = handler_fn(|inv: Invocation| async move {
            Ok(Reply::from(format!("/{}", inv.request.path().join("/"))))
        });
        let invocation = Invocation {
            request: Arc::new(Request::new(Method::Get, "/api/ping")),
            args: crate::Args::default(),
            socket: None,
            shutdown: ShutdownSignal::new(),
        };
        let reply = tokio_test::block_on(handler.call(invocation)).unwrap();
        assert!(matches!(reply, Reply::Text(t) if t == "/api/ping"));
    }
}
