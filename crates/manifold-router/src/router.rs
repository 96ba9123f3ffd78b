//! The dispatch unit: ordered routes, middlewares, and sub-applications.

use std::sync::Arc;

use manifold_core::{Cancelled, DispatchResult, Method, Request, Response, ShutdownSignal};
use tracing::{debug, warn};

use crate::handler::{handler_fn, Handler, HandlerError, HandlerResult, Invocation};
use crate::rule::PathRule;
use crate::socket::Socket;

/// Well-known lifecycle event names.
pub mod events {
    /// Dispatched before the first request is accepted.
    pub const STARTUP: &str = "startup";
    /// Dispatched after the last request; teardown runs in reverse
    /// registration order.
    pub const SHUTDOWN: &str = "shutdown";
}

struct Route {
    rule: PathRule,
    handler: Arc<dyn Handler>,
}

/// A dispatch node.
///
/// Middlewares are tried before local routes so they can veto or annotate
/// the request; sub-applications are tried after. All three lists are
/// folded in registration order and their partial responses merged.
///
/// The mutation methods take `&mut self`, so the borrow checker already
/// rules out mutating a router that is concurrently dispatching through a
/// shared reference: build the tree, wrap it in an `Arc`, then serve.
/// Dynamic reconfiguration means rebuilding and swapping the `Arc`.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<Arc<Router>>,
    children: Vec<Arc<Router>>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule/handler pair.
    pub fn route(&mut self, rule: PathRule, handler: impl Handler) -> &mut Self {
        self.routes.push(Route {
            rule,
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers an async closure as a handler. See
    /// [`handler_fn`](crate::handler_fn).
    pub fn route_fn<F, Fut>(&mut self, rule: PathRule, f: F) -> &mut Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.route(rule, handler_fn(f))
    }

    /// Mounts a child sub-application.
    pub fn include(&mut self, child: Arc<Router>) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Unmounts a child; returns whether it was mounted.
    pub fn remove(&mut self, child: &Arc<Router>) -> bool {
        let before = self.children.len();
        self.children.retain(|c| !Arc::ptr_eq(c, child));
        self.children.len() != before
    }

    /// Mounts a middleware router, tried before local routes.
    pub fn add_middleware(&mut self, middleware: Arc<Router>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Unmounts a middleware; returns whether it was mounted.
    pub fn remove_middleware(&mut self, middleware: &Arc<Router>) -> bool {
        let before = self.middlewares.len();
        self.middlewares.retain(|m| !Arc::ptr_eq(m, middleware));
        self.middlewares.len() != before
    }

    /// Dispatches a request through this node and everything mounted on
    /// it, merging all partial responses.
    ///
    /// The caller treats an unset status on the merged result as 404.
    pub async fn dispatch(
        &self,
        request: &Arc<Request>,
        shutdown: &ShutdownSignal,
    ) -> DispatchResult<Response> {
        self.dispatch_ordered(request, shutdown, false).await
    }

    /// Dispatches a lifecycle event as a synthetic request.
    ///
    /// [`events::SHUTDOWN`] walks middlewares, routes, and sub-apps in
    /// reverse registration order: last acquired, first torn down.
    pub async fn dispatch_event(
        &self,
        name: &str,
        shutdown: &ShutdownSignal,
    ) -> DispatchResult<Response> {
        let request = Arc::new(Request::new(Method::Event(name.to_string()), name));
        let reverse = name == events::SHUTDOWN;
        self.dispatch_ordered(&request, shutdown, reverse).await
    }

    fn dispatch_ordered<'a>(
        &'a self,
        request: &'a Arc<Request>,
        shutdown: &'a ShutdownSignal,
        reverse: bool,
    ) -> crate::BoxFuture<'a, DispatchResult<Response>> {
        Box::pin(async move {
            let mut merged = Response::empty();

            for middleware in iter_dir(&self.middlewares, reverse) {
                let partial = middleware
                    .dispatch_ordered(request, shutdown, reverse)
                    .await?;
                merged.merge(partial);
            }

            for route in iter_dir(&self.routes, reverse) {
                if route.rule.requires_socket() {
                    continue;
                }
                let Some(args) = route.rule.matches(request) else {
                    continue;
                };
                let invocation = Invocation {
                    request: Arc::clone(request),
                    args,
                    socket: None,
                    shutdown: shutdown.clone(),
                };
                match route.handler.call(invocation).await {
                    Ok(reply) => merged.merge(reply.into_response(route.rule.default_status())),
                    Err(HandlerError::Cancelled) => return Err(Cancelled),
                    Err(HandlerError::Failed(detail)) => {
                        // The handler contributes nothing; siblings still run.
                        warn!(path = %request.path().join("/"), %detail, "handler failed");
                    }
                }
            }

            for child in iter_dir(&self.children, reverse) {
                let partial = child.dispatch_ordered(request, shutdown, reverse).await?;
                merged.merge(partial);
            }

            Ok(merged)
        })
    }

    /// Dispatches a duplex connection: the first matching handler in the
    /// tree claims the socket exclusively.
    ///
    /// Unlike normal dispatch this is first-match-wins, not merged; a
    /// duplex connection can only be owned by one handler. The request is
    /// aborted at claim time so nothing else contends for the socket.
    /// Returns whether any handler claimed it; when none did, the caller
    /// closes the connection.
    pub async fn websocket(
        &self,
        request: &Arc<Request>,
        socket: Socket,
        shutdown: &ShutdownSignal,
    ) -> DispatchResult<bool> {
        let mut slot = Some(socket);
        self.claim(request, &mut slot, shutdown).await
    }

    /// Read-only probe: whether any handler in the tree would claim this
    /// duplex request. Transport adapters use it to accept or refuse a
    /// connection before committing to the pump loop.
    #[must_use]
    pub fn can_claim(&self, request: &Request) -> bool {
        if request.is_aborted() {
            return false;
        }
        self.middlewares.iter().any(|m| m.can_claim(request))
            || self
                .routes
                .iter()
                .any(|r| r.rule.requires_socket() && r.rule.matches(request).is_some())
            || self.children.iter().any(|c| c.can_claim(request))
    }

    fn claim<'a>(
        &'a self,
        request: &'a Arc<Request>,
        slot: &'a mut Option<Socket>,
        shutdown: &'a ShutdownSignal,
    ) -> crate::BoxFuture<'a, DispatchResult<bool>> {
        Box::pin(async move {
            // The one true short-circuit: an already-claimed connection is
            // never offered to anyone else.
            if request.is_aborted() {
                return Ok(false);
            }

            for middleware in &self.middlewares {
                if middleware.claim(request, slot, shutdown).await? {
                    return Ok(true);
                }
            }

            for route in &self.routes {
                if !route.rule.requires_socket() {
                    continue;
                }
                let Some(args) = route.rule.matches(request) else {
                    continue;
                };
                request.abort();
                let invocation = Invocation {
                    request: Arc::clone(request),
                    args,
                    socket: slot.take(),
                    shutdown: shutdown.clone(),
                };
                match route.handler.call(invocation).await {
                    Ok(_) => {}
                    Err(HandlerError::Cancelled) => return Err(Cancelled),
                    Err(HandlerError::Failed(detail)) => {
                        warn!(path = %request.path().join("/"), %detail, "socket handler failed");
                    }
                }
                return Ok(true);
            }

            for child in &self.children {
                if child.claim(request, slot, shutdown).await? {
                    return Ok(true);
                }
            }

            debug!(path = %request.path().join("/"), "no handler claimed socket");
            Ok(false)
        })
    }
}

fn iter_dir<T>(items: &[T], reverse: bool) -> impl Iterator<Item = &T> {
    // Allocation-free either-direction walk; exactly one side is populated.
    let forward = (!reverse).then(|| items.iter());
    let backward = reverse.then(|| items.iter().rev());
    forward
        .into_iter()
        .flatten()
        .chain(backward.into_iter().flatten())
}
