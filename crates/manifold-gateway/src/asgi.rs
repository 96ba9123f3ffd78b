//! Asynchronous event-stream gateway.
//!
//! One [`AsyncGateway::serve`] call drives one connection of one of three
//! flows, chosen by the [`Scope`]:
//!
//! - **Lifespan**: the transport sends [`ClientEvent::LifespanStartup`]
//!   before its first request and [`ClientEvent::LifespanShutdown`] after
//!   its last; the gateway dispatches the matching lifecycle events and
//!   acknowledges each.
//! - **Http**: body chunks accumulate up to the configured cap, the
//!   request dispatches, and the response streams back as a start frame
//!   followed by body frames.
//! - **Websocket**: the event stream is bridged into a
//!   [`Socket`](manifold_router::Socket) pair handed to the one handler
//!   that claims the connection; if nobody claims it, the gateway closes.
//!
//! Handlers here run on the shared cooperative event loop: a synchronous
//! handler that blocks stalls every connection on this loop for its
//! duration. Offload genuinely blocking work to a worker thread.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use manifold_core::{Method, Request, Response, ShutdownSignal};
use manifold_router::{events, Router, Socket, SocketMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{GatewayConfig, GatewayError};

/// Connection flavor for one [`AsyncGateway::serve`] call.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Process-level startup/shutdown handshake.
    Lifespan,
    /// One request/response exchange.
    Http(RequestScope),
    /// One long-lived duplex connection.
    Websocket(RequestScope),
}

/// Request metadata for http and websocket scopes.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    /// Request method name (ignored for websocket scopes).
    pub method: String,
    /// URL path, without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query_string: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
}

/// Events flowing from the transport into the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Lifespan flow: the process is starting.
    LifespanStartup,
    /// Lifespan flow: the process is stopping.
    LifespanShutdown,
    /// Http flow: a body chunk; `more` marks continuation.
    RequestBody {
        /// Chunk payload.
        data: Bytes,
        /// Whether further chunks follow.
        more: bool,
    },
    /// Websocket flow: the client finished its handshake.
    Connect,
    /// Websocket flow: an inbound text frame.
    MessageText(String),
    /// Websocket flow: an inbound binary frame.
    MessageBinary(Bytes),
    /// Websocket flow: the client went away.
    Disconnect,
}

/// Events flowing from the gateway back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Lifespan startup completed.
    StartupComplete,
    /// Lifespan startup was cancelled by shutdown.
    StartupFailed(String),
    /// Lifespan shutdown completed.
    ShutdownComplete,
    /// Http flow: status and headers.
    ResponseStart {
        /// Response status code.
        status: u16,
        /// Response headers, content type included.
        headers: Vec<(String, String)>,
    },
    /// Http flow: a body chunk; `more` marks continuation.
    ResponseBody {
        /// Chunk payload.
        data: Bytes,
        /// Whether further chunks follow.
        more: bool,
    },
    /// Websocket flow: the connection is accepted.
    Accept,
    /// Websocket flow: an outbound text frame.
    MessageText(String),
    /// Websocket flow: an outbound binary frame.
    MessageBinary(Bytes),
    /// Websocket flow: the gateway is closing the connection.
    Close {
        /// Close code (1000 normal, 1003 unsupported/unclaimed).
        code: u16,
    },
}

/// The asynchronous gateway adapter.
pub struct AsyncGateway {
    app: Arc<Router>,
    config: GatewayConfig,
    shutdown: ShutdownSignal,
}

impl AsyncGateway {
    /// Creates a gateway serving the given application.
    #[must_use]
    pub fn new(app: Arc<Router>, config: GatewayConfig) -> Self {
        Self {
            app,
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Replaces the shutdown signal (to share one across gateways).
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The shutdown signal observed by dispatched handlers.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Drives one connection to completion.
    pub async fn serve(
        &self,
        scope: Scope,
        rx: mpsc::Receiver<ClientEvent>,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<(), GatewayError> {
        match scope {
            Scope::Lifespan => self.serve_lifespan(rx, tx).await,
            Scope::Http(scope) => self.serve_http(scope, rx, tx).await,
            Scope::Websocket(scope) => self.serve_websocket(scope, rx, tx).await,
        }
    }

    async fn serve_lifespan(
        &self,
        mut rx: mpsc::Receiver<ClientEvent>,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<(), GatewayError> {
        while let Some(event) = rx.recv().await {
            match event {
                ClientEvent::LifespanStartup => {
                    match self.app.dispatch_event(events::STARTUP, &self.shutdown).await {
                        Ok(_) => send(&tx, ServerEvent::StartupComplete).await?,
                        Err(cancelled) => {
                            send(&tx, ServerEvent::StartupFailed(cancelled.to_string())).await?;
                            return Ok(());
                        }
                    }
                }
                ClientEvent::LifespanShutdown => {
                    self.shutdown.trigger();
                    // Teardown handlers must run even though the signal has
                    // fired; a cancellation here is already satisfied.
                    let _ = self.app.dispatch_event(events::SHUTDOWN, &self.shutdown).await;
                    send(&tx, ServerEvent::ShutdownComplete).await?;
                    return Ok(());
                }
                other => {
                    return Err(GatewayError::Protocol(format!(
                        "unexpected event in lifespan flow: {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn serve_http(
        &self,
        scope: RequestScope,
        mut rx: mpsc::Receiver<ClientEvent>,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<(), GatewayError> {
        let Some(method) = Method::from_wire(&scope.method) else {
            debug!(method = %scope.method, "unrecognized wire method; rejecting");
            return send_plain(&tx, StatusCode::NOT_IMPLEMENTED, "unrecognized method").await;
        };
        if method == Method::Websocket {
            return send_plain(
                &tx,
                StatusCode::METHOD_NOT_ALLOWED,
                "duplex connections use the websocket flow",
            )
            .await;
        }

        // Reject on the declared length alone when the client announces
        // more than the cap up front.
        if let Some(declared) = header_value(&scope.headers, "content-length") {
            if declared
                .trim()
                .parse::<usize>()
                .is_ok_and(|n| n > self.config.max_body_size)
            {
                warn!(declared, "declared body over cap; rejecting");
                return send_plain(&tx, StatusCode::PAYLOAD_TOO_LARGE, "request entity too large")
                    .await;
            }
        }

        let mut body = BytesMut::new();
        if method.has_body() {
            loop {
                match rx.recv().await {
                    Some(ClientEvent::RequestBody { data, more }) => {
                        if body.len() + data.len() > self.config.max_body_size {
                            warn!(
                                received = body.len() + data.len(),
                                "accumulated body over cap; rejecting"
                            );
                            return send_plain(
                                &tx,
                                StatusCode::PAYLOAD_TOO_LARGE,
                                "request entity too large",
                            )
                            .await;
                        }
                        body.extend_from_slice(&data);
                        if !more {
                            break;
                        }
                    }
                    Some(other) => {
                        return Err(GatewayError::Protocol(format!(
                            "unexpected event in http flow: {other:?}"
                        )));
                    }
                    None => return Err(GatewayError::ChannelClosed),
                }
            }
        }

        let url = if scope.query_string.is_empty() {
            scope.path.clone()
        } else {
            format!("{}?{}", scope.path, scope.query_string)
        };
        let mut request = Request::new(method, &url);
        for (name, value) in &scope.headers {
            request = request.with_header(name, value.clone());
        }
        if !body.is_empty() {
            request = request.with_body(body.freeze());
        }
        let request = Arc::new(request);

        match self.app.dispatch(&request, &self.shutdown).await {
            Ok(response) => send_response(&tx, response).await,
            Err(cancelled) => {
                // Clean exit: drop the connection without a response.
                debug!(%cancelled, "dispatch cancelled; dropping connection");
                Ok(())
            }
        }
    }

    async fn serve_websocket(
        &self,
        scope: RequestScope,
        mut rx: mpsc::Receiver<ClientEvent>,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<(), GatewayError> {
        match rx.recv().await {
            Some(ClientEvent::Connect) => {}
            Some(other) => {
                return Err(GatewayError::Protocol(format!(
                    "expected connect, got {other:?}"
                )));
            }
            None => return Err(GatewayError::ChannelClosed),
        }

        let url = if scope.query_string.is_empty() {
            scope.path.clone()
        } else {
            format!("{}?{}", scope.path, scope.query_string)
        };
        let mut request = Request::new(Method::Websocket, &url);
        for (name, value) in &scope.headers {
            request = request.with_header(name, value.clone());
        }
        let request = Arc::new(request);

        if !self.app.can_claim(&request) {
            debug!(path = %scope.path, "no websocket handler; refusing");
            send(&tx, ServerEvent::Close { code: 1003 }).await?;
            return Ok(());
        }
        send(&tx, ServerEvent::Accept).await?;

        let (handler_side, transport_side) = Socket::pair(32);
        let claim = self.app.websocket(&request, handler_side, &self.shutdown);
        let pump = pump(transport_side, &mut rx, &tx);
        let (claimed, pump_result) = tokio::join!(claim, pump);
        pump_result?;

        match claimed {
            Ok(_) => send(&tx, ServerEvent::Close { code: 1000 }).await,
            // Shutdown mid-connection: close without ceremony.
            Err(_) => Ok(()),
        }
    }
}

/// Bridges transport events and the handler's socket until either side
/// goes away.
async fn pump(
    transport_side: Socket,
    rx: &mut mpsc::Receiver<ClientEvent>,
    tx: &mpsc::Sender<ServerEvent>,
) -> Result<(), GatewayError> {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ClientEvent::MessageText(text)) => {
                    if transport_side.send(SocketMessage::Text(text)).await.is_err() {
                        return Ok(());
                    }
                }
                Some(ClientEvent::MessageBinary(data)) => {
                    if transport_side.send(SocketMessage::Binary(data)).await.is_err() {
                        return Ok(());
                    }
                }
                Some(ClientEvent::Disconnect) | None => {
                    // Dropping our end tells the handler the peer is gone.
                    let _ = transport_side.send(SocketMessage::Close).await;
                    return Ok(());
                }
                Some(other) => {
                    return Err(GatewayError::Protocol(format!(
                        "unexpected event in websocket flow: {other:?}"
                    )));
                }
            },
            message = transport_side.recv() => match message {
                Some(SocketMessage::Text(text)) => {
                    send(tx, ServerEvent::MessageText(text)).await?;
                }
                Some(SocketMessage::Binary(data)) => {
                    send(tx, ServerEvent::MessageBinary(data)).await?;
                }
                Some(SocketMessage::Close) | None => return Ok(()),
            },
        }
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

async fn send(tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> Result<(), GatewayError> {
    tx.send(event).await.map_err(|_| GatewayError::ChannelClosed)
}

async fn send_response(
    tx: &mpsc::Sender<ServerEvent>,
    response: Response,
) -> Result<(), GatewayError> {
    let status = response.status_code().as_u16();
    let mut headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(ct) = response.content_type() {
        headers.push(("content-type".into(), ct.to_string()));
    }
    send(tx, ServerEvent::ResponseStart { status, headers }).await?;
    send(
        tx,
        ServerEvent::ResponseBody {
            data: response.into_body(),
            more: false,
        },
    )
    .await
}

async fn send_plain(
    tx: &mpsc::Sender<ServerEvent>,
    status: StatusCode,
    message: &str,
) -> Result<(), GatewayError> {
    send(
        tx,
        ServerEvent::ResponseStart {
            status: status.as_u16(),
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
        },
    )
    .await?;
    send(
        tx,
        ServerEvent::ResponseBody {
            data: Bytes::from(message.to_string()),
            more: false,
        },
    )
    .await
}
