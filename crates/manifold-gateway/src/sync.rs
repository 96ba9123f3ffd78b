//! Synchronous one-call-per-request gateway.
//!
//! This adapter serves hosting environments that hand over one request at
//! a time: request metadata arrives as an [`Environ`] value, the body as a
//! blocking reader, and the caller gets back a complete
//! [`GatewayResponse`]. Dispatch runs on an owned current-thread runtime,
//! so the adapter blocks its caller for the duration of each request.
//!
//! The duplex method is unreachable here by construction; applications
//! relying on push fall back to degraded serialized polling when hosted
//! this way.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use manifold_core::{Method, Request, ShutdownSignal};
use manifold_router::Router;
use tracing::{debug, warn};

use crate::{GatewayConfig, GatewayError};

/// Request metadata as provided by the hosting environment.
#[derive(Debug, Clone, Default)]
pub struct Environ {
    /// Request method name (any case).
    pub method: String,
    /// URL path, without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query_string: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
}

/// The completed response handed back to the hosting environment.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers, content type included.
    pub headers: Vec<(String, String)>,
    /// Serialized body.
    pub body: Bytes,
}

impl GatewayResponse {
    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: Bytes::from(message.to_string()),
        }
    }

    fn from_response(response: manifold_core::Response) -> Self {
        let status = response.status_code();
        let mut headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(ct) = response.content_type() {
            headers.push(("content-type".into(), ct.to_string()));
        }
        Self {
            status,
            headers,
            body: response.into_body(),
        }
    }
}

/// The synchronous gateway adapter.
pub struct SyncGateway {
    app: Arc<Router>,
    config: GatewayConfig,
    shutdown: ShutdownSignal,
    runtime: tokio::runtime::Runtime,
}

impl SyncGateway {
    /// Creates a gateway serving the given application.
    pub fn new(app: Arc<Router>, config: GatewayConfig) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            app,
            config,
            shutdown: ShutdownSignal::new(),
            runtime,
        })
    }

    /// The shutdown signal observed by dispatched handlers.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Handles one request to completion.
    ///
    /// Body policy for payload-carrying methods: a missing content-length
    /// header is 411, an unparsable one is 400, and one above the
    /// configured cap is 413. All three are checked before a single body
    /// byte is read, so a hostile declared length never allocates.
    pub fn handle(&self, environ: &Environ, body: &mut dyn Read) -> GatewayResponse {
        let Some(method) = Method::from_wire(&environ.method) else {
            debug!(method = %environ.method, "unrecognized wire method; rejecting");
            return GatewayResponse::error(
                StatusCode::NOT_IMPLEMENTED,
                "unrecognized method",
            );
        };
        if method == Method::Websocket {
            return GatewayResponse::error(
                StatusCode::METHOD_NOT_ALLOWED,
                "duplex connections need the asynchronous gateway",
            );
        }

        let payload = if method.has_body() {
            match read_declared_body(environ, body, self.config.max_body_size) {
                Ok(bytes) => Some(bytes),
                Err(resp) => return resp,
            }
        } else {
            None
        };

        let url = if environ.query_string.is_empty() {
            environ.path.clone()
        } else {
            format!("{}?{}", environ.path, environ.query_string)
        };

        let mut request = Request::new(method, &url);
        for (name, value) in &environ.headers {
            request = request.with_header(name, value.clone());
        }
        if let Some(bytes) = payload {
            request = request.with_body(bytes);
        }
        let request = Arc::new(request);

        match self
            .runtime
            .block_on(self.app.dispatch(&request, &self.shutdown))
        {
            Ok(response) => GatewayResponse::from_response(response),
            Err(cancelled) => {
                debug!(%cancelled, "dispatch cancelled; answering 503");
                GatewayResponse::error(StatusCode::SERVICE_UNAVAILABLE, "shutting down")
            }
        }
    }
}

fn read_declared_body(
    environ: &Environ,
    body: &mut dyn Read,
    max_body_size: usize,
) -> Result<Bytes, GatewayResponse> {
    let declared = environ
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.as_str());

    let Some(declared) = declared else {
        return Err(GatewayResponse::error(
            StatusCode::LENGTH_REQUIRED,
            "content-length required",
        ));
    };
    let Ok(length) = declared.trim().parse::<usize>() else {
        return Err(GatewayResponse::error(
            StatusCode::BAD_REQUEST,
            "bad content-length",
        ));
    };
    if length > max_body_size {
        warn!(length, max_body_size, "declared body over cap; rejecting");
        return Err(GatewayResponse::error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request entity too large",
        ));
    }

    let mut buffer = vec![0u8; length];
    if let Err(err) = body.read_exact(&mut buffer) {
        debug!(%err, "short body read");
        return Err(GatewayResponse::error(
            StatusCode::BAD_REQUEST,
            "truncated body",
        ));
    }
    Ok(Bytes::from(buffer))
}
