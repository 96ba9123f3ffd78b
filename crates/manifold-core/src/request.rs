//! Inbound request model.
//!
//! A [`Request`] is immutable after construction except for two monotonic
//! slots: the [`abort`](Request::abort) flag and the attach-once
//! authenticated principal. Both use interior mutability so handlers and
//! middlewares can set them through a shared reference during dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use bytes::Bytes;
use tracing::debug;

/// Request method.
///
/// Besides the real HTTP verbs this includes the duplex-streaming method
/// and the lifecycle pseudo-method: `startup`/`shutdown` events are
/// dispatched through the same route-matching machinery as HTTP requests,
/// with the event name standing in for the verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP DELETE.
    Delete,
    /// Duplex-streaming (websocket) method. Never matched by catch-all rules.
    Websocket,
    /// Lifecycle pseudo-method carrying the event name (e.g. `startup`).
    Event(String),
}

impl Method {
    /// Parses a method received from the wire, case-insensitively.
    ///
    /// Only the real verbs are accepted. `Event` is deliberately not
    /// producible here: lifecycle requests are synthetic, built by the
    /// router for event dispatch, and a remote client must never be able
    /// to name one. Adapters reject a `None` before dispatch.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "DELETE" => Some(Self::Delete),
            "WEBSOCKET" => Some(Self::Websocket),
            _ => None,
        }
    }

    /// Returns true for methods that carry a payload.
    #[must_use]
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
            Self::Delete => f.write_str("DELETE"),
            Self::Websocket => f.write_str("WEBSOCKET"),
            Self::Event(name) => f.write_str(name),
        }
    }
}

/// An inbound request.
///
/// Constructed by a transport adapter from the raw transport envelope, or
/// synthetically by the router for lifecycle events, then shared by
/// reference through the whole dispatch tree.
///
/// # Example
///
/// ```rust
/// use manifold_core::{Method, Request};
///
/// let req = Request::new(Method::Get, "/api/data/tempA?length=60");
/// assert_eq!(req.path(), &["api", "data", "tempA"]);
/// assert_eq!(req.query().get("length").map(String::as_str), Some("60"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: Vec<String>,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    aborted: AtomicBool,
    principal: OnceLock<String>,
}

impl Request {
    /// Creates a request from a method and a URL.
    ///
    /// The URL is split into path segments (empty segments dropped, so
    /// leading/trailing/double slashes are irrelevant) and a
    /// percent-decoded query map where the last occurrence of a key wins.
    #[must_use]
    pub fn new(method: Method, url: &str) -> Self {
        let (path_part, query_part) = match url.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (url, None),
        };

        let path = path_part
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let mut query = HashMap::new();
        if let Some(qs) = query_part {
            match serde_urlencoded::from_str::<Vec<(String, String)>>(qs) {
                Ok(pairs) => {
                    for (k, v) in pairs {
                        query.insert(k, v);
                    }
                }
                Err(err) => {
                    debug!(query = qs, %err, "ignoring undecodable query string");
                }
            }
        }

        Self {
            method,
            path,
            query,
            headers: HashMap::new(),
            body: None,
            aborted: AtomicBool::new(false),
            principal: OnceLock::new(),
        }
    }

    /// Adds a header, lower-casing the name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Attaches a body payload.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path segments, in order, with empties removed.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Decoded query parameters.
    #[must_use]
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Headers, keyed by lower-cased name.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// A header value by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The raw body, if the request carries one.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Marks the request as claimed by an authoritative handler.
    ///
    /// The flag is monotonic: once set it stays set. Short-circuit
    /// middlewares (auth, file serving) use it to signal "I will answer
    /// this request definitively". For ordinary dispatch the flag is
    /// intent only; the websocket claim path treats it as a hard stop.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Whether [`abort`](Self::abort) has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Attaches the authenticated principal. Only the first call wins.
    ///
    /// Returns false if a principal was already attached.
    pub fn set_principal(&self, principal: impl Into<String>) -> bool {
        self.principal.set(principal.into()).is_ok()
    }

    /// The authenticated principal, if one was attached.
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_wire() {
        assert_eq!(Method::from_wire("get"), Some(Method::Get));
        assert_eq!(Method::from_wire("POST"), Some(Method::Post));
        assert_eq!(Method::from_wire("Delete"), Some(Method::Delete));
        assert_eq!(Method::from_wire("websocket"), Some(Method::Websocket));
        // Lifecycle verbs are synthetic; they never parse off the wire.
        assert_eq!(Method::from_wire("startup"), None);
        assert_eq!(Method::from_wire("shutdown"), None);
        assert_eq!(Method::from_wire("PATCH"), None);
    }

    #[test]
    fn test_path_normalization() {
        let req = Request::new(Method::Get, "//api//config/");
        assert_eq!(req.path(), &["api", "config"]);

        let req = Request::new(Method::Get, "");
        assert!(req.path().is_empty());
    }

    #[test]
    fn test_query_decoding() {
        let req = Request::new(Method::Get, "/api?name=a%20b&x=1&x=2");
        assert_eq!(req.query().get("name").map(String::as_str), Some("a b"));
        // Last occurrence wins.
        assert_eq!(req.query().get("x").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_header_case() {
        let req = Request::new(Method::Get, "/").with_header("Content-Type", "text/plain");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_abort_is_monotonic() {
        let req = Request::new(Method::Get, "/");
        assert!(!req.is_aborted());
        req.abort();
        assert!(req.is_aborted());
        req.abort();
        assert!(req.is_aborted());
    }

    #[test]
    fn test_principal_attach_once() {
        let req = Request::new(Method::Get, "/");
        assert!(req.set_principal("alice"));
        assert!(!req.set_principal("mallory"));
        assert_eq!(req.principal(), Some("alice"));
    }
}
