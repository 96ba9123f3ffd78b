//! Response accumulator and merge reducer.
//!
//! Dispatch folds every handler/middleware/sub-app contribution into one
//! [`Response`] via [`Response::merge`]. A status of `0` means "no
//! opinion": such a response propagates without overriding anything, and a
//! caller that ends up with an unset status after all merging treats the
//! result as 404.

use std::collections::HashMap;

use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;
use tracing::warn;

/// Tagged union over response payload kinds.
///
/// Combination is total: the pairs with defined semantics combine, every
/// other pairing keeps the earlier content and logs the skipped value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    /// No payload.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, passed through untouched.
    Bytes(Bytes),
    /// JSON payload (object, array, or scalar).
    Json(Value),
}

impl Content {
    /// Whether there is no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Combines a later contribution into this one.
    ///
    /// text⊕text joins with a newline, array⊕array concatenates,
    /// object⊕object unions keys with later keys overwriting. Anything
    /// else keeps the earlier content; the skipped value is logged because
    /// two handlers disagreeing on the payload kind is an application bug
    /// worth surfacing.
    pub fn combine(&mut self, later: Content) {
        match (&mut *self, later) {
            (_, Content::Empty) => {}
            (Content::Empty, later) => *self = later,
            (Content::Text(a), Content::Text(b)) => {
                a.push('\n');
                a.push_str(&b);
            }
            (Content::Json(Value::Array(a)), Content::Json(Value::Array(mut b))) => {
                a.append(&mut b);
            }
            (Content::Json(Value::Object(a)), Content::Json(Value::Object(b))) => {
                for (k, v) in b {
                    a.insert(k, v);
                }
            }
            (earlier, later) => {
                warn!(
                    earlier = earlier.kind_name(),
                    later = later.kind_name(),
                    "incompatible response contents; keeping earlier"
                );
            }
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(Value::Object(_)) => "json-object",
            Self::Json(Value::Array(_)) => "json-array",
            Self::Json(_) => "json-scalar",
        }
    }

    /// The default MIME type for this payload kind.
    #[must_use]
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Bytes(_) => Some("application/octet-stream"),
            Self::Json(_) => Some("application/json"),
        }
    }
}

/// Outgoing response accumulator.
///
/// # Example
///
/// ```rust
/// use manifold_core::Response;
/// use serde_json::json;
///
/// let mut resp = Response::json(json!({"a": 1}));
/// resp.merge(Response::json(json!({"b": 2})));
/// assert_eq!(resp.status_code(), http::StatusCode::OK);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: u16,
    content_type: Option<String>,
    content: Content,
    headers: HashMap<String, String>,
}

impl Response {
    /// A response with no opinion: propagates through merging untouched.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A status-only response.
    #[must_use]
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            ..Self::default()
        }
    }

    /// A 200 response with JSON content.
    #[must_use]
    pub fn json(value: Value) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            content: Content::Json(value),
            ..Self::default()
        }
    }

    /// A 200 response with text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            content: Content::Text(text.into()),
            ..Self::default()
        }
    }

    /// A 200 response with raw bytes and an explicit content type.
    #[must_use]
    pub fn bytes(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            content_type: Some(content_type.into()),
            content: Content::Bytes(body.into()),
            ..Self::default()
        }
    }

    /// Replaces the status, keeping content.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status.as_u16();
        self
    }

    /// Adds an extra response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The raw status: 0 while no handler has expressed an opinion.
    #[must_use]
    pub fn raw_status(&self) -> u16 {
        self.status
    }

    /// Whether any handler has contributed a status.
    #[must_use]
    pub fn has_opinion(&self) -> bool {
        self.status != 0
    }

    /// The effective status code; an unset status reads as 404.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.status == 0 {
            return StatusCode::NOT_FOUND;
        }
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The response payload.
    #[must_use]
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Extra response headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The effective content type: the explicit one if set, otherwise the
    /// payload kind's default.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| self.content.default_content_type())
    }

    /// Merges a later contribution into this response.
    ///
    /// The strictly higher status wins entirely: status, content type,
    /// content, and headers are all replaced, so a definitive error from
    /// one stage is never diluted by another stage's success regardless of
    /// fold direction. Equal statuses combine contents per
    /// [`Content::combine`] and union headers (later wins on collision).
    pub fn merge(&mut self, later: Response) {
        if later.status > self.status {
            *self = later;
            return;
        }
        if later.status < self.status {
            return;
        }
        self.content.combine(later.content);
        if self.content_type.is_none() {
            self.content_type = later.content_type;
        }
        self.headers.extend(later.headers);
    }

    /// Serializes the payload to wire bytes.
    ///
    /// Never fails: JSON that cannot be serialized (which cannot happen for
    /// plain `serde_json::Value` trees, but content may carry partially
    /// decoded driver data in future variants) falls back to its display
    /// form.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        match self.content {
            Content::Empty => Bytes::new(),
            Content::Text(s) => Bytes::from(s),
            Content::Bytes(b) => b,
            Content::Json(v) => match serde_json::to_vec(&v) {
                Ok(buf) => Bytes::from(buf),
                Err(err) => {
                    warn!(%err, "json serialization failed; sending display form");
                    Bytes::from(v.to_string())
                }
            },
        }
    }
}
