//! Route pattern compilation and parameter binding.
//!
//! A [`PathRule`] is compiled once at registration time from a URL pattern
//! (`/api/data/{channels}`, optionally ending in a `{*}` wildcard), the
//! method it answers to, a default success status, and an ordered list of
//! explicit [`Bind`] descriptors declaring how handler arguments are
//! filled in. Matching a concrete request either produces a fully bound
//! [`Args`] value or fails the match; a failed match is a normal "try the
//! next rule" signal, never an error to the client.

use std::collections::HashMap;

use bytes::Bytes;
use http::StatusCode;
use manifold_core::{Method, Request};
use serde_json::Value;
use tracing::debug;

/// The method a rule answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP DELETE.
    Delete,
    /// The duplex-streaming method. Only reachable through
    /// [`Router::websocket`](crate::Router::websocket).
    Websocket,
    /// Matches every method except `Websocket`, which always requires an
    /// explicit registration.
    Any,
    /// A lifecycle event name (`startup`, `shutdown`, ...).
    Event(String),
}

impl RuleMethod {
    fn matches(&self, method: &Method) -> bool {
        match self {
            Self::Get => *method == Method::Get,
            Self::Post => *method == Method::Post,
            Self::Delete => *method == Method::Delete,
            Self::Websocket => *method == Method::Websocket,
            Self::Any => *method != Method::Websocket,
            Self::Event(name) => matches!(method, Method::Event(n) if n == name),
        }
    }
}

/// Scalar type a named parameter is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Pass the raw string through.
    Str,
    /// Parse as a signed integer.
    Int,
    /// Parse as a float.
    Float,
    /// Parse `true/false`, `1/0`, `yes/no`, `on/off`.
    Bool,
}

/// Declaration of one named parameter, bound from a path placeholder or a
/// query key of the same name (placeholders win on collision).
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    default: Option<Value>,
}

impl ParamSpec {
    /// A string parameter.
    #[must_use]
    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Str)
    }

    /// An integer parameter.
    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int)
    }

    /// A float parameter.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    /// A boolean parameter.
    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    /// Sets a default used when the request does not supply the parameter.
    /// Without a default, an absent parameter fails the match.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn coerce(&self, raw: &str) -> Option<Value> {
        match self.kind {
            ParamKind::Str => Some(Value::String(raw.to_string())),
            ParamKind::Int => raw.parse::<i64>().ok().map(Value::from),
            ParamKind::Float => raw.parse::<f64>().ok().map(Value::from),
            ParamKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

/// Explicit binding descriptor for one handler argument.
///
/// This is the structural replacement for reflection over handler
/// signatures: every special role a handler argument can play is declared
/// alongside the rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    /// The whole request. The request is always available on the
    /// [`Invocation`](crate::Invocation); the tag records intent.
    Request,
    /// Raw body bytes (empty when the request carries no body).
    BodyBytes,
    /// Body parsed as JSON; an unparsable body fails the match.
    BodyJson,
    /// Body parsed as JSON, required to be an object at the top level.
    BodyObject,
    /// The duplex socket. Only satisfiable on the websocket path.
    Socket,
    /// A snapshot of the full segment path.
    Path,
    /// A snapshot of the full query map.
    Query,
    /// An ordinary named parameter with coercion and optional default.
    Param(ParamSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Bound arguments produced by a successful match.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: HashMap<String, Value>,
    body_bytes: Option<Bytes>,
    body_json: Option<Value>,
    path: Option<Vec<String>>,
    query: Option<HashMap<String, String>>,
    trailing: Vec<String>,
}

impl Args {
    /// A named parameter's coerced value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// A named parameter as a string.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// A named parameter as an integer.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    /// A named parameter as a float (integers widen).
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    /// A named parameter as a boolean.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// Raw body bytes, when the rule declared [`Bind::BodyBytes`].
    #[must_use]
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body_bytes.as_ref()
    }

    /// Parsed JSON body, when the rule declared [`Bind::BodyJson`] or
    /// [`Bind::BodyObject`].
    #[must_use]
    pub fn body_json(&self) -> Option<&Value> {
        self.body_json.as_ref()
    }

    /// Full path snapshot, when the rule declared [`Bind::Path`].
    #[must_use]
    pub fn path(&self) -> Option<&[String]> {
        self.path.as_deref()
    }

    /// Full query snapshot, when the rule declared [`Bind::Query`].
    #[must_use]
    pub fn query(&self) -> Option<&HashMap<String, String>> {
        self.query.as_ref()
    }

    /// Extra path segments captured by a trailing `{*}` wildcard.
    #[must_use]
    pub fn trailing(&self) -> &[String] {
        &self.trailing
    }
}

/// A compiled route: pattern, method, default status, and bindings.
#[derive(Debug, Clone)]
pub struct PathRule {
    segments: Vec<Segment>,
    trailing_wildcard: bool,
    method: RuleMethod,
    default_status: StatusCode,
    binds: Vec<Bind>,
}

impl PathRule {
    /// Compiles a rule for the given method and pattern.
    ///
    /// Pattern syntax: literal segments, `{name}` placeholders, and an
    /// optional trailing `{*}` accepting any number of extra segments.
    #[must_use]
    pub fn new(method: RuleMethod, pattern: &str) -> Self {
        let mut segments: Vec<Segment> = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .map_or_else(
                        || Segment::Literal(s.to_string()),
                        |name| Segment::Placeholder(name.to_string()),
                    )
            })
            .collect();

        let trailing_wildcard = matches!(
            segments.last(),
            Some(Segment::Placeholder(name)) if name == "*"
        );
        if trailing_wildcard {
            segments.pop();
        }

        Self {
            segments,
            trailing_wildcard,
            method,
            default_status: StatusCode::OK,
            binds: Vec::new(),
        }
    }

    /// A GET rule.
    #[must_use]
    pub fn get(pattern: &str) -> Self {
        Self::new(RuleMethod::Get, pattern)
    }

    /// A POST rule.
    #[must_use]
    pub fn post(pattern: &str) -> Self {
        Self::new(RuleMethod::Post, pattern)
    }

    /// A DELETE rule.
    #[must_use]
    pub fn delete(pattern: &str) -> Self {
        Self::new(RuleMethod::Delete, pattern)
    }

    /// A rule matching every method except websocket.
    #[must_use]
    pub fn any(pattern: &str) -> Self {
        Self::new(RuleMethod::Any, pattern)
    }

    /// A websocket rule; pair with [`Bind::Socket`].
    #[must_use]
    pub fn websocket(pattern: &str) -> Self {
        Self::new(RuleMethod::Websocket, pattern).bind(Bind::Socket)
    }

    /// A lifecycle event rule for the named event.
    #[must_use]
    pub fn on_event(name: &str) -> Self {
        Self::new(RuleMethod::Event(name.to_string()), name)
    }

    /// Sets the status wrapped around plain handler return values.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.default_status = status;
        self
    }

    /// Declares a named parameter.
    #[must_use]
    pub fn param(self, spec: ParamSpec) -> Self {
        self.bind(Bind::Param(spec))
    }

    /// Declares an arbitrary binding descriptor.
    #[must_use]
    pub fn bind(mut self, bind: Bind) -> Self {
        self.binds.push(bind);
        self
    }

    /// The default status for plain return values.
    #[must_use]
    pub fn default_status(&self) -> StatusCode {
        self.default_status
    }

    /// Whether this rule can only run with a socket bound, i.e. through
    /// the websocket dispatch path.
    #[must_use]
    pub fn requires_socket(&self) -> bool {
        self.method == RuleMethod::Websocket || self.binds.contains(&Bind::Socket)
    }

    /// Attempts to match a request, returning bound arguments on success.
    ///
    /// Match failure is silent except for a debug log on coercion or body
    /// parse failures; the caller simply tries the next rule.
    ///
    /// The aborted flag is deliberately not consulted here: abort signals
    /// intent, and ordinary handlers still get their chance after an
    /// aborting middleware. Only the socket-claim path hard-stops on it.
    #[must_use]
    pub fn matches(&self, request: &Request) -> Option<Args> {
        if !self.method.matches(request.method()) {
            return None;
        }

        let path = request.path();
        if path.len() > self.segments.len() && !self.trailing_wildcard {
            return None;
        }
        if path.len() < self.segments.len() {
            // Shorter paths are fine only while the unmatched tail is all
            // placeholders; their values must then come from defaults.
            let tail_has_literal = self.segments[path.len()..]
                .iter()
                .any(|s| matches!(s, Segment::Literal(_)));
            if tail_has_literal {
                return None;
            }
        }

        // Captured placeholders override query parameters of the same name.
        let mut flat: HashMap<&str, &str> = request
            .query()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (segment, given) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != given {
                        return None;
                    }
                }
                Segment::Placeholder(name) => {
                    flat.insert(name.as_str(), given.as_str());
                }
            }
        }

        let mut args = Args::default();
        if self.trailing_wildcard && path.len() > self.segments.len() {
            args.trailing = path[self.segments.len()..].to_vec();
        }

        for bind in &self.binds {
            match bind {
                Bind::Request => {}
                Bind::Socket => {
                    // Satisfied by the websocket dispatch path, which hands
                    // the socket over outside of argument binding.
                }
                Bind::BodyBytes => {
                    args.body_bytes = Some(request.body().cloned().unwrap_or_default());
                }
                Bind::BodyJson | Bind::BodyObject => {
                    let body = request.body()?;
                    let value: Value = match serde_json::from_slice(body) {
                        Ok(v) => v,
                        Err(err) => {
                            debug!(%err, "body is not valid json; no match");
                            return None;
                        }
                    };
                    if *bind == Bind::BodyObject && !value.is_object() {
                        debug!("body json is not an object; no match");
                        return None;
                    }
                    args.body_json = Some(value);
                }
                Bind::Path => {
                    args.path = Some(path.to_vec());
                }
                Bind::Query => {
                    args.query = Some(request.query().clone());
                }
                Bind::Param(spec) => match flat.get(spec.name.as_str()).copied() {
                    Some(raw) => match spec.coerce(raw) {
                        Some(value) => {
                            args.values.insert(spec.name.clone(), value);
                        }
                        None => {
                            debug!(
                                param = %spec.name,
                                raw, "parameter coercion failed; no match"
                            );
                            return None;
                        }
                    },
                    None => match &spec.default {
                        Some(default) => {
                            args.values.insert(spec.name.clone(), default.clone());
                        }
                        None => return None,
                    },
                },
            }
        }

        Some(args)
    }

    #[cfg(test)]
    pub(crate) fn method(&self) -> &RuleMethod {
        &self.method
    }
}
