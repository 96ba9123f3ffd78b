//! Static file responder middleware.
//!
//! Serves files from a root directory under a URL prefix, as an ordinary
//! router mounted via `add_middleware`. Path traversal is prevented by a
//! per-segment character allow-list rather than canonicalization, so the
//! responder never consults the filesystem for a path it would refuse.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use manifold_core::{Request, Response};
use manifold_router::{PathRule, Reply, Router};
use serde::Deserialize;
use tracing::{debug, warn};

/// Errors from static file configuration.
#[derive(Debug, thiserror::Error)]
pub enum StaticFileError {
    /// The configured root does not exist or is not a directory.
    #[error("static root {0} is not a directory")]
    InvalidRoot(PathBuf),
}

/// Declarative static file configuration, embeddable in an application
/// config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticFilesConfig {
    /// Directory to serve from.
    pub root: PathBuf,
    /// URL prefix the responder answers under.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Sub-prefixes under `prefix` that are never served (so dynamic
    /// routes mounted there are not shadowed).
    #[serde(default)]
    pub exclude: Vec<String>,
    /// File served when the remaining path is empty.
    #[serde(default)]
    pub index_file: Option<String>,
    /// When present, only these extensions are served.
    #[serde(default)]
    pub allow_extensions: Option<Vec<String>>,
    /// Extensions that are never served.
    #[serde(default)]
    pub deny_extensions: Vec<String>,
    /// Whether a miss is answered with this responder's own 404 instead
    /// of propagating to later handlers.
    #[serde(default = "default_authoritative")]
    pub authoritative: bool,
    /// Extension to MIME type overrides, consulted before the built-in
    /// table.
    #[serde(default)]
    pub mime_types: HashMap<String, String>,
}

fn default_prefix() -> String {
    "/".to_string()
}

fn default_authoritative() -> bool {
    true
}

/// The static file responder.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    prefix: String,
    exclude: Vec<Vec<String>>,
    index_file: Option<String>,
    allow_extensions: Option<HashSet<String>>,
    deny_extensions: HashSet<String>,
    authoritative: bool,
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Creates a responder serving `root` under `prefix`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            exclude: Vec::new(),
            index_file: None,
            allow_extensions: None,
            deny_extensions: HashSet::new(),
            authoritative: true,
            mime_types: HashMap::new(),
        }
    }

    /// Creates a responder from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StaticFileError::InvalidRoot`] when the configured root
    /// is not an existing directory.
    pub fn from_config(config: StaticFilesConfig) -> Result<Self, StaticFileError> {
        if !config.root.is_dir() {
            return Err(StaticFileError::InvalidRoot(config.root));
        }
        let mut files = Self::new(config.root, config.prefix);
        for prefix in config.exclude {
            files = files.exclude(prefix);
        }
        files.index_file = config.index_file;
        files.allow_extensions = config
            .allow_extensions
            .map(|exts| exts.into_iter().map(|e| e.to_ascii_lowercase()).collect());
        files.deny_extensions = config
            .deny_extensions
            .into_iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        files.authoritative = config.authoritative;
        files.mime_types = config.mime_types;
        Ok(files)
    }

    /// Excludes a sub-prefix under the serving prefix.
    #[must_use]
    pub fn exclude(mut self, sub_prefix: impl AsRef<str>) -> Self {
        self.exclude.push(split_segments(sub_prefix.as_ref()));
        self
    }

    /// Serves `name` when the remaining path is empty.
    #[must_use]
    pub fn index_file(mut self, name: impl Into<String>) -> Self {
        self.index_file = Some(name.into());
        self
    }

    /// Restricts serving to the given extension.
    #[must_use]
    pub fn allow_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.allow_extensions
            .get_or_insert_with(HashSet::new)
            .insert(ext.as_ref().to_ascii_lowercase());
        self
    }

    /// Refuses to serve the given extension.
    #[must_use]
    pub fn deny_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.deny_extensions.insert(ext.as_ref().to_ascii_lowercase());
        self
    }

    /// Chooses between answering misses with a 404 (`true`) and
    /// propagating them to later handlers (`false`).
    #[must_use]
    pub fn authoritative(mut self, authoritative: bool) -> Self {
        self.authoritative = authoritative;
        self
    }

    /// Adds an extension to MIME type override.
    #[must_use]
    pub fn mime_type(mut self, ext: impl Into<String>, mime: impl Into<String>) -> Self {
        self.mime_types.insert(ext.into(), mime.into());
        self
    }

    /// Builds the middleware router.
    #[must_use]
    pub fn into_router(self) -> Router {
        let pattern = if self.prefix.trim_matches('/').is_empty() {
            "/{*}".to_string()
        } else {
            format!("/{}/{{*}}", self.prefix.trim_matches('/'))
        };
        let files = Arc::new(self);
        let mut router = Router::new();
        router.route_fn(PathRule::get(&pattern), move |inv| {
            let files = Arc::clone(&files);
            async move { Ok(files.respond(&inv.request, inv.args.trailing()).await) }
        });
        router
    }

    async fn respond(&self, request: &Request, trailing: &[String]) -> Reply {
        if self.is_excluded(trailing) {
            return Reply::None;
        }
        let Some(relative) = self.resolve(trailing) else {
            return self.miss(request);
        };
        let path = self.root.join(&relative);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let mime = self.detect_mime_type(&path);
                Reply::Bytes(Bytes::from(data), mime.to_string())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "static file not found");
                self.miss(request)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "static file read failed");
                self.miss(request)
            }
        }
    }

    /// An authoritative miss claims the request: the abort flag marks the
    /// 404 as this responder's definitive answer, like the auth gate's
    /// claim on its 401.
    fn miss(&self, request: &Request) -> Reply {
        if self.authoritative {
            request.abort();
            Reply::Response(Response::with_status(StatusCode::NOT_FOUND))
        } else {
            Reply::None
        }
    }

    fn is_excluded(&self, trailing: &[String]) -> bool {
        self.exclude.iter().any(|prefix| {
            trailing.len() >= prefix.len() && trailing[..prefix.len()] == prefix[..]
        })
    }

    /// Maps the remaining path segments onto a relative file path, or
    /// `None` when the request cannot name a servable file.
    fn resolve(&self, trailing: &[String]) -> Option<PathBuf> {
        let file_name;
        let segments = if trailing.is_empty() {
            file_name = self.index_file.clone()?;
            std::slice::from_ref(&file_name)
        } else {
            trailing
        };
        if !segments.iter().all(|s| is_safe_segment(s)) {
            debug!(?segments, "rejected unsafe path segment");
            return None;
        }
        let relative: PathBuf = segments.iter().collect();
        let ext = relative
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if let Some(allowed) = &self.allow_extensions {
            if !allowed.contains(&ext) {
                return None;
            }
        }
        if self.deny_extensions.contains(&ext) {
            return None;
        }
        Some(relative)
    }

    fn detect_mime_type(&self, path: &Path) -> &str {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if let Some(mime) = self.mime_types.get(&ext) {
            return mime;
        }
        match ext.as_str() {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "xml" => "application/xml",
            "txt" => "text/plain; charset=utf-8",
            "csv" => "text/csv; charset=utf-8",
            "md" => "text/markdown; charset=utf-8",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "avif" => "image/avif",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "otf" => "font/otf",
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "gz" => "application/gzip",
            "tar" => "application/x-tar",
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" => "audio/ogg",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "wasm" => "application/wasm",
            "manifest" | "webmanifest" => "application/manifest+json",
            _ => "application/octet-stream",
        }
    }
}

/// Allowed characters inside one path segment. Everything outside the
/// allow-list (notably `/`, `\` and leading-dot names via `.`-only
/// segments) cannot reach the filesystem.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-+=.,:".contains(c))
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_safe_segments() {
        assert!(is_safe_segment("index.html"));
        assert!(is_safe_segment("data_2024-01,v=1:2.csv"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("."));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a\\b"));
        assert!(!is_safe_segment("a b"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let files = StaticFiles::new("/srv/www", "/static");
        assert!(files.resolve(&seg(&["..", "etc", "passwd"])).is_none());
        assert_eq!(
            files.resolve(&seg(&["css", "site.css"])),
            Some(PathBuf::from("css/site.css"))
        );
    }

    #[test]
    fn test_resolve_index_file() {
        let files = StaticFiles::new("/srv/www", "/").index_file("index.html");
        assert_eq!(files.resolve(&[]), Some(PathBuf::from("index.html")));
        assert!(StaticFiles::new("/srv/www", "/").resolve(&[]).is_none());
    }

    #[test]
    fn test_extension_lists() {
        let files = StaticFiles::new("/srv/www", "/")
            .allow_extension("html")
            .allow_extension("css");
        assert!(files.resolve(&seg(&["a.html"])).is_some());
        assert!(files.resolve(&seg(&["a.js"])).is_none());

        let files = StaticFiles::new("/srv/www", "/").deny_extension("phc");
        assert!(files.resolve(&seg(&["a.html"])).is_some());
        assert!(files.resolve(&seg(&["creds.PHC"])).is_none());
    }

    #[test]
    fn test_exclusion_prefix() {
        let files = StaticFiles::new("/srv/www", "/").exclude("api");
        assert!(files.is_excluded(&seg(&["api", "channels"])));
        assert!(files.is_excluded(&seg(&["api"])));
        assert!(!files.is_excluded(&seg(&["apidocs", "x"])));
    }

    #[test]
    fn test_mime_table_and_overrides() {
        let files = StaticFiles::new("/srv/www", "/").mime_type("dat", "application/x-scan");
        assert_eq!(files.detect_mime_type(Path::new("a/b.HTML")), "text/html; charset=utf-8");
        assert_eq!(files.detect_mime_type(Path::new("scan.dat")), "application/x-scan");
        assert_eq!(files.detect_mime_type(Path::new("blob")), "application/octet-stream");
    }
}
