//! Cross-cutting middleware components for Manifold.
//!
//! Both components here are ordinary [`Router`](manifold_router::Router)s
//! built around a catch-all trailing-wildcard rule, mounted with
//! [`add_middleware`](manifold_router::Router::add_middleware) so they see
//! every request before application handlers do. Each either
//! short-circuits (a definitive 401 or 404 that dominates the merge) or
//! passes through with an empty response.

#![doc(html_root_url = "https://docs.rs/manifold-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod auth;
mod static_files;

pub use auth::{hash_password, AuthConfig, AuthError, AuthGate};
pub use static_files::{StaticFileError, StaticFiles, StaticFilesConfig};
