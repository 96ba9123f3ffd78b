//! Basic-auth gate middleware.
//!
//! The gate is an ordinary router with one catch-all rule, so it sees
//! every request ahead of application handlers. It aborts each request
//! immediately, claiming authority to answer definitively: absent or bad
//! credentials become a 401 with a challenge header (which dominates the
//! merge by status), while valid credentials attach the principal to the
//! request and return an empty, propagating response so real handlers
//! still run.
//!
//! Credentials are a static principal-to-PHC-hash table fixed at
//! construction time; verification goes through argon2, which is
//! constant-time by construction.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::StatusCode;
use manifold_core::{Request, Response};
use manifold_router::{PathRule, Reply, Router};
use serde::Deserialize;
use tracing::debug;

/// Errors from credential handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Password hashing failed.
    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// Hashes a plaintext password into a PHC string for the credential table.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Declarative auth configuration, embeddable in an application config
/// file.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Realm announced in the challenge header.
    pub realm: String,
    /// Principal to PHC-hash pairs.
    pub users: HashMap<String, String>,
}

/// The authentication gate.
#[derive(Debug, Clone)]
pub struct AuthGate {
    realm: String,
    credentials: HashMap<String, String>,
}

impl AuthGate {
    /// Creates a gate with an empty credential table (rejects everyone).
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            credentials: HashMap::new(),
        }
    }

    /// Creates a gate from configuration.
    #[must_use]
    pub fn from_config(config: AuthConfig) -> Self {
        Self {
            realm: config.realm,
            credentials: config.users,
        }
    }

    /// Adds one principal with its PHC password hash.
    #[must_use]
    pub fn credential(mut self, principal: impl Into<String>, phc_hash: impl Into<String>) -> Self {
        self.credentials.insert(principal.into(), phc_hash.into());
        self
    }

    /// Builds the middleware router.
    #[must_use]
    pub fn into_router(self) -> Router {
        let gate = Arc::new(self);
        let mut router = Router::new();
        router.route_fn(PathRule::any("/{*}"), move |inv| {
            let gate = Arc::clone(&gate);
            async move {
                inv.request.abort();
                match gate.authenticate(&inv.request) {
                    Some(principal) => {
                        inv.request.set_principal(principal);
                        Ok(Reply::None)
                    }
                    None => Ok(Reply::from(gate.challenge())),
                }
            }
        });
        router
    }

    fn challenge(&self) -> Response {
        Response::with_status(StatusCode::UNAUTHORIZED).header(
            "www-authenticate",
            format!("Basic realm=\"{}\"", self.realm),
        )
    }

    fn authenticate(&self, request: &Request) -> Option<String> {
        let header = request.header("authorization")?;
        let encoded = header.strip_prefix("Basic ").or_else(|| {
            header.strip_prefix("basic ")
        })?;
        let decoded = BASE64.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;

        let stored = self.credentials.get(user)?;
        let parsed = match PasswordHash::new(stored) {
            Ok(hash) => hash,
            Err(err) => {
                debug!(user, %err, "unparsable credential hash");
                return None;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()?;
        Some(user.to_string())
    }
}
