//! Gateway configuration.

use serde::{Deserialize, Serialize};

/// Default body size cap: 16 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Shared configuration for both transport adapters.
///
/// Deserializable so it can be embedded in an application's config file:
///
/// ```toml
/// [gateway]
/// max_body_size = 1048576
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Hard cap on request body size in bytes. A declared content length
    /// above this is rejected with 413 before any body byte is read.
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: GatewayConfig = serde_json::from_str("{\"max_body_size\": 1024}").unwrap();
        assert_eq!(config.max_body_size, 1024);

        let config: GatewayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<GatewayConfig>("{\"max_body\": 1}").is_err());
    }
}
