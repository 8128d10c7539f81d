//! Service configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub pagination: PaginationConfig,
    pub traversal: TraversalConfig,
    /// Install a unique constraint on `Concept.name`.
    pub unique_concept_names: bool,
    pub http: HttpConfig,
}

/// Listing bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { default_limit: 10, max_limit: 100 }
    }
}

/// Traversal bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    pub default_depth: usize,
    pub max_depth: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self { default_depth: 3, max_depth: 10, default_limit: 100, max_limit: 1000 }
    }
}

/// HTTP server settings (used by the `http` feature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    /// Route prefix, e.g. `/api/v1`.
    pub prefix: String,
    pub enable_cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            prefix: "/api/v1".to_string(),
            enable_cors: true,
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), "loaded config");
        Self::from_toml_str(&content)
    }

    /// Reject bounds that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pagination;
        if p.max_limit == 0 || p.default_limit == 0 || p.default_limit > p.max_limit {
            return Err(Error::Config(format!(
                "pagination: need 1 <= default_limit ({}) <= max_limit ({})",
                p.default_limit, p.max_limit
            )));
        }
        let t = &self.traversal;
        if t.default_depth == 0 || t.default_depth > t.max_depth {
            return Err(Error::Config(format!(
                "traversal: need 1 <= default_depth ({}) <= max_depth ({})",
                t.default_depth, t.max_depth
            )));
        }
        if t.default_limit == 0 || t.default_limit > t.max_limit {
            return Err(Error::Config(format!(
                "traversal: need 1 <= default_limit ({}) <= max_limit ({})",
                t.default_limit, t.max_limit
            )));
        }
        if !self.http.prefix.is_empty() && !self.http.prefix.starts_with('/') {
            return Err(Error::Config(format!("http.prefix must start with '/': {}", self.http.prefix)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.pagination.default_limit, 10);
        assert_eq!(cfg.pagination.max_limit, 100);
        assert_eq!(cfg.traversal.default_depth, 3);
        assert_eq!(cfg.traversal.default_limit, 100);
        assert!(!cfg.unique_concept_names);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ServiceConfig::from_toml_str(
            r#"
            unique_concept_names = true

            [http]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert!(cfg.unique_concept_names);
        assert_eq!(cfg.http.bind, "0.0.0.0:9000");
        assert_eq!(cfg.http.prefix, "/api/v1");
        assert_eq!(cfg.pagination, PaginationConfig::default());
    }

    #[test]
    fn test_rejects_inconsistent_bounds() {
        let err = ServiceConfig::from_toml_str("[pagination]\ndefault_limit = 500").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = ServiceConfig::from_toml_str("[traversal]\ndefault_depth = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(ServiceConfig::from_toml_str("pagination = ["), Err(Error::Config(_))));
    }
}
