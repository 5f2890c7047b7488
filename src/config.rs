//! Cache configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult, ValidationError};
use crate::key::EntityKey;

/// Per-type identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypePolicy {
    /// Fields that make up the key. Empty means "use the global default".
    pub key_fields: Vec<String>,
    /// When false, objects of this type are always embedded.
    pub normalized: bool,
}

impl Default for TypePolicy {
    fn default() -> Self {
        Self {
            key_fields: Vec::new(),
            normalized: true,
        }
    }
}

/// Settings for a [`crate::NormalizedCache`].
///
/// # Example
/// ```
/// use normcache::CacheConfig;
///
/// let config = CacheConfig::from_json_str(
///     r#"{ "type_policies": { "Author": { "normalized": false } } }"#,
/// ).unwrap();
/// assert_eq!(config.root_query_key, "ROOT_QUERY");
/// assert!(!config.type_policies["Author"].normalized);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Record key holding top-level query fields.
    pub root_query_key: String,
    /// Record key holding top-level mutation fields.
    pub root_mutation_key: String,
    /// Key fields for types without a policy.
    pub default_key_fields: Vec<String>,
    /// Per-type overrides, keyed by type name.
    pub type_policies: BTreeMap<String, TypePolicy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_query_key: EntityKey::ROOT_QUERY.to_string(),
            root_mutation_key: EntityKey::ROOT_MUTATION.to_string(),
            default_key_fields: vec!["id".to_string()],
            type_policies: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Parses and validates a JSON configuration. Missing keys take defaults.
    pub fn from_json_str(s: &str) -> CacheResult<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| CacheError::Config {
            message: format!("parse cache config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Adds or replaces the policy for `type_name`.
    #[must_use]
    pub fn with_type_policy(mut self, type_name: impl Into<String>, policy: TypePolicy) -> Self {
        self.type_policies.insert(type_name.into(), policy);
        self
    }

    /// Validate the configuration.
    ///
    /// This must be called before constructing a cache from untrusted input.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.root_query_key.is_empty() || self.root_mutation_key.is_empty() {
            return Err(ValidationError::InvalidRootKey {
                reason: "root keys must be non-empty".to_string(),
            });
        }
        if self.root_query_key == self.root_mutation_key {
            return Err(ValidationError::InvalidRootKey {
                reason: format!("query and mutation roots share key '{}'", self.root_query_key),
            });
        }
        if self.default_key_fields.iter().any(String::is_empty) {
            return Err(ValidationError::EmptyKeyField {
                type_name: "*".to_string(),
            });
        }
        for (type_name, policy) in &self.type_policies {
            if policy.key_fields.iter().any(String::is_empty) {
                return Err(ValidationError::EmptyKeyField {
                    type_name: type_name.clone(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn root_query(&self) -> EntityKey {
        EntityKey::new(self.root_query_key.clone())
    }

    #[must_use]
    pub fn root_mutation(&self) -> EntityKey {
        EntityKey::new(self.root_mutation_key.clone())
    }
}
