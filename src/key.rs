//! Entity identity.
//!
//! The resolver decides whether an object is *identifiable* (it gets an
//! [`EntityKey`] and its own record) or *embedded* (stored inline under its
//! parent). The decision depends only on the type name and the object's key
//! fields, so the same entity normalizes identically whichever query saw it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::field_path::write_canonical;
use crate::value::{ResponseObject, ResponseValue, Scalar};

/// Stable identifier of a record in the store, e.g. `Book:3` or `ROOT_QUERY`.
///
/// # Examples
///
/// ```
/// use normcache::EntityKey;
///
/// let key = EntityKey::new("Book:3");
/// assert_eq!(key.as_str(), "Book:3");
/// assert_eq!(key.to_string(), "Book:3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    /// Default key of the query root record.
    pub const ROOT_QUERY: &'static str = "ROOT_QUERY";
    /// Default key of the mutation root record.
    pub const ROOT_MUTATION: &'static str = "ROOT_MUTATION";

    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn root_query() -> Self {
        Self::new(Self::ROOT_QUERY)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

/// Custom rendering of a key from the type name and the ordered key-field values.
pub type KeySerializer = Arc<dyn Fn(&str, &[(&str, &Scalar)]) -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyPolicy {
    Fields(Vec<String>),
    Embedded,
}

/// Computes entity keys for response objects.
#[derive(Clone)]
pub struct KeyResolver {
    default_fields: Vec<String>,
    policies: HashMap<String, KeyPolicy>,
    serializer: Option<KeySerializer>,
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("default_fields", &self.default_fields)
            .field("policies", &self.policies)
            .field("custom_serializer", &self.serializer.is_some())
            .finish()
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl KeyResolver {
    /// Builds a resolver from the key settings of `config`.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let policies = config
            .type_policies
            .iter()
            .map(|(type_name, policy)| {
                let key = if !policy.normalized {
                    KeyPolicy::Embedded
                } else if policy.key_fields.is_empty() {
                    KeyPolicy::Fields(config.default_key_fields.clone())
                } else {
                    KeyPolicy::Fields(policy.key_fields.clone())
                };
                (type_name.clone(), key)
            })
            .collect();
        Self {
            default_fields: config.default_key_fields.clone(),
            policies,
            serializer: None,
        }
    }

    /// Replaces the default `Type:value` rendering.
    #[must_use]
    pub fn with_serializer(mut self, serializer: KeySerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Returns the key of `object` as an instance of `type_name`, or `None`
    /// when the object is embedded.
    ///
    /// Every key field must be present, non-null and scalar.
    #[must_use]
    pub fn resolve(&self, type_name: &str, object: &ResponseObject) -> Option<EntityKey> {
        let fields = match self.policies.get(type_name) {
            Some(KeyPolicy::Embedded) => return None,
            Some(KeyPolicy::Fields(fields)) => fields,
            None => &self.default_fields,
        };
        if fields.is_empty() {
            return None;
        }

        let mut values: Vec<(&str, &Scalar)> = Vec::with_capacity(fields.len());
        for field in fields {
            match object.get(field) {
                Some(ResponseValue::Scalar(s)) if !s.is_null() => values.push((field.as_str(), s)),
                _ => return None,
            }
        }

        let rendered = match &self.serializer {
            Some(serialize) => serialize(type_name, &values),
            None => default_key(type_name, &values),
        };
        Some(EntityKey(rendered))
    }
}

fn default_key(type_name: &str, values: &[(&str, &Scalar)]) -> String {
    let mut out = String::with_capacity(type_name.len() + 8);
    out.push_str(type_name);
    out.push(':');
    if let [(_, only)] = values {
        match only {
            Scalar::String(s) => out.push_str(s),
            other => write_canonical(&mut out, &other.to_json()),
        }
        return out;
    }

    // Compound keys render as a canonical object, e.g. `Edition:{"isbn":"x","year":1970}`.
    let compound = values
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.to_json()))
        .collect::<serde_json::Map<_, _>>();
    write_canonical(&mut out, &serde_json::Value::Object(compound));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypePolicy;
    use serde_json::json;

    fn obj(v: serde_json::Value) -> ResponseObject {
        match ResponseValue::from(v) {
            ResponseValue::Object(o) => o,
            _ => ResponseObject::new(),
        }
    }

    #[test]
    fn test_default_policy_uses_id() {
        let r = KeyResolver::default();
        let key = r.resolve("Book", &obj(json!({"id": 3, "title": "Fantastic Mr. Fox"})));
        assert_eq!(key, Some(EntityKey::new("Book:3")));
    }

    #[test]
    fn test_string_id_is_used_raw() {
        let r = KeyResolver::default();
        let key = r.resolve("Author", &obj(json!({"id": "dahl"})));
        assert_eq!(key.unwrap().as_str(), "Author:dahl");
    }

    #[test]
    fn test_missing_or_null_id_is_embedded() {
        let r = KeyResolver::default();
        assert!(r.resolve("Author", &obj(json!({"name": "Roald Dahl"}))).is_none());
        assert!(r.resolve("Author", &obj(json!({"id": null}))).is_none());
        assert!(r.resolve("Author", &obj(json!({"id": {"nested": 1}}))).is_none());
    }

    #[test]
    fn test_per_type_key_fields() {
        let mut config = CacheConfig::default();
        config.type_policies.insert(
            "Book".to_string(),
            TypePolicy {
                key_fields: vec!["isbn".to_string()],
                normalized: true,
            },
        );
        let r = KeyResolver::from_config(&config);
        assert!(r.resolve("Book", &obj(json!({"id": 3}))).is_none());
        assert_eq!(
            r.resolve("Book", &obj(json!({"isbn": "978-0"}))).unwrap().as_str(),
            "Book:978-0"
        );
        // Other types keep the default.
        assert!(r.resolve("Author", &obj(json!({"id": 1}))).is_some());
    }

    #[test]
    fn test_compound_key_is_canonical() {
        let mut config = CacheConfig::default();
        config.type_policies.insert(
            "Edition".to_string(),
            TypePolicy {
                key_fields: vec!["year".to_string(), "isbn".to_string()],
                normalized: true,
            },
        );
        let r = KeyResolver::from_config(&config);
        let key = r.resolve("Edition", &obj(json!({"isbn": "x", "year": 1970}))).unwrap();
        assert_eq!(key.as_str(), r#"Edition:{"isbn":"x","year":1970}"#);
    }

    #[test]
    fn test_unnormalized_type_is_always_embedded() {
        let mut config = CacheConfig::default();
        config.type_policies.insert(
            "Author".to_string(),
            TypePolicy {
                key_fields: Vec::new(),
                normalized: false,
            },
        );
        let r = KeyResolver::from_config(&config);
        assert!(r.resolve("Author", &obj(json!({"id": 1}))).is_none());
    }

    #[test]
    fn test_custom_serializer() {
        let r = KeyResolver::default().with_serializer(Arc::new(|ty: &str, values: &[(&str, &Scalar)]| {
            let id = values.first().map(|(_, v)| v.to_string()).unwrap_or_default();
            format!("{}#{id}", ty.to_lowercase())
        }));
        assert_eq!(
            r.resolve("Book", &obj(json!({"id": 3}))).unwrap().as_str(),
            "book#3"
        );
    }

    #[test]
    fn test_resolution_is_deterministic_across_shapes() {
        let r = KeyResolver::default();
        let a = r.resolve("Book", &obj(json!({"id": 3, "title": "t"})));
        let b = r.resolve("Book", &obj(json!({"id": 3, "author": {"name": "n"}})));
        assert_eq!(a, b);
    }
}
