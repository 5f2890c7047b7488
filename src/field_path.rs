//! Storage keys for fields.
//!
//! A field queried with different arguments occupies distinct storage slots,
//! so the key is the field name plus a canonical rendering of its arguments.
//! Canonical JSON sorts object keys at every depth and carries no whitespace,
//! which makes the key independent of argument order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name plus canonicalized arguments, e.g. `books({"limit":2})`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    /// Builds the storage key for `name` called with `arguments`.
    #[must_use]
    pub fn new(name: &str, arguments: &BTreeMap<String, serde_json::Value>) -> Self {
        if arguments.is_empty() {
            return Self(name.to_string());
        }
        let mut out = String::with_capacity(name.len() + 16);
        out.push_str(name);
        out.push('(');
        out.push('{');
        for (i, (k, v)) in arguments.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_json_string(&mut out, k);
            out.push(':');
            write_canonical(&mut out, v);
        }
        out.push('}');
        out.push(')');
        Self(out)
    }

    /// A field path with no arguments.
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Wraps an already-canonical key, e.g. one read back from a snapshot.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The field name without its argument suffix.
    #[must_use]
    pub fn field_name(&self) -> &str {
        self.0.split_once('(').map_or(self.0.as_str(), |(name, _)| name)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(v: &str) -> Self {
        Self::plain(v)
    }
}

/// Appends `value` to `out` as canonical JSON.
pub(crate) fn write_canonical(out: &mut String, value: &serde_json::Value) {
    use serde_json::Value;

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_json_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json may preserve insertion order depending on features.
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, k);
                out.push(':');
                write_canonical(out, v);
            }
            out.push('}');
        }
    }
}

fn write_json_string(out: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        // Serializing a &str cannot fail; keep a plain rendering as a fallback.
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}
