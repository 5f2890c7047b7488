//! Response and scalar value types.
//!
//! Responses are dynamically shaped trees. They are represented as an explicit
//! tagged enum so the write and read engines can match exhaustively instead of
//! probing JSON shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A leaf value of a response.
///
/// # Examples
///
/// ```
/// use normcache::Scalar;
///
/// let s = Scalar::from("Roald Dahl");
/// assert!(s.is_string());
/// assert_eq!(s.as_str(), Some("Roald Dahl"));
/// assert!(Scalar::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    /// Converts to a JSON value. Non-finite floats become null.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(v) => serde_json::Value::String(v.clone()),
        }
    }

    /// Converts a JSON number to an `Int` when it fits, otherwise a `Float`.
    pub(crate) fn from_number(n: &serde_json::Number) -> Self {
        match n.as_i64() {
            Some(i) => Self::Int(i),
            None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// An object in a response or a reconstructed result, keyed by response key.
pub type ResponseObject = BTreeMap<String, ResponseValue>;

/// A node of a response tree.
///
/// Null is `Scalar(Scalar::Null)`; see [`ResponseValue::NULL`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    Scalar(Scalar),
    Object(ResponseObject),
    List(Vec<ResponseValue>),
}

impl ResponseValue {
    /// The null response value.
    pub const NULL: Self = Self::Scalar(Scalar::Null);

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub const fn as_object(&self) -> Option<&ResponseObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ResponseValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a human-readable kind name, used in shape diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(Scalar::Null) => "null",
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "object",
            Self::List(_) => "list",
        }
    }

    /// Converts the tree to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::Object(o) => object_to_json(o),
            Self::List(l) => serde_json::Value::Array(l.iter().map(Self::to_json).collect()),
        }
    }
}

/// Converts a response object to a JSON object.
#[must_use]
pub fn object_to_json(object: &ResponseObject) -> serde_json::Value {
    serde_json::Value::Object(
        object
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl Default for ResponseValue {
    fn default() -> Self {
        Self::NULL
    }
}

impl From<Scalar> for ResponseValue {
    fn from(v: Scalar) -> Self {
        Self::Scalar(v)
    }
}

impl From<ResponseObject> for ResponseValue {
    fn from(v: ResponseObject) -> Self {
        Self::Object(v)
    }
}

impl From<serde_json::Value> for ResponseValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::NULL,
            serde_json::Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => Self::Scalar(Scalar::from_number(&n)),
            serde_json::Value::String(s) => Self::Scalar(Scalar::String(s)),
            serde_json::Value::Array(a) => Self::List(a.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(o) => {
                Self::Object(o.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}
