//! Normalized entity storage.
//!
//! The store is passive state: a map from [`EntityKey`] to [`EntityRecord`].
//! References between records are keys, never pointers, so cyclic entity
//! graphs need no shared ownership. Reclamation is explicit
//! (see [`crate::gc`]).
//!
//! Key invariants:
//! - Exactly one record per key.
//! - A `Reference` may dangle after a targeted eviction; readers detect it.
//! - Writes are staged in a [`StoreTxn`] and applied only on success.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CacheError, CacheResult};
use crate::field_path::FieldPath;
use crate::key::EntityKey;
use crate::value::Scalar;

/// JSON tag marking a reference in snapshots.
pub const REF_TAG: &str = "$ref";

/// Inline object without a stable identity.
pub type EmbeddedObject = BTreeMap<FieldPath, StoredValue>;

/// A value held under a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Scalar(Scalar),
    /// Non-owning pointer to another record.
    Reference(EntityKey),
    EmbeddedObject(EmbeddedObject),
    List(Vec<StoredValue>),
}

impl StoredValue {
    /// An authoritative null.
    pub const NULL: Self = Self::Scalar(Scalar::Null);

    pub const fn as_reference(&self) -> Option<&EntityKey> {
        match self {
            Self::Reference(k) => Some(k),
            _ => None,
        }
    }

    pub const fn as_embedded(&self) -> Option<&EmbeddedObject> {
        match self {
            Self::EmbeddedObject(o) => Some(o),
            _ => None,
        }
    }

    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a human-readable kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(Scalar::Null) => "null",
            Self::Scalar(_) => "scalar",
            Self::Reference(_) => "reference",
            Self::EmbeddedObject(_) => "embedded object",
            Self::List(_) => "list",
        }
    }

    /// Calls `f` on every reference reachable inside this value.
    pub fn for_each_reference<'a>(&'a self, f: &mut impl FnMut(&'a EntityKey)) {
        match self {
            Self::Scalar(_) => {}
            Self::Reference(k) => f(k),
            Self::EmbeddedObject(fields) => {
                for v in fields.values() {
                    v.for_each_reference(f);
                }
            }
            Self::List(items) => {
                for v in items {
                    v.for_each_reference(f);
                }
            }
        }
    }

    /// Encodes the value as JSON. References become `{"$ref": key}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::Reference(k) => {
                let mut m = serde_json::Map::new();
                m.insert(REF_TAG.to_string(), serde_json::Value::String(k.to_string()));
                serde_json::Value::Object(m)
            }
            Self::EmbeddedObject(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Decodes a value produced by [`StoredValue::to_json`].
    ///
    /// Field names cannot start with `$`, so an object whose only key is
    /// `$ref` is unambiguously a reference.
    pub fn from_json(value: &serde_json::Value) -> CacheResult<Self> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => Self::NULL,
            Value::Bool(b) => Self::Scalar(Scalar::Bool(*b)),
            Value::Number(n) => Self::Scalar(Scalar::from_number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s.clone())),
            Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect::<CacheResult<_>>()?)
            }
            Value::Object(map) => {
                if let Some(tag) = map.get(REF_TAG) {
                    let Value::String(key) = tag else {
                        return Err(CacheError::snapshot(format!(
                            "{REF_TAG} must be a string, found {tag}"
                        )));
                    };
                    if map.len() != 1 {
                        return Err(CacheError::snapshot(format!(
                            "{REF_TAG} object for '{key}' carries extra fields"
                        )));
                    }
                    return Ok(Self::Reference(EntityKey::new(key.clone())));
                }
                Self::EmbeddedObject(
                    map.iter()
                        .map(|(k, v)| Ok((FieldPath::from_raw(k.clone()), Self::from_json(v)?)))
                        .collect::<CacheResult<_>>()?,
                )
            }
        })
    }
}

impl From<Scalar> for StoredValue {
    fn from(v: Scalar) -> Self {
        Self::Scalar(v)
    }
}

impl Serialize for StoredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StoredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&json).map_err(serde::de::Error::custom)
    }
}

/// All stored fields of one entity (or a root).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    fields: BTreeMap<FieldPath, StoredValue>,
}

impl EntityRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&StoredValue> {
        self.fields.get(path)
    }

    /// Stores `value`, returning the previous one.
    pub fn set(&mut self, path: FieldPath, value: StoredValue) -> Option<StoredValue> {
        self.fields.insert(path, value)
    }

    pub fn remove(&mut self, path: &FieldPath) -> Option<StoredValue> {
        self.fields.remove(path)
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<FieldPath, StoredValue> {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(FieldPath, StoredValue)> for EntityRecord {
    fn from_iter<T: IntoIterator<Item = (FieldPath, StoredValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Serializable deep copy of a store: key -> field path -> JSON value.
pub type Snapshot = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Map from entity key to record, including the root records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Store {
    records: HashMap<EntityKey, EntityRecord>,
}

impl Store {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&EntityRecord> {
        self.records.get(key)
    }

    #[must_use]
    pub fn get_mut(&mut self, key: &EntityKey) -> Option<&mut EntityRecord> {
        self.records.get_mut(key)
    }

    pub fn set(&mut self, key: EntityKey, record: EntityRecord) -> Option<EntityRecord> {
        self.records.insert(key, record)
    }

    pub fn delete(&mut self, key: &EntityKey) -> Option<EntityRecord> {
        self.records.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.records.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &EntityRecord)> {
        self.records.iter()
    }

    /// Removes every record. Idempotent.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Keeps only the records for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&EntityKey) -> bool) {
        self.records.retain(|k, _| keep(k));
    }

    /// Starts a write transaction reading through to this store.
    #[must_use]
    pub fn begin(&self) -> StoreTxn<'_> {
        StoreTxn {
            base: self,
            staged: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Applies records staged by a committed transaction.
    pub fn apply(&mut self, staged: StagedWrites) {
        for (key, record) in staged.records {
            self.records.insert(key, record);
        }
    }

    /// Deep copy of every record in snapshot layout.
    #[must_use]
    pub fn extract(&self) -> Snapshot {
        self.records
            .iter()
            .map(|(key, record)| {
                let fields = record
                    .fields
                    .iter()
                    .map(|(path, value)| (path.to_string(), value.to_json()))
                    .collect();
                (key.to_string(), fields)
            })
            .collect()
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> CacheResult<Self> {
        let mut records = HashMap::with_capacity(snapshot.len());
        for (key, fields) in snapshot {
            let record = fields
                .iter()
                .map(|(path, value)| {
                    let decoded = StoredValue::from_json(value).map_err(|e| {
                        CacheError::snapshot(format!("{key}.{path}: {e}"))
                    })?;
                    Ok((FieldPath::from_raw(path.clone()), decoded))
                })
                .collect::<CacheResult<EntityRecord>>()?;
            records.insert(EntityKey::new(key.clone()), record);
        }
        Ok(Self { records })
    }
}

/// Records produced by a successful transaction, ready for [`Store::apply`].
#[derive(Debug, Default)]
pub struct StagedWrites {
    records: Vec<(EntityKey, EntityRecord)>,
}

impl StagedWrites {
    /// Keys written, in first-touch order.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.records.iter().map(|(k, _)| k)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Copy-on-write overlay over a [`Store`].
///
/// Reads see staged records first, then the base. Nothing reaches the base
/// store until the staged writes are applied, so dropping a transaction
/// discards it.
#[derive(Debug)]
pub struct StoreTxn<'a> {
    base: &'a Store,
    staged: HashMap<EntityKey, EntityRecord>,
    order: Vec<EntityKey>,
}

impl StoreTxn<'_> {
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&EntityRecord> {
        self.staged.get(key).or_else(|| self.base.get(key))
    }

    /// Looks up one field of a record through the overlay.
    #[must_use]
    pub fn field(&self, key: &EntityKey, path: &FieldPath) -> Option<&StoredValue> {
        self.get(key).and_then(|r| r.get(path))
    }

    /// Mutable access to a record, copying it from the base (or creating it)
    /// on first touch.
    pub fn record_mut(&mut self, key: &EntityKey) -> &mut EntityRecord {
        if !self.staged.contains_key(key) {
            let initial = self.base.get(key).cloned().unwrap_or_default();
            self.staged.insert(key.clone(), initial);
            self.order.push(key.clone());
        }
        // Inserted above when absent.
        self.staged.entry(key.clone()).or_default()
    }

    /// Finishes the transaction, yielding records for [`Store::apply`].
    #[must_use]
    pub fn commit(mut self) -> StagedWrites {
        let records = self
            .order
            .into_iter()
            .filter_map(|k| self.staged.remove(&k).map(|r| (k, r)))
            .collect();
        StagedWrites { records }
    }
}
