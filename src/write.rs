//! Write path: normalize a response into the store.
//!
//! The selection set and the response are walked together. Identifiable
//! objects go to their own records and are replaced by references. Embedded
//! objects are merged field by field into whatever embedded object already
//! sits at the same field path. Fields the new write does not select survive.
//!
//! Key invariants:
//! - Scalars and nulls overwrite.
//! - Embedded objects merge; they are never replaced wholesale by another
//!   embedded object.
//! - Lists are replaced as a whole.
//! - Identity is judged by field name, so aliases never change an entity's key.
//! - Entity records carry their `__typename`.
//! - A rejected write leaves the store untouched.

use crate::error::{MismatchKind, ShapeMismatchError};
use crate::field_path::FieldPath;
use crate::key::{EntityKey, KeyResolver};
use crate::path::ResponsePath;
use crate::selection::{Field, SelectionSet, TYPENAME_FIELD};
use crate::store::{EmbeddedObject, Store, StoreTxn, StoredValue};
use crate::value::{ResponseObject, ResponseValue, Scalar};

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Record the top-level fields were written into.
    pub root: EntityKey,
    /// Every record created or modified, in first-touch order.
    pub touched: Vec<EntityKey>,
}

/// Writes `response` for `selection` into `store`, starting at `root`.
///
/// `root` is normally the query root, but any entity key works, which allows
/// fragment-style writes into a single entity.
///
/// # Errors
/// Returns [`ShapeMismatchError`] when the response does not match the
/// selection. In that case nothing is written.
pub fn write(
    store: &mut Store,
    resolver: &KeyResolver,
    selection: &SelectionSet,
    response: &ResponseValue,
    root: &EntityKey,
) -> Result<WriteSummary, ShapeMismatchError> {
    let ResponseValue::Object(data) = response else {
        return Err(ShapeMismatchError::new(
            ResponsePath::root(),
            MismatchKind::RootNotObject {
                found: response.kind(),
            },
        ));
    };

    let staged = {
        let mut writer = Writer {
            resolver,
            txn: store.begin(),
        };
        writer.write_record(root, None, selection, data, &ResponsePath::root())?;
        writer.txn.commit()
    };

    let touched = staged.keys().cloned().collect();
    store.apply(staged);
    Ok(WriteSummary {
        root: root.clone(),
        touched,
    })
}

/// The concrete type of an object: `__typename` when present, otherwise the
/// type the selection declares.
fn object_type<'a>(view: &'a ResponseObject, field: &'a Field) -> Option<&'a str> {
    match view.get(TYPENAME_FIELD) {
        Some(ResponseValue::Scalar(Scalar::String(t))) => Some(t.as_str()),
        _ => field.type_name(),
    }
}

/// Scalar entries of `object` keyed by field name, for identity lookups.
///
/// Selected fields are read under their response key, so an aliased `id` or
/// `__typename` still identifies the object. Unselected response entries fill
/// in the rest unless an alias of another field claims their key.
fn identity_view(selection: &SelectionSet, object: &ResponseObject) -> ResponseObject {
    let mut view = ResponseObject::new();
    for field in selection.fields() {
        if let Some(value @ ResponseValue::Scalar(_)) = object.get(field.response_key()) {
            view.entry(field.name().to_string())
                .or_insert_with(|| value.clone());
        }
    }
    for (key, value) in object {
        if !matches!(value, ResponseValue::Scalar(_)) || view.contains_key(key) {
            continue;
        }
        if selection.fields().iter().any(|f| f.response_key() == key) {
            continue;
        }
        view.insert(key.clone(), value.clone());
    }
    view
}

/// Deep-merges `incoming` over `existing`. Two embedded objects merge field
/// by field; any other pair is replaced by `incoming`.
fn merge(existing: Option<StoredValue>, incoming: StoredValue) -> StoredValue {
    match (existing, incoming) {
        (Some(StoredValue::EmbeddedObject(mut base)), StoredValue::EmbeddedObject(fields)) => {
            for (path, value) in fields {
                let merged = merge(base.remove(&path), value);
                base.insert(path, merged);
            }
            StoredValue::EmbeddedObject(base)
        }
        (_, incoming) => incoming,
    }
}

struct Writer<'a> {
    resolver: &'a KeyResolver,
    txn: StoreTxn<'a>,
}

impl Writer<'_> {
    fn write_record(
        &mut self,
        key: &EntityKey,
        type_name: Option<&str>,
        selection: &SelectionSet,
        data: &ResponseObject,
        path: &ResponsePath,
    ) -> Result<(), ShapeMismatchError> {
        let record = self.txn.record_mut(key);
        if let Some(type_name) = type_name {
            record.set(
                FieldPath::plain(TYPENAME_FIELD),
                StoredValue::Scalar(Scalar::from(type_name)),
            );
        }

        for field in selection.fields() {
            let at = path.key(field.response_key());
            let value = response_field(data, field, &at)?;
            let stored = self.normalize(field, value, &at)?;

            // The walk below may have re-entered this record.
            let record = self.txn.record_mut(key);
            let field_path = field.field_path();
            let merged = merge(record.remove(&field_path), stored);
            record.set(field_path, merged);
        }
        Ok(())
    }

    fn normalize(
        &mut self,
        field: &Field,
        value: &ResponseValue,
        at: &ResponsePath,
    ) -> Result<StoredValue, ShapeMismatchError> {
        match (field.selection_set(), value) {
            (_, ResponseValue::Scalar(Scalar::Null)) => Ok(StoredValue::NULL),
            (None, ResponseValue::Scalar(s)) => Ok(StoredValue::Scalar(s.clone())),
            (None, ResponseValue::Object(_)) => Err(ShapeMismatchError::new(
                at.clone(),
                MismatchKind::ExpectedLeaf { found: "object" },
            )),
            (Some(_), ResponseValue::Scalar(s)) => Err(ShapeMismatchError::new(
                at.clone(),
                MismatchKind::ExpectedObject {
                    found: s.type_name(),
                },
            )),
            (_, ResponseValue::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.normalize(field, item, &at.index(i))?);
                }
                Ok(StoredValue::List(out))
            }
            (Some(selection), ResponseValue::Object(object)) => {
                self.normalize_object(field, selection, object, at)
            }
        }
    }

    fn normalize_object(
        &mut self,
        field: &Field,
        selection: &SelectionSet,
        object: &ResponseObject,
        at: &ResponsePath,
    ) -> Result<StoredValue, ShapeMismatchError> {
        let view = identity_view(selection, object);
        let identity = object_type(&view, field)
            .and_then(|t| Some((self.resolver.resolve(t, &view)?, t.to_string())));
        if let Some((key, type_name)) = identity {
            self.write_record(&key, Some(&type_name), selection, object, at)?;
            return Ok(StoredValue::Reference(key));
        }

        // Built fresh; the caller merges it over what is already stored.
        let mut fresh = EmbeddedObject::new();
        for child in selection.fields() {
            let child_at = at.key(child.response_key());
            let value = response_field(object, child, &child_at)?;
            let stored = self.normalize(child, value, &child_at)?;
            let field_path = child.field_path();
            let merged = merge(fresh.remove(&field_path), stored);
            fresh.insert(field_path, merged);
        }
        Ok(StoredValue::EmbeddedObject(fresh))
    }
}

fn response_field<'r>(
    data: &'r ResponseObject,
    field: &Field,
    at: &ResponsePath,
) -> Result<&'r ResponseValue, ShapeMismatchError> {
    data.get(field.response_key())
        .ok_or_else(|| ShapeMismatchError::new(at.clone(), MismatchKind::MissingField))
}
