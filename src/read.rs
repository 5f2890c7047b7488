//! Read path: reconstruct a result tree from the store.
//!
//! The walk mirrors the write path. Top-level fields come from the root
//! record, nested fields from the referenced record or the embedded map.
//! Traversal continues past every miss, so a [`MissDescriptor`] names all
//! unresolved paths, not just the first.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field_path::FieldPath;
use crate::key::EntityKey;
use crate::path::ResponsePath;
use crate::selection::{Field, SelectionSet, TYPENAME_FIELD};
use crate::store::{Store, StoredValue};
use crate::value::{ResponseObject, ResponseValue, Scalar};

/// Why a requested path could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MissReason {
    /// The field was never written at this location.
    FieldAbsent,
    /// The root record of the read does not exist.
    RecordAbsent {
        key: EntityKey,
    },
    /// A reference points at a key that is no longer in the store.
    DanglingReference {
        key: EntityKey,
    },
    /// The stored value does not have the shape the selection asks for.
    ShapeMismatch {
        expected: String,
        found: String,
    },
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldAbsent => write!(f, "field absent"),
            Self::RecordAbsent { key } => write!(f, "record '{key}' absent"),
            Self::DanglingReference { key } => write!(f, "dangling reference to '{key}'"),
            Self::ShapeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
        }
    }
}

/// One unresolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub path: ResponsePath,
    pub reason: MissReason,
}

/// Structured non-result of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct MissDescriptor {
    /// Every unresolved path, in selection order.
    pub missing: Vec<MissingField>,
    /// The part of the result that did resolve. Unresolved fields are
    /// omitted; unresolved list elements are null.
    pub partial: ResponseObject,
}

impl MissDescriptor {
    /// The unresolved paths.
    pub fn paths(&self) -> impl Iterator<Item = &ResponsePath> {
        self.missing.iter().map(|m| &m.path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.missing.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// True when nothing at all could be resolved.
    #[must_use]
    pub fn is_total(&self) -> bool {
        self.partial.is_empty()
    }

    /// Keys of references that pointed at missing records.
    pub fn dangling_references(&self) -> impl Iterator<Item = &EntityKey> {
        self.missing.iter().filter_map(|m| match &m.reason {
            MissReason::DanglingReference { key } => Some(key),
            _ => None,
        })
    }
}

impl fmt::Display for MissDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} missing:", self.missing.len())?;
        for m in &self.missing {
            write!(f, " {} ({});", m.path, m.reason)?;
        }
        Ok(())
    }
}

/// Result of [`read`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// Every selected field resolved.
    Complete(ResponseObject),
    /// At least one selected field is missing.
    Miss(MissDescriptor),
}

impl ReadOutcome {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// The complete result, if any.
    #[must_use]
    pub fn into_data(self) -> Option<ResponseObject> {
        match self {
            Self::Complete(data) => Some(data),
            Self::Miss(_) => None,
        }
    }

    #[must_use]
    pub const fn as_miss(&self) -> Option<&MissDescriptor> {
        match self {
            Self::Miss(m) => Some(m),
            Self::Complete(_) => None,
        }
    }
}

/// Reads `selection` starting at the record `root`. Never mutates the store.
#[must_use]
pub fn read(store: &Store, selection: &SelectionSet, root: &EntityKey) -> ReadOutcome {
    let Some(record) = store.get(root) else {
        return ReadOutcome::Miss(MissDescriptor {
            missing: vec![MissingField {
                path: ResponsePath::root(),
                reason: MissReason::RecordAbsent { key: root.clone() },
            }],
            partial: ResponseObject::new(),
        });
    };

    let mut reader = Reader {
        store,
        missing: Vec::new(),
    };
    let data = reader.read_fields(record.fields(), selection, &ResponsePath::root(), None);
    if reader.missing.is_empty() {
        ReadOutcome::Complete(data)
    } else {
        ReadOutcome::Miss(MissDescriptor {
            missing: reader.missing,
            partial: data,
        })
    }
}

struct Reader<'s> {
    store: &'s Store,
    missing: Vec<MissingField>,
}

impl Reader<'_> {
    fn miss(&mut self, path: ResponsePath, reason: MissReason) {
        self.missing.push(MissingField { path, reason });
    }

    fn read_fields(
        &mut self,
        fields: &BTreeMap<FieldPath, StoredValue>,
        selection: &SelectionSet,
        path: &ResponsePath,
        type_hint: Option<&str>,
    ) -> ResponseObject {
        let mut out = ResponseObject::new();
        for field in selection.fields() {
            let at = path.key(field.response_key());
            match fields.get(&field.field_path()) {
                Some(stored) => {
                    if let Some(value) = self.read_value(field, stored, &at) {
                        out.insert(field.response_key().to_string(), value);
                    }
                }
                None => match type_hint {
                    Some(ty) if field.name() == TYPENAME_FIELD => {
                        out.insert(
                            field.response_key().to_string(),
                            ResponseValue::Scalar(Scalar::from(ty)),
                        );
                    }
                    _ => self.miss(at, MissReason::FieldAbsent),
                },
            }
        }
        out
    }

    fn read_value(
        &mut self,
        field: &Field,
        stored: &StoredValue,
        at: &ResponsePath,
    ) -> Option<ResponseValue> {
        match (field.selection_set(), stored) {
            (_, StoredValue::Scalar(Scalar::Null)) => Some(ResponseValue::NULL),
            (None, StoredValue::Scalar(s)) => Some(ResponseValue::Scalar(s.clone())),
            (_, StoredValue::List(items)) => {
                let values = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.read_value(field, item, &at.index(i))
                            .unwrap_or(ResponseValue::NULL)
                    })
                    .collect();
                Some(ResponseValue::List(values))
            }
            (Some(selection), StoredValue::Reference(key)) => {
                let store = self.store;
                let Some(record) = store.get(key) else {
                    self.miss(
                        at.clone(),
                        MissReason::DanglingReference { key: key.clone() },
                    );
                    return None;
                };
                // Entity records store their `__typename`; the declared type
                // only covers records written directly under an entity key.
                Some(ResponseValue::Object(self.read_fields(
                    record.fields(),
                    selection,
                    at,
                    field.type_name(),
                )))
            }
            (Some(selection), StoredValue::EmbeddedObject(fields)) => Some(ResponseValue::Object(
                self.read_fields(fields, selection, at, field.type_name()),
            )),
            (Some(_), StoredValue::Scalar(_)) => {
                self.mismatch(at, "object", stored);
                None
            }
            (None, StoredValue::Reference(_) | StoredValue::EmbeddedObject(_)) => {
                self.mismatch(at, "leaf", stored);
                None
            }
        }
    }

    fn mismatch(&mut self, at: &ResponsePath, expected: &str, stored: &StoredValue) {
        self.miss(
            at.clone(),
            MissReason::ShapeMismatch {
                expected: expected.to_string(),
                found: stored.kind().to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyResolver;
    use crate::write::write;
    use serde_json::json;
    use std::sync::Arc;

    fn book_query(author_fields: &[&str]) -> SelectionSet {
        let author = author_fields
            .iter()
            .fold(Field::object("author", "Author"), |f, name| f.select(Field::scalar(*name)));
        SelectionSet::new().field(
            Field::object("favoriteBook", "Book")
                .select(Field::scalar("id"))
                .select(author),
        )
    }

    fn seeded(selection: &SelectionSet, data: serde_json::Value) -> Store {
        let mut store = Store::new();
        write(
            &mut store,
            &KeyResolver::default(),
            selection,
            &ResponseValue::from(data),
            &EntityKey::root_query(),
        )
        .unwrap();
        store
    }

    #[test]
    fn test_complete_read_matches_written_data() {
        let q = book_query(&["name"]);
        let data = json!({"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}});
        let store = seeded(&q, data.clone());
        let out = read(&store, &q, &EntityKey::root_query()).into_data().unwrap();
        assert_eq!(ResponseValue::Object(out).to_json(), data);
    }

    #[test]
    fn test_empty_store_is_total_miss() {
        let outcome = read(&Store::new(), &book_query(&["name"]), &EntityKey::root_query());
        let miss = outcome.as_miss().unwrap();
        assert!(miss.is_total());
        assert_eq!(
            miss.missing[0].reason,
            MissReason::RecordAbsent {
                key: EntityKey::root_query()
            }
        );
    }

    #[test]
    fn test_every_missing_leaf_is_reported() {
        let store = seeded(
            &book_query(&["name"]),
            json!({"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}}),
        );
        let q = book_query(&["name", "dateOfBirth", "nationality"]);
        let outcome = read(&store, &q, &EntityKey::root_query());
        let miss = outcome.as_miss().unwrap();
        let paths: Vec<String> = miss.paths().map(ToString::to_string).collect();
        assert_eq!(
            paths,
            vec![
                "favoriteBook.author.dateOfBirth".to_string(),
                "favoriteBook.author.nationality".to_string(),
            ]
        );
        assert!(!miss.is_total());
        assert_eq!(
            miss.partial["favoriteBook"].as_object().unwrap()["id"],
            ResponseValue::Scalar(Scalar::Int(3))
        );
    }

    #[test]
    fn test_dangling_reference_is_a_miss() {
        let q = book_query(&["name"]);
        let mut store = seeded(
            &q,
            json!({"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}}),
        );
        store.delete(&EntityKey::new("Book:3"));
        let outcome = read(&store, &q, &EntityKey::root_query());
        let miss = outcome.as_miss().unwrap();
        assert_eq!(miss.len(), 1);
        assert_eq!(
            miss.dangling_references().collect::<Vec<_>>(),
            vec![&EntityKey::new("Book:3")]
        );
        assert_eq!(miss.missing[0].path.to_string(), "favoriteBook");
    }

    #[test]
    fn test_null_satisfies_object_selection() {
        let q = book_query(&["name"]);
        let store = seeded(&q, json!({"favoriteBook": {"id": 3, "author": null}}));
        let out = read(&store, &q, &EntityKey::root_query()).into_data().unwrap();
        assert!(out["favoriteBook"].as_object().unwrap()["author"].is_null());
    }

    #[test]
    fn test_list_element_miss_uses_index_path() {
        let writer_q = SelectionSet::new()
            .field(Field::object("books", "Book").select(Field::scalar("id")).select(Field::scalar("title")));
        let mut store = seeded(
            &writer_q,
            json!({"books": [{"id": 1, "title": "Matilda"}, {"id": 2, "title": "The BFG"}]}),
        );
        store.delete(&EntityKey::new("Book:2"));
        let outcome = read(&store, &writer_q, &EntityKey::root_query());
        let miss = outcome.as_miss().unwrap();
        assert_eq!(miss.missing[0].path.to_string(), "books[1]");
        let books = miss.partial["books"].as_list().unwrap();
        assert_eq!(books.len(), 2);
        assert!(books[1].is_null());
    }

    #[test]
    fn test_shape_mismatch_is_reported_not_panicked() {
        let store = seeded(
            &SelectionSet::new().field(Field::scalar("favoriteBook")),
            json!({"favoriteBook": "just a string"}),
        );
        let outcome = read(&store, &book_query(&["name"]), &EntityKey::root_query());
        let miss = outcome.as_miss().unwrap();
        assert!(matches!(miss.missing[0].reason, MissReason::ShapeMismatch { .. }));
    }

    #[test]
    fn test_typename_comes_from_record_then_declared_type() {
        let q = book_query(&["name"]);
        let store = seeded(
            &q,
            json!({"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}}),
        );
        let with_typename = SelectionSet::new().field(
            Field::object("favoriteBook", "Book")
                .select(Field::scalar("__typename"))
                .select(Field::object("author", "Author").select(Field::scalar("__typename"))),
        );
        let out = read(&store, &with_typename, &EntityKey::root_query())
            .into_data()
            .unwrap();
        assert_eq!(
            ResponseValue::Object(out).to_json(),
            json!({"favoriteBook": {"__typename": "Book", "author": {"__typename": "Author"}}})
        );
    }

    #[test]
    fn test_alias_shapes_result() {
        let q = book_query(&["name"]);
        let store = seeded(
            &q,
            json!({"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}}),
        );
        let aliased = SelectionSet::new().field(
            Field::object("favoriteBook", "Book")
                .alias("book")
                .select(Field::scalar("id").alias("bookId")),
        );
        let out = read(&store, &aliased, &EntityKey::root_query()).into_data().unwrap();
        assert_eq!(ResponseValue::Object(out).to_json(), json!({"book": {"bookId": 3}}));
    }

    #[test]
    fn test_read_does_not_mutate() {
        let q = book_query(&["name"]);
        let store = seeded(
            &q,
            json!({"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}}),
        );
        let before = store.clone();
        let _ = read(&store, &book_query(&["missing"]), &EntityKey::root_query());
        assert_eq!(store, before);
    }

    #[test]
    fn test_miss_display_lists_paths() {
        let outcome = read(&Store::new(), &book_query(&["name"]), &EntityKey::root_query());
        let text = outcome.as_miss().unwrap().to_string();
        assert!(text.contains("record 'ROOT_QUERY' absent"));
    }

    #[test]
    fn test_typename_ignores_custom_key_layout() {
        let resolver = KeyResolver::default().with_serializer(Arc::new(
            |ty: &str, values: &[(&str, &Scalar)]| {
                let id = values.first().map(|(_, v)| v.to_string()).unwrap_or_default();
                format!("{id}:{}", ty.to_lowercase())
            },
        ));
        let q = SelectionSet::new().field(
            Field::object("favoriteBook", "Book").select(Field::scalar("id")),
        );
        let mut store = Store::new();
        write(
            &mut store,
            &resolver,
            &q,
            &ResponseValue::from(json!({"favoriteBook": {"id": 3}})),
            &EntityKey::root_query(),
        )
        .unwrap();
        assert!(store.contains(&EntityKey::new("3:book")));

        let with_typename = SelectionSet::new().field(
            Field::object("favoriteBook", "Book").select(Field::scalar("__typename")),
        );
        let out = read(&store, &with_typename, &EntityKey::root_query())
            .into_data()
            .unwrap();
        assert_eq!(
            ResponseValue::Object(out).to_json(),
            json!({"favoriteBook": {"__typename": "Book"}})
        );
    }

    #[test]
    fn test_root_typename_is_not_parsed_from_key() {
        let root = EntityKey::new("ROOT:Q");
        let q = SelectionSet::new().field(Field::scalar("motd"));
        let mut store = Store::new();
        write(
            &mut store,
            &KeyResolver::default(),
            &q,
            &ResponseValue::from(json!({"motd": "hello"})),
            &root,
        )
        .unwrap();
        let outcome = read(
            &store,
            &SelectionSet::new().field(Field::scalar("__typename")),
            &root,
        );
        let miss = outcome.as_miss().unwrap();
        assert_eq!(miss.missing[0].reason, MissReason::FieldAbsent);
        assert!(miss.partial.is_empty());
    }

    #[test]
    fn test_absent_object_field_is_one_miss_at_its_path() {
        let store = seeded(
            &SelectionSet::new().field(
                Field::object("favoriteBook", "Book").select(Field::scalar("id")),
            ),
            json!({"favoriteBook": {"id": 3}}),
        );
        let outcome = read(&store, &book_query(&["name", "dateOfBirth"]), &EntityKey::root_query());
        let miss = outcome.as_miss().unwrap();
        let paths: Vec<String> = miss.paths().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["favoriteBook.author".to_string()]);
        assert_eq!(miss.missing[0].reason, MissReason::FieldAbsent);
    }
}
