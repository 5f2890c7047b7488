//! Selection sets: the already-parsed tree of fields a query requests.
//!
//! Parsing and schema validation happen elsewhere; this module only models the
//! result and offers builders for constructing it.
//!
//! # Example
//! ```
//! use normcache::{Field, SelectionSet};
//!
//! let query = SelectionSet::new().field(
//!     Field::object("favoriteBook", "Book")
//!         .select(Field::scalar("id"))
//!         .select(Field::object("author", "Author").select(Field::scalar("name"))),
//! );
//! assert!(query.validate().is_ok());
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::error::ValidationError;
use crate::field_path::FieldPath;

/// Name of the introspection field carrying an object's concrete type.
pub const TYPENAME_FIELD: &str = "__typename";

/// One selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    alias: Option<String>,
    arguments: BTreeMap<String, serde_json::Value>,
    type_name: Option<String>,
    selection_set: Option<SelectionSet>,
}

impl Field {
    /// A leaf field (scalar, enum, or list of them).
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: BTreeMap::new(),
            type_name: None,
            selection_set: None,
        }
    }

    /// An object field of the declared type, with an empty sub-selection to
    /// be filled with [`Field::select`].
    #[must_use]
    pub fn object(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            selection_set: Some(SelectionSet::new()),
            ..Self::scalar(name)
        }
    }

    /// An object field whose type is only known from `__typename` in the
    /// response (e.g. an interface or union).
    #[must_use]
    pub fn untyped_object(name: impl Into<String>) -> Self {
        Self {
            selection_set: Some(SelectionSet::new()),
            ..Self::scalar(name)
        }
    }

    /// Adds a sub-field. Turns a leaf field into an object field.
    #[must_use]
    pub fn select(mut self, field: Field) -> Self {
        self.selection_set
            .get_or_insert_with(SelectionSet::new)
            .fields
            .push(field);
        self
    }

    /// Replaces the sub-selection.
    #[must_use]
    pub fn with_selection(mut self, selection: SelectionSet) -> Self {
        self.selection_set = Some(selection);
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The key this field occupies in a response: the alias, or the name.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn arguments(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.arguments
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    #[must_use]
    pub const fn selection_set(&self) -> Option<&SelectionSet> {
        self.selection_set.as_ref()
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.selection_set.is_none()
    }

    /// The storage key for this field.
    #[must_use]
    pub fn field_path(&self) -> FieldPath {
        FieldPath::new(&self.name, &self.arguments)
    }
}

/// An ordered sequence of field selections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionSet {
    fields: Vec<Field>,
}

impl SelectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks the structural rules the engines rely on.
    ///
    /// # Errors
    /// - `EmptyFieldName`: a field has an empty name
    /// - `EmptySelection`: an object field selects nothing
    /// - `ConflictingResponseKey`: two different fields share a response key
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen: HashMap<&str, &Field> = HashMap::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            if let Some(previous) = seen.insert(field.response_key(), field) {
                // The same field selected twice is harmless; only differing ones clash.
                if previous.name != field.name || previous.arguments != field.arguments {
                    return Err(ValidationError::ConflictingResponseKey {
                        key: field.response_key().to_string(),
                    });
                }
            }
            if let Some(sub) = &field.selection_set {
                if sub.is_empty() {
                    return Err(ValidationError::EmptySelection {
                        field: field.name.clone(),
                    });
                }
                sub.validate()?;
            }
        }
        Ok(())
    }
}

impl FromIterator<Field> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
