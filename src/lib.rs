//! # normcache - a normalized query-result cache
//!
//! normcache stores GraphQL-style query results as a flat map of entity
//! records and rebuilds result trees for any selection set against it.
//!
//! ## Core Concepts
//!
//! - **Entity**: an object with a stable key (`Book:3`), stored once in its own record
//! - **Embedded object**: an object without a key, stored inline under its parent
//! - **Write**: normalizes a response and merges it field by field, so a
//!   second query never erases what a first query cached in a shared
//!   embedded object
//! - **Read**: reconstructs a result or reports every missing path
//!
//! ## Usage
//!
//! ```rust
//! use normcache::{Field, NormalizedCache, ResponseValue, SelectionSet};
//! use serde_json::json;
//!
//! let with_name = SelectionSet::new().field(
//!     Field::object("favoriteBook", "Book")
//!         .select(Field::scalar("id"))
//!         .select(Field::object("author", "Author").select(Field::scalar("name"))),
//! );
//! let with_birth = SelectionSet::new().field(
//!     Field::object("favoriteBook", "Book")
//!         .select(Field::scalar("id"))
//!         .select(Field::object("author", "Author").select(Field::scalar("dateOfBirth"))),
//! );
//!
//! let cache = NormalizedCache::new();
//! cache.write_query(&with_name, &ResponseValue::from(json!(
//!     {"favoriteBook": {"id": 3, "author": {"name": "Roald Dahl"}}}
//! )))?;
//! cache.write_query(&with_birth, &ResponseValue::from(json!(
//!     {"favoriteBook": {"id": 3, "author": {"dateOfBirth": "13th September 1916"}}}
//! )))?;
//!
//! // The second write merged into the embedded author instead of replacing it.
//! assert!(cache.read_query(&with_name)?.is_complete());
//! # Ok::<(), normcache::CacheError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Values and selections
pub mod field_path;
pub mod path;
pub mod selection;
pub mod value;

// Identity and storage
pub mod config;
pub mod error;
pub mod key;
pub mod store;

// Engines
pub mod cache;
pub mod gc;
pub mod read;
pub mod write;

// Re-export primary types at crate root for convenience
pub use cache::NormalizedCache;
pub use config::{CacheConfig, TypePolicy};
pub use error::{CacheError, CacheResult, MismatchKind, ShapeMismatchError, ValidationError};
pub use field_path::FieldPath;
pub use key::{EntityKey, KeyResolver, KeySerializer};
pub use path::{PathSegment, ResponsePath};
pub use read::{MissDescriptor, MissReason, MissingField, ReadOutcome};
pub use selection::{Field, SelectionSet};
pub use store::{EmbeddedObject, EntityRecord, Snapshot, Store, StoredValue};
pub use value::{ResponseObject, ResponseValue, Scalar};
pub use write::WriteSummary;
