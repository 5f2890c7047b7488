//! The cache facade.
//!
//! [`NormalizedCache`] owns one [`Store`] behind a lock together with the key
//! resolver built from its configuration. Every write, eviction, GC pass and
//! reset holds the write guard for its whole duration, so readers never see a
//! partially merged entity. Callers only receive copies or keys.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::field_path::FieldPath;
use crate::gc;
use crate::key::{EntityKey, KeyResolver, KeySerializer};
use crate::read::{self, ReadOutcome};
use crate::selection::SelectionSet;
use crate::store::{Snapshot, Store};
use crate::value::{ResponseObject, ResponseValue};
use crate::write::{self, WriteSummary};

fn lock_err(context: &'static str) -> CacheError {
    CacheError::LockPoisoned { context }
}

#[derive(Debug, Default)]
struct CacheState {
    store: Store,
    retained: HashMap<EntityKey, usize>,
}

/// Thread-safe normalized cache.
///
/// # Example
/// ```
/// use normcache::{Field, NormalizedCache, ResponseValue, SelectionSet};
/// use serde_json::json;
///
/// let cache = NormalizedCache::new();
/// let query = SelectionSet::new().field(
///     Field::object("favoriteBook", "Book")
///         .select(Field::scalar("id"))
///         .select(Field::scalar("title")),
/// );
/// cache
///     .write_query(&query, &ResponseValue::from(json!({"favoriteBook": {"id": 3, "title": "Matilda"}})))
///     .unwrap();
/// assert!(cache.read_query(&query).unwrap().is_complete());
/// ```
#[derive(Debug)]
pub struct NormalizedCache {
    config: CacheConfig,
    resolver: KeyResolver,
    state: RwLock<CacheState>,
}

impl Default for NormalizedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizedCache {
    /// Create an empty cache with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        let config = CacheConfig::default();
        Self {
            resolver: KeyResolver::from_config(&config),
            config,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Create an empty cache from a validated configuration.
    pub fn with_config(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            resolver: KeyResolver::from_config(&config),
            config,
            state: RwLock::new(CacheState::default()),
        })
    }

    /// Replaces the default `Type:value` key rendering.
    #[must_use]
    pub fn with_key_serializer(mut self, serializer: KeySerializer) -> Self {
        self.resolver = self.resolver.with_serializer(serializer);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the key `object` would be stored under as a `type_name`.
    #[must_use]
    pub fn identify(&self, type_name: &str, object: &ResponseObject) -> Option<EntityKey> {
        self.resolver.resolve(type_name, object)
    }

    /// Writes a query result under the query root.
    pub fn write_query(
        &self,
        selection: &SelectionSet,
        response: &ResponseValue,
    ) -> CacheResult<WriteSummary> {
        self.write(selection, response, &self.config.root_query())
    }

    /// Writes a mutation result under the mutation root.
    pub fn write_mutation(
        &self,
        selection: &SelectionSet,
        response: &ResponseValue,
    ) -> CacheResult<WriteSummary> {
        self.write(selection, response, &self.config.root_mutation())
    }

    /// Writes `response` starting at `root`. All-or-nothing.
    ///
    /// # Errors
    /// - `ShapeMismatch`: the response does not fit `selection`; nothing was written
    /// - `LockPoisoned`: a previous holder of the lock panicked
    pub fn write(
        &self,
        selection: &SelectionSet,
        response: &ResponseValue,
        root: &EntityKey,
    ) -> CacheResult<WriteSummary> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.write"))?;
        match write::write(&mut state.store, &self.resolver, selection, response, root) {
            Ok(summary) => {
                debug!(root = %root, touched = summary.touched.len(), "wrote response into cache");
                Ok(summary)
            }
            Err(e) => {
                warn!(root = %root, path = %e.path, error = %e.kind, "rejected cache write");
                Err(e.into())
            }
        }
    }

    /// Reads `selection` from the query root.
    pub fn read_query(&self, selection: &SelectionSet) -> CacheResult<ReadOutcome> {
        self.read(selection, &self.config.root_query())
    }

    /// Reads `selection` starting at `root`.
    ///
    /// A miss is a normal outcome, not an error; the only error is a poisoned lock.
    pub fn read(&self, selection: &SelectionSet, root: &EntityKey) -> CacheResult<ReadOutcome> {
        let state = self.state.read().map_err(|_| lock_err("cache.read"))?;
        let outcome = read::read(&state.store, selection, root);
        match &outcome {
            ReadOutcome::Complete(_) => trace!(root = %root, "cache read complete"),
            ReadOutcome::Miss(miss) => trace!(root = %root, missing = miss.len(), "cache read missed"),
        }
        Ok(outcome)
    }

    /// Evicts every record unreachable from the roots or a retained key.
    pub fn collect_garbage(&self) -> CacheResult<Vec<EntityKey>> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.collect_garbage"))?;
        let CacheState { store, retained } = &mut *state;
        let roots = [self.config.root_query(), self.config.root_mutation()];
        let evicted = gc::collect_garbage(store, roots.iter().chain(retained.keys()));
        debug!(evicted = evicted.len(), remaining = store.len(), "collected cache garbage");
        Ok(evicted)
    }

    /// Pins `key` as a GC root. Returns the new retain count.
    pub fn retain(&self, key: &EntityKey) -> CacheResult<usize> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.retain"))?;
        let count = state.retained.entry(key.clone()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    /// Undoes one [`NormalizedCache::retain`]. Returns the remaining count.
    pub fn release(&self, key: &EntityKey) -> CacheResult<usize> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.release"))?;
        let remaining = match state.retained.get(key).copied() {
            Some(count) if count > 1 => {
                state.retained.insert(key.clone(), count - 1);
                count - 1
            }
            Some(_) => {
                state.retained.remove(key);
                0
            }
            None => 0,
        };
        Ok(remaining)
    }

    /// Removes one record. References to it are left dangling and surface
    /// as misses on read.
    pub fn evict(&self, key: &EntityKey) -> CacheResult<bool> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.evict"))?;
        let removed = state.store.delete(key).is_some();
        if removed {
            debug!(key = %key, "evicted cache record");
        }
        Ok(removed)
    }

    /// Removes one field from a record.
    pub fn evict_field(&self, key: &EntityKey, field: &FieldPath) -> CacheResult<bool> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.evict_field"))?;
        let removed = state
            .store
            .get_mut(key)
            .and_then(|record| record.remove(field))
            .is_some();
        if removed {
            debug!(key = %key, field = %field, "evicted cache field");
        }
        Ok(removed)
    }

    /// Clears every record, root and retain count. Idempotent.
    pub fn reset(&self) -> CacheResult<()> {
        let mut state = self.state.write().map_err(|_| lock_err("cache.reset"))?;
        state.store.clear();
        state.retained.clear();
        debug!("reset cache");
        Ok(())
    }

    /// Deep copy of the whole store.
    pub fn extract(&self) -> CacheResult<Snapshot> {
        let state = self.state.read().map_err(|_| lock_err("cache.extract"))?;
        Ok(state.store.extract())
    }

    /// Replaces the store with a decoded snapshot. On error the cache is unchanged.
    pub fn restore(&self, snapshot: &Snapshot) -> CacheResult<()> {
        let store = Store::from_snapshot(snapshot)?;
        let mut state = self.state.write().map_err(|_| lock_err("cache.restore"))?;
        debug!(records = store.len(), "restored cache from snapshot");
        state.store = store;
        Ok(())
    }

    /// Number of records, roots included.
    pub fn len(&self) -> CacheResult<usize> {
        let state = self.state.read().map_err(|_| lock_err("cache.len"))?;
        Ok(state.store.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, key: &EntityKey) -> CacheResult<bool> {
        let state = self.state.read().map_err(|_| lock_err("cache.contains"))?;
        Ok(state.store.contains(key))
    }
}
