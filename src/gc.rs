//! Reachability-based garbage collection.
//!
//! Mark-and-sweep over the reference graph. Roots are the root records plus
//! any explicitly retained keys. It is never run implicitly by a write: an
//! entity that looks unreachable mid-batch may still be needed by a write
//! that has not landed yet.

use std::collections::HashSet;

use crate::key::EntityKey;
use crate::store::Store;

/// Returns every key reachable from `roots`, following references through
/// embedded objects and lists. Roots absent from the store are skipped, as
/// are dangling references.
#[must_use]
pub fn reachable<'a>(store: &Store, roots: impl IntoIterator<Item = &'a EntityKey>) -> HashSet<EntityKey> {
    let mut marked: HashSet<EntityKey> = HashSet::new();
    let mut worklist: Vec<EntityKey> = roots
        .into_iter()
        .filter(|k| store.contains(k))
        .cloned()
        .collect();

    while let Some(key) = worklist.pop() {
        if !marked.insert(key.clone()) {
            continue;
        }
        let Some(record) = store.get(&key) else {
            continue;
        };
        for value in record.fields().values() {
            value.for_each_reference(&mut |target| {
                if store.contains(target) && !marked.contains(target) {
                    worklist.push(target.clone());
                }
            });
        }
    }
    marked
}

/// Deletes every record not reachable from `roots` and returns the evicted
/// keys, sorted.
pub fn collect_garbage<'a>(
    store: &mut Store,
    roots: impl IntoIterator<Item = &'a EntityKey>,
) -> Vec<EntityKey> {
    let marked = reachable(store, roots);
    let mut evicted: Vec<EntityKey> = store
        .keys()
        .filter(|k| !marked.contains(*k))
        .cloned()
        .collect();
    evicted.sort();
    store.retain(|k| marked.contains(k));
    evicted
}
