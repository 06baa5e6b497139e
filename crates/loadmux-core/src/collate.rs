//! Collation of unordered fetch results against requested keys.
//!
//! A bulk fetch returns entities in whatever order the source produced
//! them. These kernels align that batch to the keys a dispatch asked for,
//! which is what makes `load_many` output order match input order no
//! matter how the source answered.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{LoadError, LoadResult};

/// Aligns an unordered batch of entities to the requested keys.
///
/// Builds `key_of(entity) -> entity` over the batch and returns one slot
/// per requested key, in request order, `None` where the batch had no
/// matching entity. Two entities mapping to the same key is a
/// [`LoadError::KeyCollision`]: an entity's key is expected to identify at
/// most one entity, so a collision means data would be silently dropped.
pub fn match_by_key<K, E, F>(keys: &[K], entities: &[E], key_of: F) -> LoadResult<Vec<Option<E>>>
where
    K: Eq + Hash + Debug,
    E: Clone,
    F: Fn(&E) -> K,
{
    use std::collections::hash_map::Entry;

    let mut by_key: HashMap<K, &E> = HashMap::with_capacity(entities.len());
    for entity in entities {
        match by_key.entry(key_of(entity)) {
            Entry::Occupied(slot) => {
                return Err(LoadError::KeyCollision {
                    key: format!("{:?}", slot.key()),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(entity);
            }
        }
    }

    Ok(keys
        .iter()
        .map(|key| by_key.get(key).map(|entity| (*entity).clone()))
        .collect())
}

/// Groups an unordered batch of entities by key and sorts each group.
///
/// Returns one group per requested key, in request order, empty where the
/// batch had no members for that key. `cmp` must be a total order over the
/// entities; for output that is identical across fetches it must not tie
/// distinct entities within a group (compare on a component that is unique
/// per entity, such as a primary id).
pub fn group_by_key<K, E, F, C>(keys: &[K], entities: &[E], key_of: F, cmp: C) -> Vec<Vec<E>>
where
    K: Eq + Hash,
    E: Clone,
    F: Fn(&E) -> K,
    C: Fn(&E, &E) -> Ordering,
{
    let mut groups: HashMap<K, Vec<E>> = HashMap::new();
    for entity in entities {
        groups.entry(key_of(entity)).or_default().push(entity.clone());
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| cmp(a, b));
    }

    keys.iter()
        .map(|key| groups.get(key).cloned().unwrap_or_default())
        .collect()
}
