use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use kman_core::ManagerError;
use tracing::warn;

use crate::traits::{CachedRepo, EntityRepo, KeyValueRepo};

/// Two repositories with disjoint keys presented as one.
///
/// The primary source is consulted first everywhere. A key found in both is
/// a data-integrity problem: reads resolve it to the primary entity and log
/// a warning, and [`verify_disjoint`](Self::verify_disjoint) reports it.
pub struct MergedRepo<K, V> {
    primary: Arc<dyn EntityRepo<K, V>>,
    secondary: Arc<dyn EntityRepo<K, V>>,
}

impl<K, V> MergedRepo<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new(primary: Arc<dyn EntityRepo<K, V>>, secondary: Arc<dyn EntityRepo<K, V>>) -> Self {
        Self { primary, secondary }
    }

    /// Secondary keys the primary also holds, i.e. the ones it shadows.
    fn shadowed_keys(&self) -> Vec<K> {
        self.secondary
            .keys()
            .into_iter()
            .filter(|key| self.primary.contains(key))
            .collect()
    }

    /// Secondary keys not shadowed by the primary.
    fn secondary_only_keys(&self) -> Vec<K> {
        let (only, shadowed): (Vec<K>, Vec<K>) = self
            .secondary
            .keys()
            .into_iter()
            .partition(|key| !self.primary.contains(key));
        if !shadowed.is_empty() {
            warn!(keys = ?shadowed, "Keys present in both sources, secondary entries ignored");
        }
        only
    }

    /// Err with the overlapping keys unless the sources are disjoint.
    pub fn verify_disjoint(&self) -> Result<(), ManagerError> {
        let overlap = self.shadowed_keys();
        if overlap.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::invalid_argument(format!(
                "keys present in both sources: {:?}",
                overlap
            )))
        }
    }

    fn source_of(&self, key: &K) -> Option<&Arc<dyn EntityRepo<K, V>>> {
        if self.primary.contains(key) {
            Some(&self.primary)
        } else if self.secondary.contains(key) {
            Some(&self.secondary)
        } else {
            None
        }
    }

    fn missing(key: &K) -> ManagerError {
        ManagerError::not_found(format!("Entity '{:?}' doesn't exist", key))
    }
}

impl<K, V> KeyValueRepo<K, V> for MergedRepo<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn size(&self) -> usize {
        self.primary.size() + self.secondary_only_keys().len()
    }

    fn contains(&self, key: &K) -> bool {
        self.primary.contains(key) || self.secondary.contains(key)
    }

    fn get(&self, key: &K) -> Result<V, ManagerError> {
        match self.primary.get(key) {
            Ok(value) => Ok(value),
            Err(e) if e.is_not_found() => self.secondary.get(key),
            Err(e) => Err(e),
        }
    }

    fn values(&self) -> Vec<V> {
        let mut values = self.primary.values();
        values.extend(self.secondary.values_for(&self.secondary_only_keys()));
        values
    }

    fn values_for(&self, keys: &[K]) -> Vec<V> {
        keys.iter()
            .filter_map(|key| match self.source_of(key) {
                Some(source) => source.get(key).ok(),
                None => None,
            })
            .collect()
    }

    fn keys(&self) -> Vec<K> {
        let mut keys = self.primary.keys();
        let seen: HashSet<K> = keys.iter().cloned().collect();
        let secondary = self.secondary.keys();
        let shadowed: Vec<&K> = secondary.iter().filter(|key| seen.contains(*key)).collect();
        if !shadowed.is_empty() {
            warn!(keys = ?shadowed, "Keys present in both sources, secondary entries ignored");
        }
        keys.extend(secondary.iter().filter(|key| !seen.contains(*key)).cloned());
        keys
    }

    fn as_cached(&self) -> Option<&dyn CachedRepo<K>> {
        Some(self)
    }
}

impl<K, V> CachedRepo<K> for MergedRepo<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn evict(&self, key: &K) {
        for source in [&self.primary, &self.secondary] {
            if let Some(cached) = source.as_cached() {
                cached.evict(key);
            }
        }
    }
}

#[async_trait]
impl<K, V> EntityRepo<K, V> for MergedRepo<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn delete_entity(&self, key: &K) -> Result<(), ManagerError> {
        match self.source_of(key) {
            Some(source) => source.delete_entity(key).await,
            None => Err(Self::missing(key)),
        }
    }

    async fn unassign_relation(&self, key: &K, relation: &str) -> Result<V, ManagerError> {
        match self.source_of(key) {
            Some(source) => source.unassign_relation(key, relation).await,
            None => Err(Self::missing(key)),
        }
    }

    fn related_to(&self, relation: &str) -> Vec<V> {
        let mut related = self.primary.related_to(relation);
        related.extend(self.secondary.related_to(relation));
        related
    }
}
