use async_trait::async_trait;
use kman_core::ManagerError;

/// Read access to a keyed collection of entities.
pub trait KeyValueRepo<K, V>: Send + Sync {
    fn size(&self) -> usize;

    fn contains(&self, key: &K) -> bool;

    /// Not-found when the key is absent.
    fn get(&self, key: &K) -> Result<V, ManagerError>;

    fn values(&self) -> Vec<V>;

    /// Entities for the keys present, in key order; absent keys are skipped.
    fn values_for(&self, keys: &[K]) -> Vec<V>;

    fn keys(&self) -> Vec<K>;

    /// Cache invalidation capability, when the repository has one.
    fn as_cached(&self) -> Option<&dyn CachedRepo<K>> {
        None
    }
}

/// Repository holding a local copy that can be invalidated per key.
pub trait CachedRepo<K>: Send + Sync {
    fn evict(&self, key: &K);
}

/// Repository of entities that can be deleted or detached from a related
/// resource (a consumer group from a topic, say).
#[async_trait]
pub trait EntityRepo<K, V>: KeyValueRepo<K, V> {
    async fn delete_entity(&self, key: &K) -> Result<(), ManagerError>;

    /// Detach the entity from `relation`; returns the updated entity.
    async fn unassign_relation(&self, key: &K, relation: &str) -> Result<V, ManagerError>;

    /// Entities related to `relation`.
    fn related_to(&self, relation: &str) -> Vec<V>;
}
