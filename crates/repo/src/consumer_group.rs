use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use kman_bootstrap::AsyncStart;
use kman_core::{ClusterAdmin, ConsumerGroupInfo, ManagerError, StorageType};
use tracing::{debug, info};

use crate::traits::{CachedRepo, EntityRepo, KeyValueRepo};

/// Consumer groups of one storage type, mirrored from the cluster.
///
/// The local copy is warmed at startup and refreshed on demand; evicting a
/// group drops it until the next [`refresh`](Self::refresh) or
/// [`reload`](Self::reload).
pub struct ClusterConsumerGroupRepo {
    name: String,
    admin: Arc<dyn ClusterAdmin>,
    storage: StorageType,
    phase: i32,
    groups: RwLock<BTreeMap<String, ConsumerGroupInfo>>,
}

impl ClusterConsumerGroupRepo {
    pub fn new(admin: Arc<dyn ClusterAdmin>, storage: StorageType) -> Self {
        Self {
            name: format!("consumer_groups_{}", storage.to_string().to_lowercase()),
            admin,
            storage,
            phase: 0,
            groups: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_phase(mut self, phase: i32) -> Self {
        self.phase = phase;
        self
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    /// Replace the local copy with the cluster's current groups; returns
    /// how many were loaded.
    pub async fn refresh(&self) -> Result<usize, ManagerError> {
        let groups: BTreeMap<String, ConsumerGroupInfo> = self
            .admin
            .list_consumer_groups()
            .await?
            .into_iter()
            .filter(|group| group.storage == self.storage)
            .map(|group| (group.name.clone(), group))
            .collect();
        let count = groups.len();
        *self.groups.write().unwrap() = groups;
        debug!(repo = %self.name, count, "Consumer groups refreshed");
        Ok(count)
    }

    /// Re-read one group from the cluster.
    pub async fn reload(&self, group: &str) -> Result<(), ManagerError> {
        match self.admin.describe_consumer_group(group).await {
            Ok(info) if info.storage == self.storage => {
                self.groups.write().unwrap().insert(info.name.clone(), info);
                Ok(())
            }
            Ok(_) => {
                self.groups.write().unwrap().remove(group);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.groups.write().unwrap().remove(group);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_owned(&self, group: &str) -> Result<(), ManagerError> {
        if self.groups.read().unwrap().contains_key(group) {
            Ok(())
        } else {
            Err(ManagerError::not_found(format!("Consumer group '{}' doesn't exist", group)))
        }
    }
}

impl KeyValueRepo<String, ConsumerGroupInfo> for ClusterConsumerGroupRepo {
    fn size(&self) -> usize {
        self.groups.read().unwrap().len()
    }

    fn contains(&self, key: &String) -> bool {
        self.groups.read().unwrap().contains_key(key)
    }

    fn get(&self, key: &String) -> Result<ConsumerGroupInfo, ManagerError> {
        self.groups
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ManagerError::not_found(format!("Consumer group '{}' doesn't exist", key)))
    }

    fn values(&self) -> Vec<ConsumerGroupInfo> {
        self.groups.read().unwrap().values().cloned().collect()
    }

    fn values_for(&self, keys: &[String]) -> Vec<ConsumerGroupInfo> {
        let groups = self.groups.read().unwrap();
        keys.iter().filter_map(|key| groups.get(key).cloned()).collect()
    }

    fn keys(&self) -> Vec<String> {
        self.groups.read().unwrap().keys().cloned().collect()
    }

    fn as_cached(&self) -> Option<&dyn CachedRepo<String>> {
        Some(self)
    }
}

impl CachedRepo<String> for ClusterConsumerGroupRepo {
    fn evict(&self, key: &String) {
        if self.groups.write().unwrap().remove(key).is_some() {
            debug!(repo = %self.name, group = %key, "Consumer group evicted");
        }
    }
}

#[async_trait]
impl EntityRepo<String, ConsumerGroupInfo> for ClusterConsumerGroupRepo {
    async fn delete_entity(&self, key: &String) -> Result<(), ManagerError> {
        self.ensure_owned(key)?;
        self.admin.delete_consumer_group(key).await?;
        self.groups.write().unwrap().remove(key);
        info!(repo = %self.name, group = %key, "Consumer group deleted");
        Ok(())
    }

    async fn unassign_relation(&self, key: &String, topic: &str) -> Result<ConsumerGroupInfo, ManagerError> {
        self.ensure_owned(key)?;
        self.admin.delete_consumer_group_offsets(key, topic).await?;

        let mut groups = self.groups.write().unwrap();
        let group = groups
            .get_mut(key)
            .ok_or_else(|| ManagerError::not_found(format!("Consumer group '{}' doesn't exist", key)))?;
        group.offsets.retain(|tp, _| tp.topic != topic);
        Ok(group.clone())
    }

    fn related_to(&self, topic: &str) -> Vec<ConsumerGroupInfo> {
        self.groups
            .read()
            .unwrap()
            .values()
            .filter(|group| group.consumes(topic))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AsyncStart for ClusterConsumerGroupRepo {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> i32 {
        self.phase
    }

    async fn start_async(&self) -> anyhow::Result<()> {
        let count = self.refresh().await?;
        info!(repo = %self.name, count, "Consumer groups loaded");
        Ok(())
    }
}
