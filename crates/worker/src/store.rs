//! Persistence seam for groups.
//!
//! The draw workflow only needs to load a group and save it back once the
//! draw has been applied, guarded by the status it was loaded with.
//! Production storage lives behind [`GroupStore`]; [`InMemoryGroupStore`]
//! backs the CLI and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use xbuddy_core::types::GroupId;
use xbuddy_core::{Group, GroupStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn load(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    /// Save `group` only if the stored copy still has status `expected`.
    ///
    /// Returns `false`, without writing, when the stored status differs or
    /// the group is gone. The check and the write must be atomic.
    async fn save_if_status(
        &self,
        group: &Group,
        expected: GroupStatus,
    ) -> Result<bool, StoreError>;
}

/// Process-local group storage.
#[derive(Default)]
pub struct InMemoryGroupStore {
    groups: RwLock<HashMap<GroupId, Group>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a group.
    pub async fn insert(&self, group: Group) {
        self.groups.write().await.insert(group.id, group);
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn load(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.read().await.get(&id).cloned())
    }

    async fn save_if_status(
        &self,
        group: &Group,
        expected: GroupStatus,
    ) -> Result<bool, StoreError> {
        let mut groups = self.groups.write().await;
        match groups.get_mut(&group.id) {
            Some(stored) if stored.status == expected => {
                *stored = group.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
