// # Memory Store
//
// In-memory implementation of the repository traits.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for deployments where the records are pushed
// again by the API layer after every start.
//
// ## Crash Behavior
//
// - All records are lost on restart
// - Generated hostname.if files stay on disk until the next reconcile

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::tables::{TableEntity, Tables};
use crate::error::Result;
use crate::model::{ChildEntity, RecordId};
use crate::traits::{ChildRepository, Repository};

/// In-memory record store
///
/// Cloning is cheap and every clone shares the same tables.
///
/// # Example
///
/// ```rust,no_run
/// use arkgate_core::model::{IpAssignment, NetworkInterface};
/// use arkgate_core::store::MemoryStore;
/// use arkgate_core::traits::{ChildRepository, Repository};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let iface = store.create(NetworkInterface::new("lan", "em0")).await?;
///     store
///         .create(IpAssignment::new("192.168.1.10", 24).on_interface(iface.meta.id))
///         .await?;
///
///     let ips: Vec<IpAssignment> = store.find_by_foreign_key(iface.meta.id).await?;
///     assert_eq!(ips.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of every table
    pub async fn snapshot(&self) -> Tables {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl<T: TableEntity> Repository<T> for MemoryStore {
    async fn create(&self, record: T) -> Result<T> {
        Ok(self.inner.write().await.insert(record))
    }

    async fn update(&self, record: T) -> Result<T> {
        self.inner.write().await.replace(record)
    }

    async fn delete(&self, id: RecordId) -> Result<T> {
        self.inner.write().await.remove(id)
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<T>> {
        Ok(self.inner.read().await.get(id))
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        Ok(self.inner.read().await.all())
    }
}

#[async_trait]
impl<C> ChildRepository<C> for MemoryStore
where
    C: ChildEntity + TableEntity,
    C::Parent: TableEntity,
{
    async fn find_by_foreign_key(&self, parent: RecordId) -> Result<Vec<C>> {
        Ok(self.inner.read().await.children(parent))
    }
}
