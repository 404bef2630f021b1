// # Repository Traits
//
// Defines the interface to the persistence collaborator.
//
// ## Purpose
//
// Record storage is owned by an external component (a relational store in
// production). The synchronizer only needs create/update/delete, lookup by id,
// a full scan, and lookup of children by foreign key.
//
// ## Implementations
//
// - `MemoryStore`: in-process tables, for tests and ephemeral deployments
// - `FileStore`: single JSON document with atomic writes
//
// ## Usage
//
// ```rust,ignore
// use arkgate_core::model::{IpAssignment, NetworkInterface};
// use arkgate_core::traits::{ChildRepository, Repository};
//
// let iface = store.create(NetworkInterface::new("lan", "em0")).await?;
// let ip = store.create(IpAssignment::new("192.168.1.10", 24).on_interface(iface.id())).await?;
// let ips: Vec<IpAssignment> = store.find_by_foreign_key(iface.id()).await?;
// ```

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    ChildEntity, Entity, FirewallRule, IpAssignment, NetworkInterface, Plan, Queue, RecordId,
    Subscriber,
};

/// CRUD access to one record kind
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Not-found semantics
///
/// Lookups report a missing record as `Ok(None)`. `update` and `delete`
/// report it as `Error::NotFound`. Any call may also fail with
/// `Error::Persistence`.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert a new record
    ///
    /// The store assigns the id (the incoming id is ignored) and stamps both
    /// timestamps. Returns the stored record.
    async fn create(&self, record: T) -> Result<T>;

    /// Replace an existing record
    ///
    /// `created_at` is preserved, `updated_at` is refreshed. Returns the
    /// stored record.
    async fn update(&self, record: T) -> Result<T>;

    /// Delete a record, returning what was removed
    async fn delete(&self, id: RecordId) -> Result<T>;

    /// Look up a record by id
    async fn find_by_id(&self, id: RecordId) -> Result<Option<T>>;

    /// All records, ordered by id
    async fn find_all(&self) -> Result<Vec<T>>;
}

/// Lookup of child records by their parent reference
#[async_trait]
pub trait ChildRepository<C: ChildEntity>: Repository<C> + Repository<C::Parent> {
    /// Children whose reference equals `parent`, in insertion (id) order
    async fn find_by_foreign_key(&self, parent: RecordId) -> Result<Vec<C>>;
}

/// Everything the gateway service needs from storage
///
/// Blanket-implemented for any type providing all six record kinds.
pub trait GatewayStore:
    ChildRepository<IpAssignment>
    + ChildRepository<Subscriber>
    + Repository<NetworkInterface>
    + Repository<IpAssignment>
    + Repository<Plan>
    + Repository<Subscriber>
    + Repository<FirewallRule>
    + Repository<Queue>
    + Send
    + Sync
    + 'static
{
}

impl<S> GatewayStore for S where
    S: ChildRepository<IpAssignment>
        + ChildRepository<Subscriber>
        + Repository<NetworkInterface>
        + Repository<IpAssignment>
        + Repository<Plan>
        + Repository<Subscriber>
        + Repository<FirewallRule>
        + Repository<Queue>
        + Send
        + Sync
        + 'static
{
}
