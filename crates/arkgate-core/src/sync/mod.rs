//! Association synchronizer
//!
//! Keeps a child record (IP assignment, subscriber) and the parent it
//! references (interface, plan) consistent.
//!
//! ## Model
//!
//! The child's foreign key is the only stored link. A parent's collection is
//! derived on read through [`ChildRepository::find_by_foreign_key`], so there
//! is no second copy that can drift. "Persisting the parent" means refreshing
//! its record (bumping `updated_at`) and running the parent hook, which for
//! interfaces regenerates the hostname.if file.
//!
//! ## Link Flow
//!
//! ```text
//! link_child(child)
//!   ├─ parent_ref == 0 ─────► persist child ──► Ok
//!   └─ lock(parent_ref)
//!        ├─ resolve fails ──► clear ref, persist child ──► Err(ParentNotFound)
//!        └─ resolve ok ─────► persist child ──► re-read + refresh parent
//!                                           ──► hook ──► Ok
//! ```
//!
//! The child write always happens before the parent write. Work on one
//! parent is serialized; different parents proceed in parallel. Writers of
//! the parent record itself take the same lock through
//! [`AssociationSynchronizer::lock_parent`] or
//! [`AssociationSynchronizer::delete_parent`].

pub(crate) mod locks;

use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{ChildEntity, Entity, RecordId, UNLINKED};
use crate::traits::{ChildRepository, ParentHook, Repository};
use locks::KeyedLocks;

/// A committed change plus the non-fatal problems that followed it
///
/// The record was stored, but the follow-up steps listed in `warnings` did
/// not complete. Most are recoverable (`ParentNotFound`, `ConfigWrite`,
/// channel errors). A failed parent refresh or child lookup after the commit
/// can also add `Persistence` or `NotFound`, so check
/// [`Error::is_recoverable`] per warning rather than assuming it.
#[derive(Debug)]
pub struct Applied<T> {
    pub record: T,
    pub warnings: Vec<Error>,
}

impl<T> Applied<T> {
    pub fn clean(record: T) -> Self {
        Self {
            record,
            warnings: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// The record, or the first warning as an error
    pub fn into_result(self) -> Result<T> {
        match self.warnings.into_iter().next() {
            Some(warning) => Err(warning),
            None => Ok(self.record),
        }
    }
}

/// Links child records to their parents and repairs dangling references
pub struct AssociationSynchronizer<S, C: ChildEntity> {
    store: Arc<S>,
    hook: Option<Arc<dyn ParentHook<C::Parent>>>,
    locks: KeyedLocks<RecordId>,
    _child: PhantomData<fn() -> C>,
}

impl<S, C> AssociationSynchronizer<S, C>
where
    S: ChildRepository<C> + 'static,
    C: ChildEntity,
{
    /// Create a synchronizer without a parent hook
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            hook: None,
            locks: KeyedLocks::new(),
            _child: PhantomData,
        }
    }

    /// Run `hook` whenever a parent's children change
    pub fn with_hook(mut self, hook: Arc<dyn ParentHook<C::Parent>>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Persist `child` and link it to the parent it references
    ///
    /// A child with id 0 is created, otherwise updated.
    ///
    /// # Returns
    ///
    /// - `Ok(child)`: persisted (and linked, if it referenced a parent)
    /// - `Err(Error::ParentNotFound)`: the parent did not resolve; the child
    ///   was persisted with its reference cleared
    /// - `Err(Error::ConfigWrite)`: the hook failed after the link was stored
    /// - any other error: nothing was linked
    pub async fn link_child(&self, child: C) -> Result<C> {
        self.link(child).await?.into_result()
    }

    /// Like [`link_child`](Self::link_child), but returns the stored child
    /// together with the non-fatal errors
    ///
    /// `Err` is reserved for failures where the child was not stored.
    pub async fn link(&self, mut child: C) -> Result<Applied<C>> {
        let previous_ref = self.previous_parent_ref(&child).await?;
        let parent_ref = child.parent_ref();

        let mut applied = if parent_ref == UNLINKED {
            debug!("{} {} has no parent, persisting unlinked", C::KIND, child.id());
            Applied::clean(self.persist_child(child).await?)
        } else {
            let _guard = self.locks.lock(parent_ref).await;

            match self.resolve_parent(parent_ref).await {
                Ok(_) => {
                    let child = self.persist_child(child).await?;
                    info!(
                        "Linked {} {} to {} {}",
                        C::KIND,
                        child.id(),
                        <C::Parent as Entity>::KIND,
                        parent_ref
                    );
                    let mut applied = Applied::clean(child);
                    if let Err(e) = self.refresh_and_hook(parent_ref).await {
                        applied.warnings.push(e);
                    }
                    applied
                }
                Err(reason) => {
                    child.set_parent_ref(UNLINKED);
                    let child = self.persist_child(child).await?;
                    warn!(
                        "{} {} referenced missing {} {} ({}); reference cleared",
                        C::KIND,
                        child.id(),
                        <C::Parent as Entity>::KIND,
                        parent_ref,
                        reason
                    );
                    let not_found = Error::ParentNotFound {
                        parent: <C::Parent as Entity>::KIND,
                        parent_id: parent_ref,
                        child: C::KIND,
                        child_id: child.id(),
                        reason,
                    };
                    Applied {
                        record: child,
                        warnings: vec![not_found],
                    }
                }
            }
        };

        if previous_ref != UNLINKED && previous_ref != parent_ref {
            if let Err(e) = self.refresh_by_id(previous_ref).await {
                warn!(
                    "Failed to refresh previous {} {}: {}",
                    <C::Parent as Entity>::KIND,
                    previous_ref,
                    e
                );
                applied.warnings.push(e);
            }
        }

        Ok(applied)
    }

    /// Delete a child and refresh the parent it belonged to
    pub async fn remove_child(&self, id: RecordId) -> Result<Applied<C>> {
        let removed = Repository::<C>::delete(&*self.store, id).await?;
        debug!("Removed {} {}", C::KIND, id);

        let mut applied = Applied::clean(removed);
        if applied.record.is_linked() {
            if let Err(e) = self.refresh_by_id(applied.record.parent_ref()).await {
                applied.warnings.push(e);
            }
        }
        Ok(applied)
    }

    /// Unlink every child of a parent that is being deleted
    ///
    /// Children are never deleted. Returns the ids that were unlinked.
    pub async fn detach_children(&self, parent_id: RecordId) -> Result<Vec<RecordId>> {
        let _guard = self.locks.lock(parent_id).await;
        self.detach_locked(parent_id).await
    }

    /// Delete a parent, unlink its children and run the removal hook
    ///
    /// All three steps run under the parent lock, so no link can slip in
    /// between. Only the delete itself is fatal; detach and hook failures are
    /// returned as warnings. Returns the removed parent and the unlinked
    /// child ids.
    pub async fn delete_parent(
        &self,
        parent_id: RecordId,
    ) -> Result<(Applied<C::Parent>, Vec<RecordId>)> {
        let _guard = self.locks.lock(parent_id).await;
        let removed = Repository::<C::Parent>::delete(&*self.store, parent_id).await?;

        let mut applied = Applied::clean(removed);
        let detached = match self.detach_locked(parent_id).await {
            Ok(detached) => detached,
            Err(e) => {
                warn!(
                    "Failed to detach {}(s) of {} {}: {}",
                    C::KIND,
                    <C::Parent as Entity>::KIND,
                    parent_id,
                    e
                );
                applied.warnings.push(e);
                Vec::new()
            }
        };
        if let Err(e) = self.removal_hook(&applied.record).await {
            applied.warnings.push(e);
        }
        Ok((applied, detached))
    }

    /// Exclusive access to one parent
    ///
    /// Links, unlinks and hooks for `parent_id` wait until the guard is
    /// dropped. Do not call back into this synchronizer for the same parent
    /// while holding it.
    pub async fn lock_parent(&self, parent_id: RecordId) -> OwnedMutexGuard<()> {
        self.locks.lock(parent_id).await
    }

    /// Unlink every child whose reference no longer resolves
    ///
    /// Returns the ids of the repaired children.
    pub async fn repair(&self) -> Result<Vec<RecordId>> {
        let children = Repository::<C>::find_all(&*self.store).await?;
        let mut repaired = Vec::new();

        for mut child in children.into_iter().filter(|c| c.is_linked()) {
            let parent_ref = child.parent_ref();
            let _guard = self.locks.lock(parent_ref).await;
            if let Err(reason) = self.resolve_parent(parent_ref).await {
                warn!(
                    "Repairing {} {}: {} {} unresolved ({})",
                    C::KIND,
                    child.id(),
                    <C::Parent as Entity>::KIND,
                    parent_ref,
                    reason
                );
                child.set_parent_ref(UNLINKED);
                let child = Repository::<C>::update(&*self.store, child).await?;
                repaired.push(child.id());
            }
        }

        Ok(repaired)
    }

    /// Run the change hook for a parent under its lock
    ///
    /// Used when the parent itself changed (e.g. interface options).
    pub async fn parent_changed(&self, parent: &C::Parent) -> Result<()> {
        let _guard = self.locks.lock(parent.id()).await;
        self.run_hook(parent).await
    }

    /// Run the removal hook for a parent that was deleted
    pub async fn parent_removed(&self, parent: &C::Parent) -> Result<()> {
        let _guard = self.locks.lock(parent.id()).await;
        self.removal_hook(parent).await
    }

    async fn previous_parent_ref(&self, child: &C) -> Result<RecordId> {
        if child.id() == UNLINKED {
            return Ok(UNLINKED);
        }
        match Repository::<C>::find_by_id(&*self.store, child.id()).await? {
            Some(stored) => Ok(stored.parent_ref()),
            None => Err(Error::not_found(C::KIND, child.id())),
        }
    }

    async fn persist_child(&self, child: C) -> Result<C> {
        if child.id() == UNLINKED {
            Repository::<C>::create(&*self.store, child).await
        } else {
            Repository::<C>::update(&*self.store, child).await
        }
    }

    async fn resolve_parent(
        &self,
        parent_ref: RecordId,
    ) -> std::result::Result<C::Parent, String> {
        match Repository::<C::Parent>::find_by_id(&*self.store, parent_ref).await {
            Ok(Some(parent)) => Ok(parent),
            Ok(None) => Err("not found".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn run_hook(&self, parent: &C::Parent) -> Result<()> {
        match &self.hook {
            Some(hook) => hook.parent_changed(parent).await,
            None => Ok(()),
        }
    }

    async fn refresh_by_id(&self, parent_id: RecordId) -> Result<()> {
        if parent_id == UNLINKED {
            return Ok(());
        }
        let _guard = self.locks.lock(parent_id).await;
        self.refresh_and_hook(parent_id).await
    }

    /// Bump the parent's `updated_at` and run the change hook
    ///
    /// The parent is re-read so that only the timestamp changes. Caller
    /// holds the parent lock.
    async fn refresh_and_hook(&self, parent_id: RecordId) -> Result<()> {
        match Repository::<C::Parent>::find_by_id(&*self.store, parent_id).await? {
            Some(parent) => {
                let parent = Repository::<C::Parent>::update(&*self.store, parent).await?;
                self.run_hook(&parent).await
            }
            None => {
                debug!(
                    "{} {} gone, nothing to refresh",
                    <C::Parent as Entity>::KIND,
                    parent_id
                );
                Ok(())
            }
        }
    }

    async fn detach_locked(&self, parent_id: RecordId) -> Result<Vec<RecordId>> {
        let children = self.store.find_by_foreign_key(parent_id).await?;

        let mut detached = Vec::with_capacity(children.len());
        for mut child in children {
            child.set_parent_ref(UNLINKED);
            let child = Repository::<C>::update(&*self.store, child).await?;
            detached.push(child.id());
        }

        if !detached.is_empty() {
            info!(
                "Detached {} {}(s) from {} {}",
                detached.len(),
                C::KIND,
                <C::Parent as Entity>::KIND,
                parent_id
            );
        }
        Ok(detached)
    }

    async fn removal_hook(&self, parent: &C::Parent) -> Result<()> {
        match &self.hook {
            Some(hook) => hook.parent_removed(parent).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Plan, Subscriber};
    use crate::store::MemoryStore;

    fn synchronizer() -> (Arc<MemoryStore>, AssociationSynchronizer<MemoryStore, Subscriber>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), AssociationSynchronizer::new(store))
    }

    #[tokio::test]
    async fn test_link_to_existing_parent() {
        let (store, sync) = synchronizer();
        let plan = Repository::<Plan>::create(&*store, Plan::new("basic")).await.unwrap();

        let sub = sync
            .link_child(Subscriber::new("alice", "pw").on_plan(plan.id()))
            .await
            .unwrap();

        assert_eq!(sub.plan_ref, plan.id());
        let subs = ChildRepository::<Subscriber>::find_by_foreign_key(&*store, plan.id())
            .await
            .unwrap();
        assert_eq!(subs, vec![sub]);

        let refreshed = Repository::<Plan>::find_by_id(&*store, plan.id()).await.unwrap().unwrap();
        assert!(refreshed.meta.updated_at >= plan.meta.updated_at);
    }

    #[tokio::test]
    async fn test_dangling_reference_is_cleared() {
        let (store, sync) = synchronizer();

        let applied = sync
            .link(Subscriber::new("bob", "pw").on_plan(99))
            .await
            .unwrap();

        assert_eq!(applied.record.plan_ref, UNLINKED);
        assert!(matches!(
            applied.warnings.as_slice(),
            [Error::ParentNotFound { parent_id: 99, .. }]
        ));
        let stored = Repository::<Subscriber>::find_by_id(&*store, applied.record.id())
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_linked());
    }

    #[tokio::test]
    async fn test_detach_and_repair() {
        let (store, sync) = synchronizer();
        let plan = Repository::<Plan>::create(&*store, Plan::new("basic")).await.unwrap();
        let a = sync
            .link_child(Subscriber::new("a", "pw").on_plan(plan.id()))
            .await
            .unwrap();

        // Parent disappears behind the synchronizer's back
        Repository::<Plan>::delete(&*store, plan.id()).await.unwrap();
        assert_eq!(sync.repair().await.unwrap(), vec![a.id()]);
        assert!(sync.repair().await.unwrap().is_empty());

        let plan = Repository::<Plan>::create(&*store, Plan::new("premium")).await.unwrap();
        let b = sync
            .link_child(Subscriber::new("b", "pw").on_plan(plan.id()))
            .await
            .unwrap();
        assert_eq!(sync.detach_children(plan.id()).await.unwrap(), vec![b.id()]);
    }

    #[test]
    fn test_applied_into_result() {
        assert_eq!(Applied::clean(7).into_result().unwrap(), 7);

        let applied = Applied {
            record: 7,
            warnings: vec![Error::Timeout("reply".into())],
        };
        assert!(!applied.is_clean());
        assert!(matches!(applied.into_result(), Err(Error::Timeout(_))));
    }
}
