// # Parent Hook Trait
//
// Side effect to run after a parent's derived collection changed.
//
// The synchronizer invokes the hook while it still holds the per-parent
// lock, so a hook never races another link or unlink on the same parent.

use async_trait::async_trait;

use crate::model::Entity;

/// Reaction to a change in a parent's set of children
#[async_trait]
pub trait ParentHook<P: Entity>: Send + Sync {
    /// Called with the refreshed parent record
    async fn parent_changed(&self, parent: &P) -> Result<(), crate::Error>;

    /// Called after the parent itself has been deleted
    async fn parent_removed(&self, parent: &P) -> Result<(), crate::Error> {
        let _ = parent;
        Ok(())
    }
}
