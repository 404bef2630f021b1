//! Core traits for the Arkgate synchronizer
//!
//! This module defines the abstract interfaces at the seams of the crate.
//!
//! - [`Repository`] / [`ChildRepository`]: the persistence collaborator
//! - [`Notifier`]: delivery of commands to the privileged peer
//! - [`ParentHook`]: side effects when a parent's children change

pub mod hook;
pub mod notifier;
pub mod repository;

pub use hook::ParentHook;
pub use notifier::{ControlCommand, Notifier};
pub use repository::{ChildRepository, GatewayStore, Repository};
