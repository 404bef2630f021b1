// # arkgate-core
//
// Core library for the Arkgate gateway configuration synchronizer.
//
// ## Architecture Overview
//
// This library keeps gateway records and the host networking configuration
// derived from them consistent:
// - **address**: parse `address/prefix` literals and render hostname.if lines
// - **hostname**: write one `hostname.<device>` file per interface, atomically
// - **sync**: link IP assignments and subscribers to their parents, repair
//   dangling references
// - **channel**: tell the privileged daemon about changes over a Unix socket
// - **service**: the API-facing operations tying the above together
// - **store**: in-memory and JSON file implementations of the repository traits
//
// ## Design Principles
//
// 1. **Single source of truth**: a child's foreign key is the only stored link
// 2. **Repair, don't reject**: dangling references are cleared, the child is kept
// 3. **No rollback**: file and notification failures are reported, never undone
// 4. **Library-First**: the daemon is a thin wrapper around `GatewayService`

pub mod address;
pub mod channel;
pub mod config;
pub mod error;
pub mod hostname;
pub mod model;
pub mod service;
pub mod store;
pub mod sync;
pub mod traits;

// Re-export core types for convenience
pub use address::{AddressFamily, Cidr};
pub use channel::CommandChannel;
pub use config::{ChannelConfig, GatewayConfig, StoreConfig};
pub use error::{Error, Result};
pub use hostname::ConfigWriter;
pub use service::{GatewayService, SyncEvent};
pub use store::{FileStore, MemoryStore};
pub use sync::{Applied, AssociationSynchronizer};
pub use traits::{ChildRepository, GatewayStore, Notifier, Repository};
