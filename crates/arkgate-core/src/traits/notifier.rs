// # Notifier Trait
//
// Defines the interface for telling the privileged peer that host
// configuration changed.
//
// ## Implementations
//
// - `CommandChannel`: Unix socket round-trip (`crate::channel`)
//
// Notification is best-effort from the caller's point of view: a failure is
// surfaced but never undoes the data change that triggered it.

use async_trait::async_trait;
use std::fmt;

/// A command understood by the privileged peer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Re-run interface configuration for one device
    Netstart {
        /// Device name (e.g. "em0")
        device: String,
    },

    /// A command the caller built itself
    Raw(String),
}

impl ControlCommand {
    pub fn netstart(device: impl Into<String>) -> Self {
        Self::Netstart {
            device: device.into(),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Netstart { device } => write!(f, "netstart {}", device),
            ControlCommand::Raw(command) => f.write_str(command),
        }
    }
}

/// Trait for delivering commands to the privileged peer
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one command and wait for the peer's verdict
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The peer acknowledged with `OK`
    /// - `Err(Error::CommandRejected)`: The peer answered anything else
    /// - `Err(Error::ChannelUnavailable)`: The peer could not be reached
    async fn send(&self, command: &ControlCommand) -> Result<(), crate::Error>;

    /// Name used in logs
    fn notifier_name(&self) -> &'static str;
}
