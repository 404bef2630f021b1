// # Command Channel
//
// Delivers one command to the privileged peer over a Unix stream socket.
//
// ## Protocol
//
// ```text
// client                         peer
//   │── connect(socket_path) ──────►│
//   │── "<command bytes>" ─────────►│
//   │◄──────────── "OK" | "<error>" ─│   (one bounded read)
//   │── close ─────────────────────►│
// ```
//
// No framing and no length prefix: one write, one read of at most
// `REPLY_BUFFER_SIZE` bytes, then close. Only the exact bytes `OK` mean
// success. An empty reply (peer closed without answering) is a rejection.
//
// ## Failure Handling
//
// - connect failure, connect timeout or write failure → `ChannelUnavailable`
// - write/read timeout → `Timeout`
// - anything but `OK`, or a failed read → `CommandRejected`
//
// Only `ChannelUnavailable` is retried, and only when `max_retries > 0`.
// Round-trips through one channel are serialized; dropping the returned
// future aborts the round-trip.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::traits::{ControlCommand, Notifier};

/// Size of the single reply read
pub const REPLY_BUFFER_SIZE: usize = 64;

/// The only reply that means success
pub const REPLY_OK: &[u8] = b"OK";

/// Unix-socket client for the privileged peer
#[derive(Debug)]
pub struct CommandChannel {
    socket_path: PathBuf,
    connect_timeout: Duration,
    io_timeout: Duration,
    max_retries: usize,
    retry_delay: Duration,
    endpoint: Mutex<()>,
}

impl CommandChannel {
    /// Create a channel from configuration
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            io_timeout: Duration::from_millis(config.io_timeout_ms),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            endpoint: Mutex::new(()),
        }
    }

    /// Create a channel with default timeouts and no retry
    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self::new(&ChannelConfig::new(socket_path))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a raw command string
    pub async fn send_raw(&self, command: &str) -> Result<()> {
        let _endpoint = self.endpoint.lock().await;

        let mut attempt = 0;
        loop {
            match self.round_trip(command).await {
                Err(e @ Error::ChannelUnavailable { .. }) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Control channel attempt {} of {} failed: {}",
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn round_trip(&self, command: &str) -> Result<()> {
        let endpoint = self.socket_path.display().to_string();

        let connect = UnixStream::connect(&self.socket_path);
        let mut stream = match timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::channel_unavailable(endpoint, e.to_string())),
            Err(_) => {
                return Err(Error::channel_unavailable(
                    endpoint,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ));
            }
        };

        debug!("Sending {:?} to {}", command, endpoint);
        match timeout(self.io_timeout, stream.write_all(command.as_bytes())).await {
            Ok(Ok(())) => {}
            // Peer went away before taking the command
            Ok(Err(e)) => {
                return Err(Error::channel_unavailable(
                    endpoint,
                    format!("writing command: {}", e),
                ));
            }
            Err(_) => return Err(Error::Timeout(format!("writing command to {}", endpoint))),
        }

        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        let n = match timeout(self.io_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            // The command may have been delivered, so this is not retried
            Ok(Err(e)) => {
                warn!("Reading reply to {:?} from {} failed: {}", command, endpoint, e);
                return Err(Error::CommandRejected(String::new()));
            }
            Err(_) => {
                return Err(Error::Timeout(format!("waiting for reply from {}", endpoint)));
            }
        };

        let reply = &buf[..n];
        if reply == REPLY_OK {
            info!("Peer accepted {:?}", command);
            Ok(())
        } else {
            let reply = String::from_utf8_lossy(reply).into_owned();
            warn!("Peer rejected {:?}: {:?}", command, reply);
            Err(Error::CommandRejected(reply))
        }
    }
}

#[async_trait]
impl Notifier for CommandChannel {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        self.send_raw(&command.to_string()).await
    }

    fn notifier_name(&self) -> &'static str {
        "unix-socket"
    }
}
