// # hostname.if Writer
//
// Generates one OpenBSD hostname.if(5) file per interface device.
//
// ## File Layout
//
// ```text
// <root>/hostname.em0
//   inet 192.168.1.10 255.255.255.0      <- one line per assignment, insertion order
//   inet alias 10.0.0.5 255.255.255.255
//   up                                   <- interface options, one per line
// ```
//
// ## Write Semantics
//
// - Full overwrite on every regeneration, never append
// - Atomic replacement: content goes to a temp file in the same directory,
//   is flushed and synced, then renamed over the target
// - Writes to the same device are serialized; different devices proceed in
//   parallel
// - Same input, byte-identical output

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::address::{Cidr, render_line};
use crate::error::{Error, Result};
use crate::model::{Entity, IpAssignment, NetworkInterface};
use crate::sync::locks::KeyedLocks;
use crate::traits::{ChildRepository, ParentHook};

/// Default file name prefix, producing `hostname.<device>`
pub const DEFAULT_FILE_PREFIX: &str = "hostname.";

/// Writes device configuration files under a root directory
#[derive(Debug)]
pub struct ConfigWriter {
    root: PathBuf,
    file_prefix: String,
    locks: KeyedLocks<String>,
}

impl ConfigWriter {
    /// Create a writer rooted at `root` (usually `/etc`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            locks: KeyedLocks::new(),
        }
    }

    /// Override the file name prefix
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file generated for `device`
    ///
    /// Rejects device names that could escape the root directory.
    pub fn path_for(&self, device: &str) -> Result<PathBuf> {
        if device.is_empty()
            || device == "."
            || device.contains("..")
            || device.contains('/')
            || device.contains('\\')
            || device.contains('\0')
        {
            return Err(Error::config_write(
                device,
                "device name is empty or not a plain file name component",
            ));
        }
        Ok(self.root.join(format!("{}{}", self.file_prefix, device)))
    }

    /// Replace the file for `device` with `lines`, one per line
    ///
    /// Returns the path written.
    pub async fn write(&self, device: &str, lines: &[String]) -> Result<PathBuf> {
        let path = self.path_for(device)?;
        let _guard = self.locks.lock(device.to_string()).await;

        let mut content = String::new();
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }

        let temp_path = self.temp_path(device);
        let write_err =
            |e: std::io::Error| Error::config_write(path.display().to_string(), e.to_string());

        {
            let mut file = fs::File::create(&temp_path).await.map_err(write_err)?;
            file.write_all(content.as_bytes()).await.map_err(write_err)?;
            file.flush().await.map_err(write_err)?;
            file.sync_all().await.map_err(write_err)?;
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(write_err(e));
        }

        info!("Wrote {} ({} line(s))", path.display(), lines.len());
        Ok(path)
    }

    /// Delete the file for `device`
    ///
    /// Returns whether a file was removed. A missing file is not an error.
    pub async fn remove(&self, device: &str) -> Result<bool> {
        let path = self.path_for(device)?;
        let _guard = self.locks.lock(device.to_string()).await;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Nothing to remove at {}", path.display());
                Ok(false)
            }
            Err(e) => Err(Error::config_write(path.display().to_string(), e.to_string())),
        }
    }

    fn temp_path(&self, device: &str) -> PathBuf {
        self.root
            .join(format!(".{}{}.tmp", self.file_prefix, device))
    }
}

/// Render the full hostname.if content for an interface
///
/// Assignment lines come first, in the order given, followed by the
/// interface's option lines. Fails with `Error::MalformedAddress` on the
/// first assignment that does not parse.
pub fn render_interface(
    interface: &NetworkInterface,
    ips: &[IpAssignment],
) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(ips.len() + 1);
    for ip in ips {
        let cidr = Cidr::from_parts(&ip.address, ip.prefix)?;
        lines.push(render_line(&cidr));
    }
    lines.extend(interface.option_lines().map(str::to_string));
    Ok(lines)
}

/// Regenerates an interface's file whenever its assignments change
pub struct HostnameSync<S> {
    store: Arc<S>,
    writer: Arc<ConfigWriter>,
}

impl<S> HostnameSync<S>
where
    S: ChildRepository<IpAssignment> + 'static,
{
    pub fn new(store: Arc<S>, writer: Arc<ConfigWriter>) -> Self {
        Self { store, writer }
    }

    /// Rebuild and write the file for one interface
    pub async fn regenerate(&self, interface: &NetworkInterface) -> Result<PathBuf> {
        let ips: Vec<IpAssignment> = self.store.find_by_foreign_key(interface.id()).await?;
        let lines = render_interface(interface, &ips).map_err(|e| {
            Error::config_write(
                interface.device.as_str(),
                format!("cannot render {} {}: {}", NetworkInterface::KIND, interface.id(), e),
            )
        })?;
        self.writer.write(&interface.device, &lines).await
    }
}

#[async_trait]
impl<S> ParentHook<NetworkInterface> for HostnameSync<S>
where
    S: ChildRepository<IpAssignment> + 'static,
{
    async fn parent_changed(&self, parent: &NetworkInterface) -> Result<()> {
        self.regenerate(parent).await.map(|_| ())
    }

    async fn parent_removed(&self, parent: &NetworkInterface) -> Result<()> {
        self.writer.remove(&parent.device).await.map(|_| ())
    }
}
