//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that let the contract tests
//! observe and break the collaborators of the synchronizer.

#![allow(dead_code)]

use arkgate_core::config::ServiceConfig;
use arkgate_core::error::{Error, Result};
use arkgate_core::model::{ChildEntity, RecordId};
use arkgate_core::store::{MemoryStore, TableEntity};
use arkgate_core::traits::{ChildRepository, ControlCommand, Notifier, Repository};
use arkgate_core::{ConfigWriter, GatewayService, SyncEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnixListenerStream;

/// A MemoryStore wrapper that counts lookups and can be told to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    /// find_by_id calls per record kind
    lookups: Mutex<HashMap<&'static str, usize>>,
    /// Record kinds whose find_by_id fails
    failing_lookups: Mutex<Vec<&'static str>>,
    /// When set, create/update/delete fail
    fail_writes: AtomicBool,
    /// One-shot delay before the next find_by_id of a record kind
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of find_by_id calls made for `kind`
    pub fn lookup_count(&self, kind: &str) -> usize {
        self.lookups.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    /// Make find_by_id fail for `kind`
    pub fn fail_lookups_of(&self, kind: &'static str) {
        self.failing_lookups.lock().unwrap().push(kind);
    }

    /// Hold the next find_by_id of `kind` for `delay`
    pub fn delay_next_lookup_of(&self, kind: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(kind, delay);
    }

    /// Make every write fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::persistence("injected write failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl<T: TableEntity> Repository<T> for FlakyStore {
    async fn create(&self, record: T) -> Result<T> {
        self.check_write()?;
        Repository::<T>::create(&self.inner, record).await
    }

    async fn update(&self, record: T) -> Result<T> {
        self.check_write()?;
        Repository::<T>::update(&self.inner, record).await
    }

    async fn delete(&self, id: RecordId) -> Result<T> {
        self.check_write()?;
        Repository::<T>::delete(&self.inner, id).await
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<T>> {
        *self.lookups.lock().unwrap().entry(T::KIND).or_default() += 1;
        let delay = self.delays.lock().unwrap().remove(T::KIND);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_lookups.lock().unwrap().contains(&T::KIND) {
            return Err(Error::persistence(format!("injected {} lookup failure", T::KIND)));
        }
        Repository::<T>::find_by_id(&self.inner, id).await
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        Repository::<T>::find_all(&self.inner).await
    }
}

#[async_trait::async_trait]
impl<C> ChildRepository<C> for FlakyStore
where
    C: ChildEntity + TableEntity,
    C::Parent: TableEntity,
{
    async fn find_by_foreign_key(&self, parent: RecordId) -> Result<Vec<C>> {
        ChildRepository::<C>::find_by_foreign_key(&self.inner, parent).await
    }
}

/// A Notifier that records commands instead of sending them
#[derive(Default)]
pub struct RecordingNotifier {
    commands: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails with `ChannelUnavailable`
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    /// Commands sent so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::channel_unavailable("test", "peer down"));
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// A privileged-daemon stand-in listening on a Unix socket
///
/// Answers every connection with a fixed reply and records what it read.
pub struct ScriptedPeer {
    pub path: PathBuf,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl ScriptedPeer {
    /// Bind `dir/ctl.sock` and answer every command with `reply`
    pub fn spawn(dir: &Path, reply: &'static [u8]) -> Self {
        let path = dir.join("ctl.sock");
        let listener = UnixListener::bind(&path).unwrap();
        Self::serve(path, listener, reply)
    }

    /// Serve on an already bound listener
    pub fn serve(path: PathBuf, listener: UnixListener, reply: &'static [u8]) -> Self {
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let counter = connections.clone();
        let log = received.clone();
        let handle = tokio::spawn(async move {
            let mut incoming = UnixListenerStream::new(listener);
            while let Some(Ok(mut stream)) = incoming.next().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 256];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                log.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).into_owned());
                let _ = stream.write_all(reply).await;
            }
        });

        Self {
            path,
            connections,
            received,
            handle,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for ScriptedPeer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A service over a MemoryStore writing into `root`
pub fn memory_service(
    root: &Path,
    notifier: Option<Arc<dyn Notifier>>,
) -> (GatewayService<MemoryStore>, mpsc::Receiver<SyncEvent>) {
    GatewayService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ConfigWriter::new(root)),
        notifier,
        &ServiceConfig::default(),
    )
    .expect("service construction succeeds")
}

/// A service over a FlakyStore writing into `root`
pub fn flaky_service(
    root: &Path,
    store: Arc<FlakyStore>,
) -> (GatewayService<FlakyStore>, mpsc::Receiver<SyncEvent>) {
    GatewayService::new(
        store,
        Arc::new(ConfigWriter::new(root)),
        None,
        &ServiceConfig::default(),
    )
    .expect("service construction succeeds")
}

/// Read `hostname.<device>` under `root`
pub fn read_hostname(root: &Path, device: &str) -> String {
    std::fs::read_to_string(root.join(format!("hostname.{}", device))).unwrap()
}
