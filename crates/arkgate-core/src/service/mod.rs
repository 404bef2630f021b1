//! Gateway service
//!
//! The API-facing entry point. Every mutation goes through here so that the
//! store, the hostname.if files and the privileged daemon stay in step.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────┐
//!  API request ────► │ GatewayService  │ ──── SyncEvent ────► monitoring
//!                    └─────────────────┘
//!                             │
//!         ┌───────────────────┼─────────────────────┐
//!         ▼                   ▼                     ▼
//! ┌───────────────┐   ┌───────────────┐     ┌───────────────┐
//! │ Association   │   │ HostnameSync  │     │   Notifier    │
//! │ Synchronizer  │──►│ (hook)        │     │ (netstart)    │
//! └───────────────┘   └───────────────┘     └───────────────┘
//!         │                   │
//!         ▼                   ▼
//!    GatewayStore       ConfigWriter
//! ```
//!
//! ## Outcomes
//!
//! - `Err(e)`: nothing was committed (bad input, missing record, store failure)
//! - `Ok(Applied { record, warnings })`: the store change is committed;
//!   `warnings` lists follow-up steps that failed (dangling reference repaired,
//!   file not written, daemon not notified). Nothing is rolled back.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::address::Cidr;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::hostname::{ConfigWriter, HostnameSync};
use crate::model::{
    ChildEntity, Entity, FirewallRule, InterfaceView, IpAssignment, NetworkInterface, Plan,
    PlanView, Queue, RecordId, Subscriber, UNLINKED,
};
use crate::sync::locks::KeyedLocks;
use crate::sync::{Applied, AssociationSynchronizer};
use crate::traits::{
    ChildRepository, ControlCommand, GatewayStore, Notifier, ParentHook, Repository,
};

/// Events emitted by the GatewayService
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A hostname.if file was (re)generated
    InterfaceWritten {
        interface_id: RecordId,
        device: String,
    },

    /// A hostname.if file was removed
    InterfaceRemoved { device: String },

    /// A child record was stored linked to its parent
    Linked {
        kind: &'static str,
        child_id: RecordId,
        parent_id: RecordId,
    },

    /// A dangling reference was cleared
    Repaired {
        kind: &'static str,
        child_id: RecordId,
    },

    /// The privileged daemon accepted a command
    Notified { command: String },

    /// The privileged daemon could not be told
    NotifyFailed { command: String, error: String },

    /// A full reconcile pass finished
    Reconciled {
        interfaces: usize,
        repaired: usize,
        warnings: usize,
    },
}

/// Result of [`GatewayService::reconcile`]
#[derive(Debug, Default)]
pub struct Reconciled {
    /// IP assignments whose interface no longer existed
    pub repaired_ips: Vec<RecordId>,
    /// Subscribers whose plan no longer existed
    pub repaired_subscribers: Vec<RecordId>,
    /// Files regenerated
    pub written: Vec<PathBuf>,
    /// Regeneration and notification failures
    pub warnings: Vec<Error>,
}

/// API-facing gateway operations
///
/// Safe to share across request handlers (`Arc<GatewayService<_>>`).
pub struct GatewayService<S: GatewayStore> {
    store: Arc<S>,
    writer: Arc<ConfigWriter>,
    ips: AssociationSynchronizer<S, IpAssignment>,
    subscribers: AssociationSynchronizer<S, Subscriber>,
    notifier: Option<Arc<dyn Notifier>>,
    notify_on_change: bool,
    /// Serializes the device uniqueness check with the write that claims it
    devices: KeyedLocks<String>,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl<S: GatewayStore> GatewayService<S> {
    /// Create a new service
    ///
    /// # Parameters
    ///
    /// - `store`: persistence collaborator
    /// - `writer`: hostname.if writer
    /// - `notifier`: privileged daemon channel, `None` to disable notifications
    /// - `config`: service settings
    ///
    /// # Returns
    ///
    /// A tuple of (service, event_receiver) where event_receiver yields sync events
    pub fn new(
        store: Arc<S>,
        writer: Arc<ConfigWriter>,
        notifier: Option<Arc<dyn Notifier>>,
        config: &ServiceConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        if config.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let hostnames: Arc<dyn ParentHook<NetworkInterface>> =
            Arc::new(HostnameSync::new(store.clone(), writer.clone()));
        let ips =
            AssociationSynchronizer::<S, IpAssignment>::new(store.clone()).with_hook(hostnames);
        let subscribers = AssociationSynchronizer::<S, Subscriber>::new(store.clone());

        let service = Self {
            store,
            writer,
            ips,
            subscribers,
            notifier,
            notify_on_change: config.notify_on_change,
            devices: KeyedLocks::new(),
            event_tx: tx,
        };

        Ok((service, rx))
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn writer(&self) -> &Arc<ConfigWriter> {
        &self.writer
    }

    // ---- interfaces -------------------------------------------------------

    /// Store a new interface and generate its file
    ///
    /// Fails with `InvalidInput` when the device name is not a plain file
    /// name or another interface already uses the device.
    pub async fn create_interface(
        &self,
        mut interface: NetworkInterface,
    ) -> Result<Applied<NetworkInterface>> {
        self.check_device(&interface.device)?;
        interface.meta.id = UNLINKED;

        let _device = self.devices.lock(interface.device.clone()).await;
        self.check_device_free(&interface.device, UNLINKED).await?;
        let created = Repository::<NetworkInterface>::create(&*self.store, interface).await?;
        info!("Created {} {} ({})", NetworkInterface::KIND, created.id(), created.device);

        let mut applied = Applied::clean(created);
        self.regenerate(&applied.record, &mut applied.warnings).await;
        Ok(applied)
    }

    /// Replace an interface and regenerate its file
    ///
    /// A device rename removes the file of the old device. The record write
    /// and the removal run under the interface lock, so an IP link in flight
    /// either finishes first or sees the new device.
    pub async fn update_interface(
        &self,
        interface: NetworkInterface,
    ) -> Result<Applied<NetworkInterface>> {
        self.check_device(&interface.device)?;
        let _device = self.devices.lock(interface.device.clone()).await;
        self.check_device_free(&interface.device, interface.id()).await?;

        let mut warnings = Vec::new();
        let updated = {
            let _parent = self.ips.lock_parent(interface.id()).await;
            let previous: NetworkInterface = self.fetch(interface.id()).await?;

            let updated = Repository::<NetworkInterface>::update(&*self.store, interface).await?;
            debug!("Updated {} {}", NetworkInterface::KIND, updated.id());

            if previous.device != updated.device {
                info!(
                    "{} {} renamed {} -> {}",
                    NetworkInterface::KIND,
                    updated.id(),
                    previous.device,
                    updated.device
                );
                self.remove_file(&previous.device, &mut warnings).await;
            }
            updated
        };

        let mut applied = Applied {
            record: updated,
            warnings,
        };
        self.regenerate(&applied.record, &mut applied.warnings).await;
        Ok(applied)
    }

    /// Delete an interface, unlink its IPs and remove its file
    ///
    /// The IP assignments are kept, unlinked.
    pub async fn delete_interface(&self, id: RecordId) -> Result<Applied<NetworkInterface>> {
        let (applied, detached) = self.ips.delete_parent(id).await?;
        info!("Deleted {} {} ({})", NetworkInterface::KIND, id, applied.record.device);

        for child_id in detached {
            self.emit_event(SyncEvent::Repaired {
                kind: IpAssignment::KIND,
                child_id,
            });
        }
        for warning in &applied.warnings {
            warn!("Deleting {} {}: {}", NetworkInterface::KIND, id, warning);
        }
        if !applied
            .warnings
            .iter()
            .any(|w| matches!(w, Error::ConfigWrite { .. }))
        {
            self.emit_event(SyncEvent::InterfaceRemoved {
                device: applied.record.device.clone(),
            });
        }
        Ok(applied)
    }

    pub async fn get_interface(&self, id: RecordId) -> Result<NetworkInterface> {
        self.fetch(id).await
    }

    pub async fn list_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        Repository::<NetworkInterface>::find_all(&*self.store).await
    }

    /// An interface together with its IP assignments
    pub async fn interface_view(&self, id: RecordId) -> Result<InterfaceView> {
        let interface: NetworkInterface = self.fetch(id).await?;
        let ips = ChildRepository::<IpAssignment>::find_by_foreign_key(&*self.store, id).await?;
        Ok(InterfaceView { interface, ips })
    }

    /// Every interface together with its IP assignments
    pub async fn interface_views(&self) -> Result<Vec<InterfaceView>> {
        let mut views = Vec::new();
        for interface in self.list_interfaces().await? {
            let ips = ChildRepository::<IpAssignment>::find_by_foreign_key(
                &*self.store,
                interface.id(),
            )
            .await?;
            views.push(InterfaceView { interface, ips });
        }
        Ok(views)
    }

    /// First interface with the given symbolic name
    pub async fn find_interface_by_name(&self, name: &str) -> Result<Option<NetworkInterface>> {
        Ok(self
            .list_interfaces()
            .await?
            .into_iter()
            .find(|interface| interface.name == name))
    }

    // ---- IP assignments ---------------------------------------------------

    /// Store a new IP assignment and link it to its interface
    ///
    /// Fails with `MalformedAddress` before anything is written when the
    /// address and prefix do not form a valid CIDR.
    pub async fn create_ip(&self, mut ip: IpAssignment) -> Result<Applied<IpAssignment>> {
        Cidr::from_parts(&ip.address, ip.prefix)?;
        ip.meta.id = UNLINKED;
        self.link_ip(ip, UNLINKED).await
    }

    /// Replace an IP assignment, relinking it if its interface changed
    pub async fn update_ip(&self, ip: IpAssignment) -> Result<Applied<IpAssignment>> {
        Cidr::from_parts(&ip.address, ip.prefix)?;
        let previous: IpAssignment = self.fetch(ip.id()).await?;
        self.link_ip(ip, previous.interface_ref).await
    }

    /// Delete an IP assignment and regenerate its interface's file
    pub async fn delete_ip(&self, id: RecordId) -> Result<Applied<IpAssignment>> {
        let mut applied = self.ips.remove_child(id).await?;
        info!("Deleted {} {}", IpAssignment::KIND, id);

        if applied.is_clean() && applied.record.is_linked() {
            let devices = self.devices_of([applied.record.interface_ref]).await;
            self.notify_devices(devices, &mut applied.warnings).await;
        }
        Ok(applied)
    }

    pub async fn get_ip(&self, id: RecordId) -> Result<IpAssignment> {
        self.fetch(id).await
    }

    pub async fn list_ips(&self) -> Result<Vec<IpAssignment>> {
        Repository::<IpAssignment>::find_all(&*self.store).await
    }

    // ---- plans ------------------------------------------------------------

    pub async fn create_plan(&self, mut plan: Plan) -> Result<Plan> {
        plan.meta.id = UNLINKED;
        let plan = Repository::<Plan>::create(&*self.store, plan).await?;
        info!("Created {} {} ({})", Plan::KIND, plan.id(), plan.name);
        Ok(plan)
    }

    /// Replace a plan under its lock, so concurrent subscriber links keep the change
    pub async fn update_plan(&self, plan: Plan) -> Result<Plan> {
        let _parent = self.subscribers.lock_parent(plan.id()).await;
        Repository::<Plan>::update(&*self.store, plan).await
    }

    /// Delete a plan; its subscribers are kept, unlinked
    pub async fn delete_plan(&self, id: RecordId) -> Result<Applied<Plan>> {
        let (applied, detached) = self.subscribers.delete_parent(id).await?;
        info!("Deleted {} {} ({})", Plan::KIND, id, applied.record.name);

        for child_id in detached {
            self.emit_event(SyncEvent::Repaired {
                kind: Subscriber::KIND,
                child_id,
            });
        }
        for warning in &applied.warnings {
            warn!("Deleting {} {}: {}", Plan::KIND, id, warning);
        }
        Ok(applied)
    }

    pub async fn get_plan(&self, id: RecordId) -> Result<Plan> {
        self.fetch(id).await
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        Repository::<Plan>::find_all(&*self.store).await
    }

    /// A plan together with its subscribers
    pub async fn plan_view(&self, id: RecordId) -> Result<PlanView> {
        let plan: Plan = self.fetch(id).await?;
        let subscribers =
            ChildRepository::<Subscriber>::find_by_foreign_key(&*self.store, id).await?;
        Ok(PlanView { plan, subscribers })
    }

    // ---- subscribers ------------------------------------------------------

    /// Store a new subscriber and link it to its plan
    pub async fn create_subscriber(
        &self,
        mut subscriber: Subscriber,
    ) -> Result<Applied<Subscriber>> {
        subscriber.meta.id = UNLINKED;
        self.link_subscriber(subscriber).await
    }

    /// Replace a subscriber, relinking it if its plan changed
    pub async fn update_subscriber(&self, subscriber: Subscriber) -> Result<Applied<Subscriber>> {
        let _: Subscriber = self.fetch(subscriber.id()).await?;
        self.link_subscriber(subscriber).await
    }

    pub async fn delete_subscriber(&self, id: RecordId) -> Result<Applied<Subscriber>> {
        let applied = self.subscribers.remove_child(id).await?;
        info!("Deleted {} {}", Subscriber::KIND, id);
        Ok(applied)
    }

    pub async fn get_subscriber(&self, id: RecordId) -> Result<Subscriber> {
        self.fetch(id).await
    }

    pub async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        Repository::<Subscriber>::find_all(&*self.store).await
    }

    pub async fn find_subscriber_by_username(&self, username: &str) -> Result<Option<Subscriber>> {
        Ok(self
            .list_subscribers()
            .await?
            .into_iter()
            .find(|subscriber| subscriber.username == username))
    }

    // ---- firewall rules and queues ----------------------------------------

    pub async fn create_firewall_rule(&self, mut rule: FirewallRule) -> Result<FirewallRule> {
        rule.meta.id = UNLINKED;
        Repository::<FirewallRule>::create(&*self.store, rule).await
    }

    pub async fn update_firewall_rule(&self, rule: FirewallRule) -> Result<FirewallRule> {
        Repository::<FirewallRule>::update(&*self.store, rule).await
    }

    pub async fn delete_firewall_rule(&self, id: RecordId) -> Result<FirewallRule> {
        Repository::<FirewallRule>::delete(&*self.store, id).await
    }

    pub async fn list_firewall_rules(&self) -> Result<Vec<FirewallRule>> {
        Repository::<FirewallRule>::find_all(&*self.store).await
    }

    pub async fn create_queue(&self, mut queue: Queue) -> Result<Queue> {
        queue.meta.id = UNLINKED;
        Repository::<Queue>::create(&*self.store, queue).await
    }

    pub async fn update_queue(&self, queue: Queue) -> Result<Queue> {
        Repository::<Queue>::update(&*self.store, queue).await
    }

    pub async fn delete_queue(&self, id: RecordId) -> Result<Queue> {
        Repository::<Queue>::delete(&*self.store, id).await
    }

    pub async fn list_queues(&self) -> Result<Vec<Queue>> {
        Repository::<Queue>::find_all(&*self.store).await
    }

    // ---- reconcile --------------------------------------------------------

    /// Bring files and references back in line with the store
    ///
    /// Unlinks every dangling IP and subscriber reference, regenerates every
    /// interface file and notifies every device that was written.
    pub async fn reconcile(&self) -> Result<Reconciled> {
        let mut report = Reconciled {
            repaired_ips: self.ips.repair().await?,
            repaired_subscribers: self.subscribers.repair().await?,
            ..Reconciled::default()
        };

        for &child_id in &report.repaired_ips {
            self.emit_event(SyncEvent::Repaired {
                kind: IpAssignment::KIND,
                child_id,
            });
        }
        for &child_id in &report.repaired_subscribers {
            self.emit_event(SyncEvent::Repaired {
                kind: Subscriber::KIND,
                child_id,
            });
        }

        let interfaces = self.list_interfaces().await?;
        let mut devices = BTreeSet::new();
        for interface in &interfaces {
            match self.ips.parent_changed(interface).await {
                Ok(()) => {
                    self.emit_event(SyncEvent::InterfaceWritten {
                        interface_id: interface.id(),
                        device: interface.device.clone(),
                    });
                    report.written.push(self.writer.path_for(&interface.device)?);
                    devices.insert(interface.device.clone());
                }
                Err(e) => {
                    warn!("Failed to regenerate {}: {}", interface.device, e);
                    report.warnings.push(e);
                }
            }
        }
        self.notify_devices(devices, &mut report.warnings).await;

        info!(
            "Reconciled {} interface(s), repaired {} reference(s), {} warning(s)",
            interfaces.len(),
            report.repaired_ips.len() + report.repaired_subscribers.len(),
            report.warnings.len()
        );
        self.emit_event(SyncEvent::Reconciled {
            interfaces: interfaces.len(),
            repaired: report.repaired_ips.len() + report.repaired_subscribers.len(),
            warnings: report.warnings.len(),
        });
        Ok(report)
    }

    // ---- helpers ----------------------------------------------------------

    async fn link_ip(
        &self,
        ip: IpAssignment,
        previous_ref: RecordId,
    ) -> Result<Applied<IpAssignment>> {
        let mut applied = self.ips.link(ip).await?;
        self.report_link(&applied);

        if applied.is_clean() {
            let devices = self
                .devices_of([previous_ref, applied.record.interface_ref])
                .await;
            self.notify_devices(devices, &mut applied.warnings).await;
        }
        Ok(applied)
    }

    async fn link_subscriber(&self, subscriber: Subscriber) -> Result<Applied<Subscriber>> {
        let applied = self.subscribers.link(subscriber).await?;
        self.report_link(&applied);
        Ok(applied)
    }

    fn report_link<C: ChildEntity>(&self, applied: &Applied<C>) {
        if applied.record.is_linked() {
            self.emit_event(SyncEvent::Linked {
                kind: C::KIND,
                child_id: applied.record.id(),
                parent_id: applied.record.parent_ref(),
            });
        }
        for warning in &applied.warnings {
            if let Error::ParentNotFound { child_id, .. } = warning {
                self.emit_event(SyncEvent::Repaired {
                    kind: C::KIND,
                    child_id: *child_id,
                });
            }
        }
    }

    async fn regenerate(&self, interface: &NetworkInterface, warnings: &mut Vec<Error>) {
        match self.ips.parent_changed(interface).await {
            Ok(()) => {
                self.emit_event(SyncEvent::InterfaceWritten {
                    interface_id: interface.id(),
                    device: interface.device.clone(),
                });
                self.notify_devices([interface.device.clone()], warnings).await;
            }
            Err(e) => {
                warn!("Failed to regenerate {}: {}", interface.device, e);
                warnings.push(e);
            }
        }
    }

    async fn remove_file(&self, device: &str, warnings: &mut Vec<Error>) {
        match self.writer.remove(device).await {
            Ok(_) => self.emit_event(SyncEvent::InterfaceRemoved {
                device: device.to_string(),
            }),
            Err(e) => {
                warn!("Failed to remove file for {}: {}", device, e);
                warnings.push(e);
            }
        }
    }

    /// Devices of the given interfaces, skipping unlinked and missing ones
    async fn devices_of(&self, ids: impl IntoIterator<Item = RecordId>) -> BTreeSet<String> {
        let mut devices = BTreeSet::new();
        for id in ids.into_iter().filter(|id| *id != UNLINKED) {
            match Repository::<NetworkInterface>::find_by_id(&*self.store, id).await {
                Ok(Some(interface)) => {
                    devices.insert(interface.device);
                }
                Ok(None) => debug!("{} {} gone, not notifying", NetworkInterface::KIND, id),
                Err(e) => warn!("Failed to look up {} {}: {}", NetworkInterface::KIND, id, e),
            }
        }
        devices
    }

    async fn notify_devices(
        &self,
        devices: impl IntoIterator<Item = String>,
        warnings: &mut Vec<Error>,
    ) {
        let Some(notifier) = self.notifier.as_ref().filter(|_| self.notify_on_change) else {
            return;
        };

        for device in devices {
            let command = ControlCommand::netstart(device);
            match notifier.send(&command).await {
                Ok(()) => self.emit_event(SyncEvent::Notified {
                    command: command.to_string(),
                }),
                Err(e) => {
                    warn!(
                        "{} notification {:?} failed: {}",
                        notifier.notifier_name(),
                        command.to_string(),
                        e
                    );
                    self.emit_event(SyncEvent::NotifyFailed {
                        command: command.to_string(),
                        error: e.to_string(),
                    });
                    warnings.push(e);
                }
            }
        }
    }

    fn check_device(&self, device: &str) -> Result<()> {
        self.writer
            .path_for(device)
            .map(|_| ())
            .map_err(|_| Error::invalid_input(format!("invalid device name {:?}", device)))
    }

    /// One hostname.if file per device, so one interface per device
    ///
    /// Caller holds the device lock.
    async fn check_device_free(&self, device: &str, except: RecordId) -> Result<()> {
        let taken = self
            .list_interfaces()
            .await?
            .into_iter()
            .find(|other| other.device == device && other.id() != except);
        match taken {
            Some(other) => Err(Error::invalid_input(format!(
                "device {:?} is already used by {} {}",
                device,
                NetworkInterface::KIND,
                other.id()
            ))),
            None => Ok(()),
        }
    }

    async fn fetch<T: Entity>(&self, id: RecordId) -> Result<T>
    where
        S: Repository<T>,
    {
        Repository::<T>::find_by_id(&*self.store, id)
            .await?
            .ok_or_else(|| Error::not_found(T::KIND, id))
    }

    /// Emit an event, dropping it with a warning when the channel is full
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::tempdir;
    use tokio::fs;

    fn service(
        root: &std::path::Path,
    ) -> (GatewayService<MemoryStore>, mpsc::Receiver<SyncEvent>) {
        GatewayService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ConfigWriter::new(root)),
            None,
            &ServiceConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ip_lifecycle_rewrites_file() {
        let dir = tempdir().unwrap();
        let (service, _events) = service(dir.path());
        let path = dir.path().join("hostname.em0");

        let iface = service
            .create_interface(NetworkInterface::new("lan", "em0").with_options("up"))
            .await
            .unwrap()
            .record;
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "up\n");

        let ip = service
            .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(iface.id()))
            .await
            .unwrap();
        assert!(ip.is_clean());
        assert_eq!(
            fs::read_to_string(&path).await.unwrap(),
            "inet 192.168.1.10 255.255.255.0\nup\n"
        );

        service.delete_ip(ip.record.id()).await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "up\n");
    }

    #[tokio::test]
    async fn test_malformed_ip_writes_nothing() {
        let dir = tempdir().unwrap();
        let (service, _events) = service(dir.path());

        let err = service
            .create_ip(IpAssignment::new("192.168.1.10", 33))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)));
        assert!(service.list_ips().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_device_rename_moves_file() {
        let dir = tempdir().unwrap();
        let (service, _events) = service(dir.path());

        let mut iface = service
            .create_interface(NetworkInterface::new("lan", "em0"))
            .await
            .unwrap()
            .record;
        iface.device = "em1".into();
        let applied = service.update_interface(iface).await.unwrap();

        assert!(applied.is_clean());
        assert!(!dir.path().join("hostname.em0").exists());
        assert!(dir.path().join("hostname.em1").exists());
    }

    #[tokio::test]
    async fn test_invalid_device_is_rejected() {
        let dir = tempdir().unwrap();
        let (service, _events) = service(dir.path());

        let err = service
            .create_interface(NetworkInterface::new("evil", "../passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(service.list_interfaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_plan_detaches_subscribers() {
        let dir = tempdir().unwrap();
        let (service, _events) = service(dir.path());

        let plan = service.create_plan(Plan::new("basic").with_rates(10, 5)).await.unwrap();
        let sub = service
            .create_subscriber(Subscriber::new("alice", "pw").on_plan(plan.id()))
            .await
            .unwrap()
            .record;
        assert_eq!(service.plan_view(plan.id()).await.unwrap().subscribers.len(), 1);

        service.delete_plan(plan.id()).await.unwrap();
        let sub = service.get_subscriber(sub.id()).await.unwrap();
        assert!(!sub.is_linked());
        assert_eq!(
            service.find_subscriber_by_username("alice").await.unwrap(),
            Some(sub)
        );
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let dir = tempdir().unwrap();
        let (service, mut events) = service(dir.path());

        let iface = service
            .create_interface(NetworkInterface::new("lan", "em0"))
            .await
            .unwrap()
            .record;
        service
            .create_ip(IpAssignment::new("10.0.0.5", 32).on_interface(iface.id()))
            .await
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(SyncEvent::InterfaceWritten {
                interface_id: iface.id(),
                device: "em0".into()
            })
        );
        assert_eq!(
            events.recv().await,
            Some(SyncEvent::Linked {
                kind: "ip",
                child_id: 1,
                parent_id: iface.id()
            })
        );
    }
}
