//! Contract Test: hostname.if Generation
//!
//! This test verifies the end-to-end path from an API-level IP change to the
//! generated hostname.if file and the netstart notification.
//!
//! Constraints verified:
//! - Subnet members render with a dotted mask, host addresses as aliases
//! - Regeneration is a full, idempotent overwrite
//! - Deleting an interface removes its file and keeps its IPs unlinked
//! - Two interfaces never share a device file
//! - Notification failures never roll back the committed change
//! - reconcile() repairs dangling references and rewrites every file
//!
//! If this test fails, the generated host configuration can drift from the store.

mod common;

use arkgate_core::error::Error;
use arkgate_core::model::{ChildEntity, Entity, IpAssignment, NetworkInterface, UNLINKED};
use arkgate_core::traits::{Notifier, Repository};
use arkgate_core::SyncEvent;
use common::*;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_test::assert_ok;

#[tokio::test]
async fn subnet_member_renders_dotted_mask() {
    let dir = tempdir().unwrap();
    let (service, _events) = memory_service(dir.path(), None);

    let em0 = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap()
        .record;
    let applied = assert_ok!(
        service
            .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(em0.id()))
            .await
    );

    assert!(applied.is_clean());
    assert_eq!(
        read_hostname(dir.path(), "em0"),
        "inet 192.168.1.10 255.255.255.0\n"
    );
}

#[tokio::test]
async fn host_address_renders_as_alias() {
    let dir = tempdir().unwrap();
    let (service, _events) = memory_service(dir.path(), None);

    let em0 = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap()
        .record;
    assert_ok!(
        service
            .create_ip(IpAssignment::new("10.0.0.5", 32).on_interface(em0.id()))
            .await
    );

    assert_eq!(
        read_hostname(dir.path(), "em0"),
        "inet alias 10.0.0.5 255.255.255.255\n"
    );
}

#[tokio::test]
async fn mixed_families_keep_insertion_order_then_options() {
    let dir = tempdir().unwrap();
    let (service, _events) = memory_service(dir.path(), None);

    let vio0 = service
        .create_interface(NetworkInterface::new("uplink", "vio0").with_options("up\nmtu 1500"))
        .await
        .unwrap()
        .record;
    for (address, prefix) in [
        ("2001:db8::1", 64),
        ("203.0.113.5", 28),
        ("2001:db8::53", 128),
    ] {
        assert_ok!(
            service
                .create_ip(IpAssignment::new(address, prefix).on_interface(vio0.id()))
                .await
        );
    }

    assert_eq!(
        read_hostname(dir.path(), "vio0"),
        "inet6 2001:db8::1 64\n\
         inet 203.0.113.5 255.255.255.240\n\
         inet6 alias 2001:db8::53 128\n\
         up\n\
         mtu 1500\n"
    );
}

#[tokio::test]
async fn regeneration_is_idempotent() {
    let dir = tempdir().unwrap();
    let (service, _events) = memory_service(dir.path(), None);

    let em0 = service
        .create_interface(NetworkInterface::new("lan", "em0").with_options("up"))
        .await
        .unwrap()
        .record;
    service
        .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(em0.id()))
        .await
        .unwrap();

    let first = read_hostname(dir.path(), "em0");
    assert_ok!(service.reconcile().await);
    assert_ok!(service.reconcile().await);
    assert_eq!(read_hostname(dir.path(), "em0"), first);
}

#[tokio::test]
async fn deleting_interface_removes_file_and_unlinks_ips() {
    let dir = tempdir().unwrap();
    let (service, _events) = memory_service(dir.path(), None);

    let em0 = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap()
        .record;
    let ip = service
        .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(em0.id()))
        .await
        .unwrap()
        .record;

    let applied = assert_ok!(service.delete_interface(em0.id()).await);
    assert!(applied.is_clean());
    assert!(!dir.path().join("hostname.em0").exists());

    let ip = service.get_ip(ip.id()).await.unwrap();
    assert_eq!(ip.interface_ref, UNLINKED);
    assert!(matches!(
        service.interface_view(em0.id()).await,
        Err(Error::NotFound { kind: "interface", .. })
    ));
}

#[tokio::test]
async fn changes_notify_netstart_for_the_device() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let (service, _events) =
        memory_service(dir.path(), Some(notifier.clone() as Arc<dyn Notifier>));

    let em0 = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap()
        .record;
    service
        .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(em0.id()))
        .await
        .unwrap();
    // Unlinked IPs touch no device
    service
        .create_ip(IpAssignment::new("172.16.0.1", 16))
        .await
        .unwrap();

    assert_eq!(notifier.commands(), vec!["netstart em0", "netstart em0"]);
}

#[tokio::test]
async fn notification_failure_does_not_roll_back() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::failing());
    let (service, mut events) =
        memory_service(dir.path(), Some(notifier.clone() as Arc<dyn Notifier>));

    let applied = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap();

    assert!(matches!(
        applied.warnings.as_slice(),
        [Error::ChannelUnavailable { .. }]
    ));
    assert!(applied.warnings[0].is_recoverable());
    assert!(dir.path().join("hostname.em0").exists());
    assert_eq!(service.list_interfaces().await.unwrap().len(), 1);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::NotifyFailed { command, .. } = event {
            assert_eq!(command, "netstart em0");
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn reconcile_repairs_and_rewrites() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let (service, _events) =
        memory_service(dir.path(), Some(notifier.clone() as Arc<dyn Notifier>));

    let em0 = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap()
        .record;
    service
        .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(em0.id()))
        .await
        .unwrap();

    // A dangling reference written behind the service's back
    let stray = Repository::<IpAssignment>::create(
        &**service.store(),
        IpAssignment::new("10.9.9.9", 32).on_interface(404),
    )
    .await
    .unwrap();

    // The file drifts from the store
    std::fs::write(dir.path().join("hostname.em0"), "garbage\n").unwrap();

    let report = assert_ok!(service.reconcile().await);
    assert_eq!(report.repaired_ips, vec![stray.id()]);
    assert!(report.repaired_subscribers.is_empty());
    assert_eq!(report.written, vec![dir.path().join("hostname.em0")]);
    assert!(report.warnings.is_empty());

    assert_eq!(
        read_hostname(dir.path(), "em0"),
        "inet 192.168.1.10 255.255.255.0\n"
    );
    assert!(!service.get_ip(stray.id()).await.unwrap().is_linked());
    assert_eq!(notifier.commands().last().map(String::as_str), Some("netstart em0"));
}

#[tokio::test]
async fn one_interface_per_device() {
    let dir = tempdir().unwrap();
    let (service, _events) = memory_service(dir.path(), None);

    let lan = service
        .create_interface(NetworkInterface::new("lan", "em0"))
        .await
        .unwrap()
        .record;
    service
        .create_ip(IpAssignment::new("192.168.1.10", 24).on_interface(lan.id()))
        .await
        .unwrap();

    let err = service
        .create_interface(NetworkInterface::new("lan2", "em0"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{:?}", err);
    assert_eq!(service.list_interfaces().await.unwrap().len(), 1);

    let mut wan = service
        .create_interface(NetworkInterface::new("wan", "em1"))
        .await
        .unwrap()
        .record;
    wan.device = "em0".into();
    let err = service.update_interface(wan.clone()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{:?}", err);
    assert_eq!(service.get_interface(wan.id()).await.unwrap().device, "em1");

    // Keeping its own device is not a conflict
    let lan = assert_ok!(service.update_interface(lan.with_options("up")).await).record;
    assert_eq!(lan.device, "em0");

    assert_eq!(
        read_hostname(dir.path(), "em0"),
        "inet 192.168.1.10 255.255.255.0\nup\n"
    );
}
