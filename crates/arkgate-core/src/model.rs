// # Gateway Records
//
// Plain data records managed through the persistence collaborator.
//
// ## References
//
// `IpAssignment::interface_ref` and `Subscriber::plan_ref` are weak
// back-references: plain ids, `UNLINKED` (0) when absent. A parent never
// stores its children; the child's foreign key is the single source of truth
// and the parent-side collection is computed on read (see `InterfaceView`,
// `PlanView`).
//
// ## Wire names
//
// Serialized field names match the JSON the Arkgate API has always used
// (`ip`, `ifid`, `planname`, `fip`, ...).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Record identifier assigned by the store
pub type RecordId = u64;

/// Reference value meaning "not linked to any parent"
pub const UNLINKED: RecordId = 0;

/// Identity and timestamps shared by every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Store-assigned id, 0 until the record is created
    #[serde(rename = "ID", default)]
    pub id: RecordId,
    /// Creation time
    #[serde(rename = "CreatedAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(rename = "UpdatedAt", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for RecordMeta {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: UNLINKED,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A record the persistence collaborator can store
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Human-readable kind, used in errors and logs
    const KIND: &'static str;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> RecordId {
        self.meta().id
    }
}

/// A record holding a weak reference to a parent record
pub trait ChildEntity: Entity {
    /// The record kind this child points at
    type Parent: Entity;

    /// Current parent reference, `UNLINKED` when none
    fn parent_ref(&self) -> RecordId;

    fn set_parent_ref(&mut self, parent: RecordId);

    fn is_linked(&self) -> bool {
        self.parent_ref() != UNLINKED
    }
}

/// A network interface and the options rendered into its hostname file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Symbolic name
    pub name: String,
    /// Extra hostname.if directives, one per line
    #[serde(default)]
    pub options: String,
    /// OS-level device name (e.g. "em0")
    pub device: String,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::default(),
            name: name.into(),
            options: String::new(),
            device: device.into(),
        }
    }

    /// Set the free-form options
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    /// Non-empty, trimmed option lines in declaration order
    pub fn option_lines(&self) -> impl Iterator<Item = &str> {
        self.options
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }
}

impl Entity for NetworkInterface {
    const KIND: &'static str = "interface";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// An address assigned (or waiting to be assigned) to an interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAssignment {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Address literal, validated only when rendered
    #[serde(rename = "ip")]
    pub address: String,
    /// Prefix length
    pub prefix: u8,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Owning interface, `UNLINKED` when none
    #[serde(rename = "ifid", default)]
    pub interface_ref: RecordId,
}

impl IpAssignment {
    pub fn new(address: impl Into<String>, prefix: u8) -> Self {
        Self {
            meta: RecordMeta::default(),
            address: address.into(),
            prefix,
            name: String::new(),
            interface_ref: UNLINKED,
        }
    }

    /// Point the assignment at an interface
    pub fn on_interface(mut self, interface: RecordId) -> Self {
        self.interface_ref = interface;
        self
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The `address/prefix` literal fed to the parser
    pub fn cidr_literal(&self) -> String {
        format!("{}/{}", self.address, self.prefix)
    }
}

impl Entity for IpAssignment {
    const KIND: &'static str = "ip";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

impl ChildEntity for IpAssignment {
    type Parent = NetworkInterface;

    fn parent_ref(&self) -> RecordId {
        self.interface_ref
    }

    fn set_parent_ref(&mut self, parent: RecordId) {
        self.interface_ref = parent;
    }
}

/// A billing/service profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(rename = "planname")]
    pub name: String,
    #[serde(rename = "downspeed", default)]
    pub down_speed: u32,
    #[serde(rename = "upspeed", default)]
    pub up_speed: u32,
    #[serde(rename = "burstspeed", default)]
    pub burst_speed: u32,
    #[serde(default)]
    pub duration: u32,
}

impl Plan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set down/up rates
    pub fn with_rates(mut self, down_speed: u32, up_speed: u32) -> Self {
        self.down_speed = down_speed;
        self.up_speed = up_speed;
        self
    }
}

impl Entity for Plan {
    const KIND: &'static str = "plan";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// A PPP subscriber bound to a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub username: String,
    /// Opaque at this layer; classified by the authentication collaborator
    pub password: String,
    #[serde(rename = "fip", default)]
    pub framed_ip: String,
    #[serde(rename = "planid", default)]
    pub plan_ref: RecordId,
}

impl Subscriber {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Point the subscriber at a plan
    pub fn on_plan(mut self, plan: RecordId) -> Self {
        self.plan_ref = plan;
        self
    }

    /// Set the framed address
    pub fn with_framed_ip(mut self, framed_ip: impl Into<String>) -> Self {
        self.framed_ip = framed_ip.into();
        self
    }
}

impl Entity for Subscriber {
    const KIND: &'static str = "subscriber";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

impl ChildEntity for Subscriber {
    type Parent = Plan;

    fn parent_ref(&self) -> RecordId {
        self.plan_ref
    }

    fn set_parent_ref(&mut self, parent: RecordId) {
        self.plan_ref = parent;
    }
}

/// Packet filter rule, stored as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub quick: bool,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub address_family: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub source_ip: String,
    #[serde(default)]
    pub source_port: String,
    #[serde(default)]
    pub destination_ip: String,
    #[serde(default)]
    pub destination_port: String,
}

impl Entity for FirewallRule {
    const KIND: &'static str = "firewall rule";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// Traffic queue, stored as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    #[serde(default)]
    pub on_or_parent: String,
    #[serde(default)]
    pub parent_name_or_interface: String,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub burst: u32,
    #[serde(default)]
    pub duration: u32,
}

impl Entity for Queue {
    const KIND: &'static str = "queue";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// An interface together with its assignments, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceView {
    #[serde(flatten)]
    pub interface: NetworkInterface,
    #[serde(rename = "Ips")]
    pub ips: Vec<IpAssignment>,
}

/// A plan together with its subscribers, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: Plan,
    #[serde(rename = "Subs")]
    pub subscribers: Vec<Subscriber>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_wire_names() {
        let json = r#"{"ip":"192.168.1.10","prefix":24,"name":"lan","ifid":3}"#;
        let ip: IpAssignment = serde_json::from_str(json).unwrap();
        assert_eq!(ip.address, "192.168.1.10");
        assert_eq!(ip.interface_ref, 3);
        assert_eq!(ip.id(), UNLINKED);
        assert_eq!(ip.cidr_literal(), "192.168.1.10/24");

        let value = serde_json::to_value(&ip).unwrap();
        assert_eq!(value["ifid"], 3);
        assert_eq!(value["ip"], "192.168.1.10");
    }

    #[test]
    fn test_subscriber_defaults_unlinked() {
        let json = r#"{"username":"alice","password":"c2VjcmV0"}"#;
        let sub: Subscriber = serde_json::from_str(json).unwrap();
        assert!(!sub.is_linked());
        assert_eq!(sub.framed_ip, "");
    }

    #[test]
    fn test_option_lines_skip_blanks() {
        let iface = NetworkInterface::new("wan", "em0").with_options("up\n\n  mtu 1500 \n");
        let lines: Vec<_> = iface.option_lines().collect();
        assert_eq!(lines, vec!["up", "mtu 1500"]);
    }
}
