// # Record Tables
//
// The in-process representation shared by every store implementation.
//
// One ordered table per record kind, keyed by id. Ids come from a per-kind
// counter that only ever grows, so a deleted id is never handed out again
// and a stale reference can never silently re-link to a new record.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{
    ChildEntity, Entity, FirewallRule, IpAssignment, NetworkInterface, Plan, Queue, RecordId,
    Subscriber,
};

/// All record tables plus the id counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    interfaces: BTreeMap<RecordId, NetworkInterface>,
    #[serde(default)]
    ips: BTreeMap<RecordId, IpAssignment>,
    #[serde(default)]
    plans: BTreeMap<RecordId, Plan>,
    #[serde(default)]
    subscribers: BTreeMap<RecordId, Subscriber>,
    #[serde(default)]
    firewall_rules: BTreeMap<RecordId, FirewallRule>,
    #[serde(default)]
    queues: BTreeMap<RecordId, Queue>,
    /// Last id handed out, per record kind
    #[serde(default)]
    last_ids: BTreeMap<String, RecordId>,
}

/// A record kind that has a table in [`Tables`]
pub trait TableEntity: Entity {
    fn table(tables: &Tables) -> &BTreeMap<RecordId, Self>;

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<RecordId, Self>;
}

macro_rules! table_entity {
    ($ty:ty, $field:ident) => {
        impl TableEntity for $ty {
            fn table(tables: &Tables) -> &BTreeMap<RecordId, Self> {
                &tables.$field
            }

            fn table_mut(tables: &mut Tables) -> &mut BTreeMap<RecordId, Self> {
                &mut tables.$field
            }
        }
    };
}

table_entity!(NetworkInterface, interfaces);
table_entity!(IpAssignment, ips);
table_entity!(Plan, plans);
table_entity!(Subscriber, subscribers);
table_entity!(FirewallRule, firewall_rules);
table_entity!(Queue, queues);

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all tables
    pub fn len(&self) -> usize {
        self.interfaces.len()
            + self.ips.len()
            + self.plans.len()
            + self.subscribers.len()
            + self.firewall_rules.len()
            + self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign the next id, stamp both timestamps and store the record
    pub fn insert<T: TableEntity>(&mut self, mut record: T) -> T {
        // Ids loaded from an older document may be ahead of the counter.
        let highest = T::table(self).keys().next_back().copied().unwrap_or_default();
        let last = self.last_ids.entry(T::KIND.to_string()).or_default();
        *last = (*last).max(highest) + 1;

        let now = Utc::now();
        let meta = record.meta_mut();
        meta.id = *last;
        meta.created_at = now;
        meta.updated_at = now;

        T::table_mut(self).insert(record.id(), record.clone());
        record
    }

    /// Replace an existing record, keeping its creation time
    pub fn replace<T: TableEntity>(&mut self, mut record: T) -> Result<T> {
        let id = record.id();
        let stored = T::table_mut(self)
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(T::KIND, id))?;

        let meta = record.meta_mut();
        meta.created_at = stored.meta().created_at;
        meta.updated_at = Utc::now();

        *stored = record.clone();
        Ok(record)
    }

    pub fn remove<T: TableEntity>(&mut self, id: RecordId) -> Result<T> {
        T::table_mut(self)
            .remove(&id)
            .ok_or_else(|| Error::not_found(T::KIND, id))
    }

    pub fn get<T: TableEntity>(&self, id: RecordId) -> Option<T> {
        T::table(self).get(&id).cloned()
    }

    /// All records of a kind, ordered by id
    pub fn all<T: TableEntity>(&self) -> Vec<T> {
        T::table(self).values().cloned().collect()
    }

    /// Children pointing at `parent`, ordered by id
    pub fn children<C: ChildEntity + TableEntity>(&self, parent: RecordId) -> Vec<C> {
        C::table(self)
            .values()
            .filter(|child| child.parent_ref() == parent)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_never_reused() {
        let mut tables = Tables::new();
        let a = tables.insert(NetworkInterface::new("a", "em0"));
        let b = tables.insert(NetworkInterface::new("b", "em1"));
        assert_eq!((a.id(), b.id()), (1, 2));

        tables.remove::<NetworkInterface>(b.id()).unwrap();
        let c = tables.insert(NetworkInterface::new("c", "em2"));
        assert_eq!(c.id(), 3);

        // Counters are per kind
        let plan = tables.insert(Plan::new("basic"));
        assert_eq!(plan.id(), 1);
    }

    #[test]
    fn test_replace_keeps_created_at() {
        let mut tables = Tables::new();
        let created = tables.insert(Plan::new("basic"));

        let mut changed = created.clone();
        changed.name = "premium".into();
        changed.meta.created_at = Utc::now() + chrono::Duration::days(1);
        let stored = tables.replace(changed).unwrap();

        assert_eq!(stored.meta.created_at, created.meta.created_at);
        assert!(stored.meta.updated_at >= created.meta.updated_at);
        assert_eq!(tables.get::<Plan>(created.id()).unwrap().name, "premium");
    }

    #[test]
    fn test_missing_records() {
        let mut tables = Tables::new();
        assert!(matches!(
            tables.replace(Queue::default()),
            Err(Error::NotFound { kind: "queue", id: 0 })
        ));
        assert!(matches!(
            tables.remove::<Subscriber>(4),
            Err(Error::NotFound { kind: "subscriber", id: 4 })
        ));
    }

    #[test]
    fn test_children_by_foreign_key() {
        let mut tables = Tables::new();
        let iface = tables.insert(NetworkInterface::new("lan", "em0"));
        tables.insert(IpAssignment::new("192.168.1.10", 24).on_interface(iface.id()));
        tables.insert(IpAssignment::new("10.0.0.1", 8));
        tables.insert(IpAssignment::new("192.168.1.11", 24).on_interface(iface.id()));

        let ips: Vec<IpAssignment> = tables.children(iface.id());
        let addresses: Vec<_> = ips.iter().map(|ip| ip.address.as_str()).collect();
        assert_eq!(addresses, vec!["192.168.1.10", "192.168.1.11"]);
        assert_eq!(tables.len(), 3);
    }
}
