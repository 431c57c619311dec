//! Per-device consumption accounting.
//!
//! [`ConsumedCapacity`] tracks how much of each named capacity is charged
//! against one device; [`ConsumedCapacityCollection`] keys those by device
//! identity. Both are plain owned maps: every entry owns its quantity,
//! nothing aliases the caller's state, and neither type is internally
//! synchronized (the outer allocator owns one collection per transaction
//! attempt).

use std::fmt;

use devra_quantity::Quantity;
use devra_shared::StableMap;

use crate::{CapacityName, DeviceId};

/// Currently consumed quantity per capacity name of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumedCapacity {
    entries: StableMap<CapacityName, Quantity>,
}

impl ConsumedCapacity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consumed quantity for one capacity, replacing any previous
    /// entry. Zero entries are allowed here and only cleaned up by
    /// [`sub`](Self::sub).
    pub fn insert(&mut self, name: CapacityName, quantity: Quantity) {
        self.entries.insert(name, quantity);
    }

    pub fn get(&self, name: &CapacityName) -> Option<&Quantity> {
        self.entries.get(name)
    }

    /// Adds `quantity` onto the entry for `name`, creating it if needed.
    pub fn accumulate(&mut self, name: &CapacityName, quantity: &Quantity) {
        match self.entries.get_mut(name) {
            Some(entry) => *entry = entry.saturating_add(quantity),
            None => {
                self.entries.insert(name.clone(), *quantity);
            }
        }
    }

    /// Adds every entry of `other` onto this map.
    pub fn add(&mut self, other: &ConsumedCapacity) {
        for (name, quantity) in &other.entries {
            self.accumulate(name, quantity);
        }
    }

    /// Subtracts every entry of `other`; names not present here are
    /// ignored. Entries that reach exactly zero are pruned.
    pub fn sub(&mut self, other: &ConsumedCapacity) {
        for (name, quantity) in &other.entries {
            let Some(entry) = self.entries.get_mut(name) else {
                continue;
            };
            *entry = entry.saturating_sub(quantity);
            if entry.is_zero() {
                self.entries.remove(name);
            }
        }
    }

    /// True when every entry is numerically zero (or none exist).
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Quantity::is_zero)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in capacity-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&CapacityName, &Quantity)> {
        self.entries.iter()
    }
}

impl FromIterator<(CapacityName, Quantity)> for ConsumedCapacity {
    fn from_iter<I: IntoIterator<Item = (CapacityName, Quantity)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Consumption of one device, as inserted into or removed from a
/// [`ConsumedCapacityCollection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConsumedCapacity {
    pub device_id: DeviceId,
    pub capacity: ConsumedCapacity,
}

impl DeviceConsumedCapacity {
    pub fn new(device_id: DeviceId, capacity: ConsumedCapacity) -> Self {
        Self {
            device_id,
            capacity,
        }
    }
}

impl fmt::Display for DeviceConsumedCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device_id)
    }
}

/// Consumed capacity per device.
///
/// Invariant: no device key maps to an empty or all-zero
/// [`ConsumedCapacity`]; balanced insert/remove pairs restore the
/// collection exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumedCapacityCollection {
    devices: StableMap<DeviceId, ConsumedCapacity>,
}

impl ConsumedCapacityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<&ConsumedCapacity> {
        self.devices.get(device_id)
    }

    /// Accumulates a device's consumption into the collection.
    ///
    /// The capacity is copied; the caller keeps ownership of its state.
    /// All-zero consumption does not create a device entry.
    pub fn insert(&mut self, allocation: &DeviceConsumedCapacity) {
        if allocation.capacity.is_empty() {
            return;
        }
        match self.devices.get_mut(&allocation.device_id) {
            Some(existing) => existing.add(&allocation.capacity),
            None => {
                self.devices
                    .insert(allocation.device_id.clone(), allocation.capacity.clone());
            }
        }
    }

    /// Subtracts a device's consumption, dropping the device key once its
    /// residual is all zero.
    pub fn remove(&mut self, allocation: &DeviceConsumedCapacity) {
        let Some(existing) = self.devices.get_mut(&allocation.device_id) else {
            return;
        };
        existing.sub(&allocation.capacity);
        if existing.is_empty() {
            self.devices.remove(&allocation.device_id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Devices in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &ConsumedCapacity)> {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn name(s: &str) -> CapacityName {
        CapacityName::from(s)
    }

    fn device() -> DeviceId {
        DeviceId::new("driver-a", "pool-1", "device-1")
    }

    fn one_memory() -> DeviceConsumedCapacity {
        DeviceConsumedCapacity::new(
            device(),
            [(name("memory"), q("1Gi"))].into_iter().collect(),
        )
    }

    #[test]
    fn add_then_sub_returns_to_empty() {
        let mut consumed = ConsumedCapacity::new();
        assert!(consumed.is_empty());

        let delta: ConsumedCapacity = [(name("memory"), q("1Gi"))].into_iter().collect();
        consumed.add(&delta);
        assert!(!consumed.is_empty());
        assert_eq!(consumed.get(&name("memory")), Some(&q("1Gi")));

        consumed.sub(&delta);
        assert!(consumed.is_empty());
        // Zeroed entries are pruned, not kept at zero.
        assert_eq!(consumed.len(), 0);
    }

    #[test]
    fn add_accumulates_per_name() {
        let mut consumed = ConsumedCapacity::new();
        let delta: ConsumedCapacity = [(name("memory"), q("1Gi"))].into_iter().collect();
        consumed.add(&delta);
        consumed.add(&delta);
        assert_eq!(consumed.get(&name("memory")), Some(&q("2Gi")));
    }

    #[test]
    fn sub_ignores_unknown_names() {
        let mut consumed: ConsumedCapacity =
            [(name("memory"), q("1Gi"))].into_iter().collect();
        let other: ConsumedCapacity = [(name("compute"), q("2"))].into_iter().collect();
        consumed.sub(&other);
        assert_eq!(consumed.get(&name("memory")), Some(&q("1Gi")));
        assert_eq!(consumed.len(), 1);
    }

    #[test]
    fn directly_inserted_zero_counts_as_empty() {
        let mut consumed = ConsumedCapacity::new();
        consumed.insert(name("memory"), Quantity::zero());
        assert_eq!(consumed.len(), 1);
        assert!(consumed.is_empty());
    }

    #[test]
    fn collection_insert_accumulates_and_remove_prunes() {
        let mut collection = ConsumedCapacityCollection::new();
        collection.insert(&one_memory());
        collection.insert(&one_memory());

        let consumed = collection.get(&device()).unwrap();
        assert_eq!(consumed.get(&name("memory")), Some(&q("2Gi")));

        collection.remove(&one_memory());
        assert_eq!(
            collection.get(&device()).unwrap().get(&name("memory")),
            Some(&q("1Gi"))
        );

        collection.remove(&one_memory());
        assert!(collection.get(&device()).is_none());
        assert!(collection.is_empty());
    }

    #[test]
    fn collection_insert_copies_the_capacity() {
        let mut collection = ConsumedCapacityCollection::new();
        let mut allocation = one_memory();
        collection.insert(&allocation);

        // Mutating the caller's copy must not reach the collection.
        allocation.capacity.insert(name("memory"), q("9Gi"));
        assert_eq!(
            collection.get(&device()).unwrap().get(&name("memory")),
            Some(&q("1Gi"))
        );
    }

    #[test]
    fn collection_ignores_all_zero_insertions() {
        let mut collection = ConsumedCapacityCollection::new();
        let zero = DeviceConsumedCapacity::new(
            device(),
            [(name("memory"), Quantity::zero())].into_iter().collect(),
        );
        collection.insert(&zero);
        assert!(collection.is_empty());
    }

    #[test]
    fn balanced_insert_remove_is_identity() {
        let mut collection = ConsumedCapacityCollection::new();
        let base = DeviceConsumedCapacity::new(
            device(),
            [(name("memory"), q("4Gi")), (name("compute"), q("2"))]
                .into_iter()
                .collect(),
        );
        collection.insert(&base);
        let snapshot = collection.clone();

        let delta = one_memory();
        collection.insert(&delta);
        collection.remove(&delta);
        assert_eq!(collection, snapshot);
    }

    #[test]
    fn remove_of_unknown_device_is_a_no_op() {
        let mut collection = ConsumedCapacityCollection::new();
        collection.remove(&one_memory());
        assert!(collection.is_empty());
    }
}
