//! Snapshot of everything already allocated, as exchanged with the outer
//! search.

use devra_shared::{FastSet, StableSet};

use crate::consumed::ConsumedCapacityCollection;
use crate::{DeviceId, SharedDeviceId};

/// Aggregate of allocation results gathered from committed claims.
///
/// The outer search hands a snapshot to the core and applies the computed
/// deltas itself on commit; the core never mutates this directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatedState {
    /// Devices consumed in full by an exclusive allocation.
    pub allocated_devices: StableSet<DeviceId>,
    /// Shares handed out on multi-allocatable devices.
    pub allocated_shares: FastSet<SharedDeviceId>,
    /// Consumed capacity aggregated per device.
    pub aggregated_capacity: ConsumedCapacityCollection,
}

impl AllocatedState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShareId;

    #[test]
    fn snapshots_are_independent() {
        let mut state = AllocatedState::new();
        let device = DeviceId::new("driver-a", "pool-1", "device-1");
        state.allocated_devices.insert(device.clone());
        state
            .allocated_shares
            .insert(SharedDeviceId::new(device.clone(), ShareId::new("deadbeef")));

        let snapshot = state.clone();
        state.allocated_devices.clear();
        state.allocated_shares.clear();

        assert_eq!(snapshot.allocated_devices.len(), 1);
        assert_eq!(snapshot.allocated_shares.len(), 1);
        assert!(snapshot.allocated_devices.contains(&device));
    }
}
