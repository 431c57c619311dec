//! Consumable-capacity accounting for a cluster-wide device allocator.
//!
//! Devices expose named capacities, some of which are shareable under a
//! declared [`SharingPolicy`]. This crate answers, for every candidate
//! (request, device) pair the outer allocation search considers:
//!
//! - does the request still fit next to the committed and in-flight
//!   consumption of the device ([`fit::check_fit`]),
//! - what exact quantity does it consume after policy normalization
//!   (defaults, minimum floors, step rounding),
//! - which unique identifier labels a newly created share
//!   ([`share_id::ShareIdFactory`]).
//!
//! Everything except the share-ID factory is pure: no process-wide state,
//! freely callable from any thread. The outer search owns commit and
//! rollback of the results.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub mod consumed;
pub mod fit;
pub mod policy;
pub mod share_id;
pub mod state;
pub mod validate;

pub use devra_quantity::{Format, ParseQuantityError, Quantity};
pub use devra_shared::StableMap;

pub use consumed::{ConsumedCapacity, ConsumedCapacityCollection, DeviceConsumedCapacity};
pub use fit::{FitDecision, check_fit, consumed_from_request};
pub use policy::{
    DeviceCapacityDecl, RangeDecl, RangePolicy, SharingPolicy, SharingPolicyDecl, ValuesPolicy,
};
pub use share_id::{DEFAULT_SHARE_ID_BYTES, ShareIdError, ShareIdFactory};
pub use state::AllocatedState;
pub use validate::{CapacityValidationError, validate_device_capacity};

/// Qualified name of one capacity within a device. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapacityName(SmolStr);

impl CapacityName {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CapacityName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for CapacityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one physical device: which driver publishes it, in which
/// pool, under which name.
///
/// Totally ordered by (driver, pool, device), so device-keyed maps iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub driver: SmolStr,
    pub pool: SmolStr,
    pub device: SmolStr,
}

impl DeviceId {
    pub fn new(
        driver: impl Into<SmolStr>,
        pool: impl Into<SmolStr>,
        device: impl Into<SmolStr>,
    ) -> Self {
        Self {
            driver: driver.into(),
            pool: pool.into(),
            device: device.into(),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.driver, self.pool, self.device)
    }
}

/// Opaque token distinguishing concurrent shares of one device.
///
/// Lowercase hex, two characters per random byte. Only the composite
/// [`SharedDeviceId`] is unique; the token alone carries no identity and
/// encodes nothing about the device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareId(SmolStr);

impl ShareId {
    pub fn new(token: impl Into<SmolStr>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique identity of one share: device plus share token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SharedDeviceId {
    pub device_id: DeviceId,
    pub share_id: ShareId,
}

impl SharedDeviceId {
    pub fn new(device_id: DeviceId, share_id: ShareId) -> Self {
        Self {
            device_id,
            share_id,
        }
    }
}

impl fmt::Display for SharedDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.share_id)
    }
}

/// Device name used when reporting the allocation status of a share:
/// the device name plus the first eight hex characters of the share token.
pub fn shared_device_name(device: &str, share_id: &ShareId) -> String {
    let token = share_id.as_str();
    format!("{device}-{}", token.get(..8).unwrap_or(token))
}

/// Declared capacity of a device for one capacity name.
///
/// `policy` absent means the capacity is not shareable: any request for it
/// consumes the whole device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapacity {
    /// Nominal total of the device for this capacity.
    pub value: Quantity,
    /// How the capacity may be shared, if at all.
    pub policy: Option<SharingPolicy>,
}

/// Declared capacities of one device, keyed by capacity name.
///
/// Sorted iteration keeps fit decisions and error reporting deterministic.
pub type DeviceCapacities = StableMap<CapacityName, DeviceCapacity>;

/// Minimum quantities a claim asks for, per capacity name.
///
/// A name that is absent means "accept the policy default if the capacity
/// is shareable, nothing otherwise".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapacityRequest {
    pub requests: StableMap<CapacityName, Quantity>,
}

impl CapacityRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one requested capacity, builder style.
    pub fn with(mut self, name: impl Into<CapacityName>, quantity: Quantity) -> Self {
        self.requests.insert(name.into(), quantity);
        self
    }

    pub fn get(&self, name: &CapacityName) -> Option<&Quantity> {
        self.requests.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Errors from [`fit::check_fit`].
///
/// These indicate caller or configuration bugs; an ordinary "does not fit"
/// is the [`FitDecision::NoFit`] result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    /// The request references a capacity the device does not declare.
    #[error("requested capacity {0} has not been defined by the device")]
    UnknownCapacity(CapacityName),
    /// A capacity without a sharing policy was requested on a device that
    /// allows multiple allocations; exclusive consumption cannot be
    /// guaranteed there.
    #[error("capacity {0} has no sharing policy and cannot be guaranteed on a multi-allocatable device")]
    NoGuarantee(CapacityName),
}
