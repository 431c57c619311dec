//! Concurrency-safe generation of unique share identifiers.
//!
//! Tokens are random hex strings whose uniqueness is scoped per device;
//! the composite (device, token) key is unique within one factory. The
//! factory is the only stateful component of this crate: all operations
//! take one internal mutex for their full duration, and nothing inside
//! the guarded region blocks.

use devra_shared::{FastMap, FastSet};
use parking_lot::Mutex;
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::{DeviceId, ShareId, SharedDeviceId};

/// Default token width. Eight random bytes (sixteen hex characters) keep
/// the per-device birthday bound comfortable.
pub const DEFAULT_SHARE_ID_BYTES: usize = 8;

/// Errors from [`ShareIdFactory::generate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShareIdError {
    /// No unused token was found within the allowed attempts. A small
    /// attempt budget makes tight-pool contention observable instead of
    /// looping silently.
    #[error("failed to find an unused share ID within {tries} tries")]
    Exhausted { tries: usize },
    /// The underlying random source failed.
    #[error("failed to generate random bytes: {0}")]
    Rng(String),
}

/// Generator of unique share identifiers, scoped by device.
#[derive(Debug)]
pub struct ShareIdFactory {
    nbytes: usize,
    used: Mutex<FastMap<DeviceId, FastSet<ShareId>>>,
}

impl ShareIdFactory {
    /// A factory producing tokens of `nbytes` random bytes each.
    pub fn new(nbytes: usize) -> Self {
        Self {
            nbytes,
            used: Mutex::new(FastMap::default()),
        }
    }

    /// Draws a new token for `device_id`, retrying on collisions up to
    /// `max_try` attempts in total.
    ///
    /// The returned token is recorded as used; the caller must [`release`]
    /// it when the allocation is rolled back or the share is removed.
    ///
    /// [`release`]: ShareIdFactory::release
    pub fn generate(
        &self,
        device_id: &DeviceId,
        max_try: usize,
    ) -> Result<ShareId, ShareIdError> {
        let mut used = self.used.lock();
        for _ in 0..max_try {
            let mut bytes = vec![0u8; self.nbytes];
            if let Err(error) = OsRng.try_fill_bytes(&mut bytes) {
                tracing::error!(device = %device_id, %error, "failed to generate random share ID bytes");
                return Err(ShareIdError::Rng(error.to_string()));
            }
            let share_id = ShareId::new(hex::encode(bytes));
            if used
                .entry(device_id.clone())
                .or_default()
                .insert(share_id.clone())
            {
                return Ok(share_id);
            }
        }
        tracing::debug!(device = %device_id, tries = max_try, "share ID space exhausted");
        Err(ShareIdError::Exhausted { tries: max_try })
    }

    /// Forgets a token. Unknown tokens and devices are a no-op.
    pub fn release(&self, device_id: &DeviceId, share_id: &ShareId) {
        let mut used = self.used.lock();
        if let Some(tokens) = used.get_mut(device_id) {
            tokens.remove(share_id);
            if tokens.is_empty() {
                used.remove(device_id);
            }
        }
    }

    /// Replaces the used-token set wholesale.
    ///
    /// Used on restart to rehydrate the factory from the outer
    /// allocator's committed view.
    pub fn set_used(&self, ids: impl IntoIterator<Item = SharedDeviceId>) {
        let mut rebuilt: FastMap<DeviceId, FastSet<ShareId>> = FastMap::default();
        for id in ids {
            rebuilt.entry(id.device_id).or_default().insert(id.share_id);
        }
        *self.used.lock() = rebuilt;
    }

    /// Whether the composite key is currently recorded as used.
    pub fn is_used(&self, id: &SharedDeviceId) -> bool {
        self.used
            .lock()
            .get(&id.device_id)
            .is_some_and(|tokens| tokens.contains(&id.share_id))
    }

    /// Total number of recorded composite keys, across all devices.
    pub fn used_len(&self) -> usize {
        self.used.lock().values().map(FastSet::len).sum()
    }
}

impl Default for ShareIdFactory {
    fn default() -> Self {
        Self::new(DEFAULT_SHARE_ID_BYTES)
    }
}
