//! Fit checking: does a capacity request still fit on a device?
//!
//! Pure with respect to its inputs; the outer search calls this once per
//! candidate (request, device) pair and commits or backtracks the result
//! itself. Capacities are examined in sorted-name order, so equal inputs
//! always produce the same decision even when the first failing capacity
//! cuts the scan short.

use crate::{
    CapacityRequest, ConsumedCapacity, DeviceCapacities, FitError,
};

/// Outcome of a fit check. Not fitting is a normal negative result, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FitDecision {
    /// The request fits; the payload is the exact quantity charged per
    /// capacity name.
    Fit(ConsumedCapacity),
    NoFit,
}

impl FitDecision {
    pub fn is_fit(&self) -> bool {
        matches!(self, FitDecision::Fit(_))
    }
}

/// Decides whether `request` fits on a device next to its already
/// `committed` consumption and the `in_flight` delta of the current
/// search branch.
///
/// For every shareable capacity the charged quantity is the policy
/// normalization of the request (at least the default, even when the
/// request does not name the capacity). Non-shareable capacities consume
/// the whole device when requested: the request must not exceed the
/// nominal value, and on a device that allows multiple allocations such a
/// request is a configuration error, because exclusivity cannot be
/// guaranteed there.
///
/// Inputs are never mutated.
pub fn check_fit(
    committed: &ConsumedCapacity,
    in_flight: &ConsumedCapacity,
    request: &CapacityRequest,
    capacities: &DeviceCapacities,
    allow_multiple_allocations: bool,
) -> Result<FitDecision, FitError> {
    for name in request.requests.keys() {
        if !capacities.contains_key(name) {
            return Err(FitError::UnknownCapacity(name.clone()));
        }
    }

    let mut candidate = committed.clone();
    let mut consumed = ConsumedCapacity::new();
    for (name, capacity) in capacities {
        let requested = request.get(name);
        let Some(policy) = &capacity.policy else {
            if let Some(requested) = requested {
                if requested > &capacity.value {
                    return Ok(FitDecision::NoFit);
                }
                if allow_multiple_allocations {
                    return Err(FitError::NoGuarantee(name.clone()));
                }
                consumed.insert(name.clone(), capacity.value);
            }
            continue;
        };

        let charged = policy.normalize(requested);
        if policy.violates(&charged) {
            return Ok(FitDecision::NoFit);
        }
        candidate.accumulate(name, &charged);
        if let Some(pending) = in_flight.get(name) {
            candidate.accumulate(name, pending);
        }
        if candidate.get(name).is_some_and(|total| total > &capacity.value) {
            return Ok(FitDecision::NoFit);
        }
        consumed.insert(name.clone(), charged);
    }
    Ok(FitDecision::Fit(consumed))
}

/// The quantity each shareable capacity would charge for `request`,
/// without checking fit.
///
/// Used by the outer allocator to build the consumption it commits after
/// a successful check.
pub fn consumed_from_request(
    request: &CapacityRequest,
    capacities: &DeviceCapacities,
) -> ConsumedCapacity {
    let mut consumed = ConsumedCapacity::new();
    for (name, capacity) in capacities {
        if let Some(policy) = &capacity.policy {
            consumed.insert(name.clone(), policy.normalize(request.get(name)));
        }
    }
    consumed
}
