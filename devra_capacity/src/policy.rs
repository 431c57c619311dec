//! Sharing-policy algebra.
//!
//! A policy constrains the values a claim may request for one shareable
//! capacity. Two runtime predicates matter:
//!
//! - [`SharingPolicy::normalize`] turns a raw request into the quantity
//!   actually charged (default when absent, floored at the minimum,
//!   rounded up to the step grid),
//! - [`SharingPolicy::violates`] rejects values above a declared ceiling
//!   or off the step grid.
//!
//! The split means a request below the minimum is quietly rounded up and
//! charged, while a request above the maximum is rejected: minimum and
//! default are floors the hardware imposes, the maximum is a ceiling the
//! operator imposes.

use devra_quantity::{Format, Quantity};
use serde::{Deserialize, Serialize};

use crate::DeviceCapacity;
use crate::validate::{CapacityValidationError, validate_device_capacity};

/// Constraint on admissible request values for one shareable capacity.
///
/// Exactly one variant; a capacity without any policy is represented as
/// `Option::<SharingPolicy>::None` on [`DeviceCapacity`] and consumes the
/// whole device when requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingPolicy {
    /// A contiguous range, optionally stepped and capped.
    Range(RangePolicy),
    /// A discrete set of admissible values.
    Values(ValuesPolicy),
}

/// Admissible values are `min + n*step` for `n >= 0`, at most `max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePolicy {
    /// Smallest share the hardware can carve out.
    pub min: Quantity,
    /// Operator-imposed ceiling. Absent means only the device value caps
    /// the share.
    pub max: Option<Quantity>,
    /// Allocation granularity above `min`. Absent means any value in the
    /// range is admissible.
    pub step: Option<Quantity>,
    /// Charged when the claim does not name this capacity.
    pub default: Quantity,
}

/// Admissible values are exactly `options`; strictly ascending, no
/// numeric duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesPolicy {
    pub options: Vec<Quantity>,
    /// Charged when the claim does not name this capacity. Always one of
    /// `options`.
    pub default: Quantity,
}

impl SharingPolicy {
    /// The quantity charged when the claim does not name the capacity.
    pub fn default_value(&self) -> &Quantity {
        match self {
            SharingPolicy::Range(range) => &range.default,
            SharingPolicy::Values(values) => &values.default,
        }
    }

    /// The quantity actually charged for a raw request.
    ///
    /// Absent requests charge the default. Range requests below the
    /// minimum are floored to it; with a step, the result is the smallest
    /// grid point at or above the request, tagged binary-SI. Discrete-set
    /// requests pass through unchanged and are left to [`violates`].
    ///
    /// Idempotent: normalizing a normalized value is a no-op.
    ///
    /// [`violates`]: SharingPolicy::violates
    pub fn normalize(&self, requested: Option<&Quantity>) -> Quantity {
        match self {
            SharingPolicy::Range(range) => {
                let Some(requested) = requested else {
                    return range.default;
                };
                if *requested < range.min {
                    return range.min;
                }
                if let Some(step) = &range.step
                    && !step.is_zero()
                    && !step.is_negative()
                {
                    return round_up_to_grid(requested, &range.min, step);
                }
                *requested
            }
            SharingPolicy::Values(values) => *requested.unwrap_or(&values.default),
        }
    }

    /// Whether a normalized value is inadmissible under this policy.
    ///
    /// The declared default is always admissible; the validator guarantees
    /// it lies inside its own policy, which keeps this short-circuit
    /// sound.
    pub fn violates(&self, value: &Quantity) -> bool {
        if value == self.default_value() {
            return false;
        }
        match self {
            SharingPolicy::Range(range) => {
                if let Some(max) = &range.max
                    && value > max
                {
                    return true;
                }
                if let Some(step) = &range.step
                    && !step.is_zero()
                    && !step.is_negative()
                {
                    return !on_grid(value, &range.min, step);
                }
                false
            }
            SharingPolicy::Values(values) => !values.options.contains(value),
        }
    }
}

/// Smallest `min + n*step` at or above `requested`, for `requested >= min`.
///
/// Computed on exact nano units; the result is tagged binary-SI like the
/// capacity grids it is meant for.
fn round_up_to_grid(requested: &Quantity, min: &Quantity, step: &Quantity) -> Quantity {
    let above_min = requested.saturating_sub(min);
    let Some((chunks, remainder)) = above_min.div_rem(step) else {
        return *requested;
    };
    let chunks = if remainder.is_zero() { chunks } else { chunks + 1 };
    step.checked_mul(chunks)
        .and_then(|stepped| min.checked_add(&stepped))
        .map(|q| q.with_format(Format::BinarySI))
        .unwrap_or(*requested)
}

/// Whether `value` sits exactly on the grid `min + n*step`.
pub(crate) fn on_grid(value: &Quantity, min: &Quantity, step: &Quantity) -> bool {
    value
        .saturating_sub(min)
        .div_rem(step)
        .is_some_and(|(_, remainder)| remainder.is_zero())
}

/// Wire-shape declaration of a device capacity: the nominal value plus an
/// optional sharing-policy declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapacityDecl {
    pub value: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing_policy: Option<SharingPolicyDecl>,
}

/// Wire-shape declaration of a sharing policy.
///
/// The wire format carries two optional sub-structs; exactly one must be
/// populated. [`SharingPolicyDecl::resolve`] rejects the other shapes
/// instead of letting them reach the runtime predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingPolicyDecl {
    pub default: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<Quantity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<RangeDecl>,
}

/// Wire-shape declaration of a range policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeDecl {
    pub min: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Quantity>,
}

impl SharingPolicyDecl {
    /// Converts the declaration into the policy sum type.
    ///
    /// Fails with [`CapacityValidationError::Conflict`] unless exactly one
    /// of `valid_values` and `valid_range` is populated.
    pub fn resolve(&self) -> Result<SharingPolicy, CapacityValidationError> {
        match (&self.valid_values, &self.valid_range) {
            (Some(_), Some(_)) | (None, None) => Err(CapacityValidationError::Conflict),
            (Some(options), None) => Ok(SharingPolicy::Values(ValuesPolicy {
                options: options.clone(),
                default: self.default,
            })),
            (None, Some(range)) => Ok(SharingPolicy::Range(RangePolicy {
                min: range.min,
                max: range.max,
                step: range.step,
                default: self.default,
            })),
        }
    }
}

impl DeviceCapacityDecl {
    /// Validates the declaration and converts it into the runtime shape.
    ///
    /// All structural problems are reported at once, never just the first.
    pub fn resolve(&self) -> Result<DeviceCapacity, Vec<CapacityValidationError>> {
        let errors = validate_device_capacity(self);
        if !errors.is_empty() {
            return Err(errors);
        }
        let policy = self
            .sharing_policy
            .as_ref()
            .map(|decl| decl.resolve())
            .transpose()
            .map_err(|error| vec![error])?;
        Ok(DeviceCapacity {
            value: self.value,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn range(min: &str, max: Option<&str>, step: Option<&str>, default: &str) -> SharingPolicy {
        SharingPolicy::Range(RangePolicy {
            min: q(min),
            max: max.map(q),
            step: step.map(q),
            default: q(default),
        })
    }

    fn values(options: &[&str], default: &str) -> SharingPolicy {
        SharingPolicy::Values(ValuesPolicy {
            options: options.iter().map(|s| q(s)).collect(),
            default: q(default),
        })
    }

    #[test]
    fn normalize_absent_charges_default() {
        assert_eq!(range("1Gi", None, None, "2Gi").normalize(None), q("2Gi"));
        assert_eq!(values(&["1Gi", "10Gi"], "1Gi").normalize(None), q("1Gi"));
    }

    #[test]
    fn normalize_floors_at_minimum() {
        let policy = range("2Gi", None, None, "2Gi");
        assert_eq!(policy.normalize(Some(&q("1Gi"))), q("2Gi"));
        assert_eq!(policy.normalize(Some(&q("500Mi"))), q("2Gi"));
        assert_eq!(policy.normalize(Some(&q("3Gi"))), q("3Gi"));
    }

    #[test]
    fn normalize_rounds_up_to_step_grid() {
        let policy = range("1Gi", Some("10Gi"), Some("2Gi"), "1Gi");
        // One chunk above min: ceil((2-1)/2) = 1 -> 1 + 2.
        assert_eq!(policy.normalize(Some(&q("2Gi"))), q("3Gi"));
        // Exactly on the grid stays put: ceil((5-1)/2) = 2 -> 1 + 4.
        assert_eq!(policy.normalize(Some(&q("5Gi"))), q("5Gi"));
        assert_eq!(policy.normalize(Some(&q("1Gi"))), q("1Gi"));
        assert_eq!(
            policy.normalize(Some(&q("2Gi"))).format(),
            Format::BinarySI
        );
    }

    #[test]
    fn normalize_values_passes_requests_through() {
        let policy = values(&["1Gi", "10Gi"], "1Gi");
        // Not in the set; violates() is responsible for rejecting it.
        assert_eq!(policy.normalize(Some(&q("2Gi"))), q("2Gi"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let policies = [
            range("1Gi", Some("10Gi"), Some("2Gi"), "1Gi"),
            range("2Gi", None, None, "2Gi"),
            values(&["1Gi", "10Gi"], "1Gi"),
        ];
        let samples = ["500Mi", "1Gi", "2Gi", "3500Mi", "10Gi"];
        for policy in &policies {
            for sample in samples {
                let once = policy.normalize(Some(&q(sample)));
                assert_eq!(policy.normalize(Some(&once)), once, "{policy:?} {sample}");
            }
        }
    }

    #[test]
    fn violates_range_ceiling_and_grid() {
        let capped = range("1Gi", Some("1Gi"), None, "1Gi");
        assert!(capped.violates(&q("2Gi")));
        let roomy = range("1Gi", Some("2Gi"), None, "1Gi");
        assert!(!roomy.violates(&q("1Gi")));

        let stepped = range("1Gi", Some("10Gi"), Some("2Gi"), "1Gi");
        assert!(!stepped.violates(&q("5Gi")));
        assert!(stepped.violates(&q("4Gi")));
        assert!(stepped.violates(&q("11Gi")));
    }

    #[test]
    fn non_positive_step_behaves_as_absent() {
        // The validator rejects these declarations; directly constructed
        // policies must still never divide by a non-positive step.
        for step in ["0", "-2Gi"] {
            let policy = range("1Gi", Some("10Gi"), Some(step), "1Gi");
            assert_eq!(policy.normalize(Some(&q("3500Mi"))), q("3500Mi"));
            assert!(!policy.violates(&q("3500Mi")));
        }
    }

    #[test]
    fn violates_discrete_set_membership() {
        let policy = values(&["1Gi"], "1Gi");
        assert!(!policy.violates(&q("1Gi")));
        assert!(policy.violates(&q("2Gi")));
        // Numeric equality, not textual: 1024Mi is the 1Gi option.
        assert!(!policy.violates(&q("1024Mi")));
    }

    #[test]
    fn violates_always_accepts_default() {
        let policies = [
            range("1Gi", Some("10Gi"), Some("2Gi"), "1Gi"),
            values(&["1Gi", "10Gi"], "10Gi"),
        ];
        for policy in &policies {
            assert!(!policy.violates(policy.default_value()));
        }
    }

    #[test]
    fn grid_closure_under_normalize() {
        let min = q("1Gi");
        let step = q("2Gi");
        let policy = range("1Gi", None, Some("2Gi"), "1Gi");
        for sample in ["1Gi", "1025Mi", "2Gi", "3Gi", "7.3Gi", "9Gi"] {
            let normalized = policy.normalize(Some(&q(sample)));
            assert!(on_grid(&normalized, &min, &step), "{sample} -> {normalized}");
        }
    }

    #[test]
    fn decl_resolution_requires_exactly_one_variant() {
        let both = SharingPolicyDecl {
            default: q("1Gi"),
            valid_values: Some(vec![q("1Gi")]),
            valid_range: Some(RangeDecl {
                min: q("1Gi"),
                max: None,
                step: None,
            }),
        };
        assert_eq!(both.resolve(), Err(CapacityValidationError::Conflict));

        let neither = SharingPolicyDecl {
            default: q("1Gi"),
            valid_values: None,
            valid_range: None,
        };
        assert_eq!(neither.resolve(), Err(CapacityValidationError::Conflict));

        let one = SharingPolicyDecl {
            default: q("1Gi"),
            valid_values: Some(vec![q("1Gi")]),
            valid_range: None,
        };
        assert!(matches!(one.resolve(), Ok(SharingPolicy::Values(_))));
    }

    #[test]
    fn decl_round_trips_through_serde() {
        let decl = DeviceCapacityDecl {
            value: q("10Gi"),
            sharing_policy: Some(SharingPolicyDecl {
                default: q("1Gi"),
                valid_values: None,
                valid_range: Some(RangeDecl {
                    min: q("1Gi"),
                    max: Some(q("10Gi")),
                    step: Some(q("1Gi")),
                }),
            }),
        };
        let json = serde_json::to_string(&decl).unwrap();
        assert!(json.contains("\"validRange\""));
        assert!(json.contains("\"min\":\"1Gi\""));
        let back: DeviceCapacityDecl = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decl);
    }
}
