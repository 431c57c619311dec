//! Structural validation of device-capacity declarations.
//!
//! Runs once per declaration, before the policy reaches the runtime
//! predicates. Every problem is accumulated and reported; nothing
//! short-circuits, so an operator sees the whole list at once.
//!
//! The checks here and the runtime behavior in [`crate::policy`] must
//! agree: in particular the declared default must itself be admissible,
//! because [`SharingPolicy::violates`](crate::SharingPolicy::violates)
//! fast-accepts it without re-checking.

use std::cmp::Ordering;

use devra_quantity::Quantity;

use crate::policy::{DeviceCapacityDecl, RangeDecl, on_grid};

/// One structural problem in a device-capacity declaration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityValidationError {
    #[error("exactly one of validValues or validRange may be set")]
    Conflict,
    #[error("at least one option is required")]
    NoOptions,
    #[error("duplicate option at index {index}: {value}")]
    Duplicate { index: usize, value: String },
    #[error("values must be sorted in ascending order (index {index}: {value})")]
    Unsorted { index: usize, value: String },
    #[error("option is larger than capacity value: {capacity}")]
    OptionOverCapacity {
        index: usize,
        option: Quantity,
        capacity: Quantity,
    },
    #[error("default value is not valid according to the policy")]
    DefaultNotAnOption { default: Quantity },
    #[error("minimum is larger than capacity value: {capacity}")]
    MinOverCapacity { min: Quantity, capacity: Quantity },
    #[error("minimum is larger than maximum: {max}")]
    MinOverMax { min: Quantity, max: Quantity },
    #[error("maximum is larger than capacity value: {capacity}")]
    MaxOverCapacity { max: Quantity, capacity: Quantity },
    #[error("default is less than minimum: {min}")]
    DefaultUnderMin { default: Quantity, min: Quantity },
    #[error("default is more than maximum: {max}")]
    DefaultOverMax { default: Quantity, max: Quantity },
    #[error("step must be a positive quantity")]
    NonPositiveStep { step: Quantity },
    #[error("one step {one_step} is larger than capacity value: {capacity}")]
    StepOverCapacity {
        one_step: Quantity,
        capacity: Quantity,
    },
    #[error("value {value} is not a multiple of a given step ({step}) from ({min})")]
    OffStep {
        value: Quantity,
        step: Quantity,
        min: Quantity,
    },
}

/// Checks a declaration against the nominal capacity value.
///
/// Returns every problem found; an empty list means the declaration is
/// sound and [`DeviceCapacityDecl::resolve`] will succeed.
pub fn validate_device_capacity(decl: &DeviceCapacityDecl) -> Vec<CapacityValidationError> {
    let mut errors = Vec::new();
    let Some(policy) = &decl.sharing_policy else {
        return errors;
    };
    match (&policy.valid_values, &policy.valid_range) {
        (Some(_), Some(_)) | (None, None) => {
            errors.push(CapacityValidationError::Conflict);
        }
        (Some(options), None) => {
            validate_options(options, &policy.default, &decl.value, &mut errors);
        }
        (None, Some(range)) => {
            validate_range(range, &policy.default, &decl.value, &mut errors);
        }
    }
    errors
}

fn validate_options(
    options: &[Quantity],
    default: &Quantity,
    capacity: &Quantity,
    errors: &mut Vec<CapacityValidationError>,
) {
    if options.is_empty() {
        errors.push(CapacityValidationError::NoOptions);
    }
    let mut previous: Option<&Quantity> = None;
    for (index, option) in options.iter().enumerate() {
        if option > capacity {
            errors.push(CapacityValidationError::OptionOverCapacity {
                index,
                option: *option,
                capacity: *capacity,
            });
        }
        if let Some(previous) = previous {
            // Numeric comparison: "1Ki" and "1024" collide, and are
            // reported with the canonical decimal rendering.
            match option.cmp(previous) {
                Ordering::Equal => errors.push(CapacityValidationError::Duplicate {
                    index,
                    value: option.canonical_string(),
                }),
                Ordering::Less => errors.push(CapacityValidationError::Unsorted {
                    index,
                    value: option.canonical_string(),
                }),
                Ordering::Greater => {}
            }
        }
        previous = Some(option);
    }
    if !options.iter().any(|option| option == default) {
        errors.push(CapacityValidationError::DefaultNotAnOption { default: *default });
    }
}

fn validate_range(
    range: &RangeDecl,
    default: &Quantity,
    capacity: &Quantity,
    errors: &mut Vec<CapacityValidationError>,
) {
    let min = &range.min;
    if min > capacity {
        errors.push(CapacityValidationError::MinOverCapacity {
            min: *min,
            capacity: *capacity,
        });
    }
    if let Some(max) = &range.max {
        if min > max {
            errors.push(CapacityValidationError::MinOverMax {
                min: *min,
                max: *max,
            });
        }
        if max > capacity {
            errors.push(CapacityValidationError::MaxOverCapacity {
                max: *max,
                capacity: *capacity,
            });
        }
        if default > max {
            errors.push(CapacityValidationError::DefaultOverMax {
                default: *default,
                max: *max,
            });
        }
    }
    if default < min {
        errors.push(CapacityValidationError::DefaultUnderMin {
            default: *default,
            min: *min,
        });
    }
    let Some(step) = &range.step else {
        return;
    };
    if step.is_zero() || step.is_negative() {
        errors.push(CapacityValidationError::NonPositiveStep { step: *step });
        return;
    }
    match &range.max {
        None => {
            // Without a ceiling, at least one full chunk above the
            // minimum must fit into the device.
            let one_step = min.saturating_add(step);
            if one_step > *capacity {
                errors.push(CapacityValidationError::StepOverCapacity {
                    one_step,
                    capacity: *capacity,
                });
            }
        }
        Some(max) => {
            if max >= min && !on_grid(max, min, step) {
                errors.push(CapacityValidationError::OffStep {
                    value: *max,
                    step: *step,
                    min: *min,
                });
            }
        }
    }
    if default >= min && !on_grid(default, min, step) {
        errors.push(CapacityValidationError::OffStep {
            value: *default,
            step: *step,
            min: *min,
        });
    }
}
