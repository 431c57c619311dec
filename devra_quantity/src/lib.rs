//! Exact resource-quantity arithmetic.
//!
//! A [`Quantity`] is a signed decimal number with an optional SI
//! (`n u m k M G T P E`), binary-SI (`Ki Mi Gi Ti Pi Ei`) or decimal
//! exponent (`e3`) suffix, as accepted by the Kubernetes resource-quantity
//! grammar. Values are held as an `i128` count of nano base units, so
//! comparison, addition, subtraction and divmod are exact over the whole
//! representable domain. The suffix family of the input is preserved and
//! drives formatting; it never affects equality or ordering.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Nano base units per base unit.
const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// The suffix family a quantity was expressed in.
///
/// Presentation only: two quantities with equal numeric value but
/// different formats are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei` (powers of 1024).
    BinarySI,
    /// `n`, `u`, `m`, bare numbers, `k`, `M`, `G`, `T`, `P`, `E`
    /// (powers of 1000).
    #[default]
    DecimalSI,
    /// `e` / `E` followed by a signed decimal exponent.
    DecimalExponent,
}

/// A signed quantity with exact arithmetic and a preserved suffix family.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    nanos: i128,
    format: Format,
}

/// Errors from parsing the resource-quantity grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseQuantityError {
    #[error("empty input")]
    EmptyInput,
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
    #[error("unknown suffix: {0:?}")]
    UnknownSuffix(String),
    #[error("quantity out of range: {0:?}")]
    OutOfRange(String),
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ei", 60),
    ("Pi", 50),
    ("Ti", 40),
    ("Gi", 30),
    ("Mi", 20),
    ("Ki", 10),
];

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
    ("m", -3),
    ("u", -6),
    ("n", -9),
];

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// Scales a non-negative magnitude by `10^exp10`, rounding any fractional
/// remainder away from zero.
fn scale_magnitude(magnitude: i128, exp10: i32) -> Option<i128> {
    if exp10 >= 0 {
        pow10(exp10 as u32).and_then(|p| magnitude.checked_mul(p))
    } else if (-exp10) as u32 > 38 {
        // The divisor exceeds any i128 magnitude; everything but zero
        // rounds up to a single nano unit.
        Some(if magnitude == 0 { 0 } else { 1 })
    } else {
        let p = pow10((-exp10) as u32)?;
        let rounded = magnitude / p + if magnitude % p != 0 { 1 } else { 0 };
        Some(rounded)
    }
}

impl Quantity {
    /// A zero quantity in decimal-SI format.
    pub const fn zero() -> Self {
        Self {
            nanos: 0,
            format: Format::DecimalSI,
        }
    }

    /// Builds a quantity from whole base units.
    pub fn new(units: i64, format: Format) -> Self {
        Self {
            nanos: units as i128 * NANOS_PER_UNIT,
            format,
        }
    }

    /// Builds a quantity from nano base units.
    pub fn from_nanos(nanos: i128, format: Format) -> Self {
        Self { nanos, format }
    }

    /// The exact value in nano base units.
    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    /// The suffix family this quantity renders with.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the same value tagged with another suffix family.
    pub fn with_format(&self, format: Format) -> Self {
        Self {
            nanos: self.nanos,
            format,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    /// Whole base units, truncated toward zero and clamped to `i64`.
    pub fn as_i64(&self) -> i64 {
        let units = self.nanos / NANOS_PER_UNIT;
        units.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Exact sum. `None` on i128 overflow.
    ///
    /// The result keeps `self`'s format unless `self` is zero, in which
    /// case it adopts `other`'s.
    pub fn checked_add(&self, other: &Quantity) -> Option<Quantity> {
        Some(Quantity {
            nanos: self.nanos.checked_add(other.nanos)?,
            format: self.result_format(other),
        })
    }

    /// Exact difference. `None` on i128 overflow.
    pub fn checked_sub(&self, other: &Quantity) -> Option<Quantity> {
        Some(Quantity {
            nanos: self.nanos.checked_sub(other.nanos)?,
            format: self.result_format(other),
        })
    }

    /// Exact product with an integer factor. `None` on i128 overflow.
    pub fn checked_mul(&self, factor: i128) -> Option<Quantity> {
        Some(Quantity {
            nanos: self.nanos.checked_mul(factor)?,
            format: self.format,
        })
    }

    /// Sum that rails at the i128 bounds instead of failing.
    ///
    /// A railed value still compares greater (or smaller) than every
    /// parseable quantity, so accumulation against a ceiling fails closed.
    pub fn saturating_add(&self, other: &Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_add(other.nanos),
            format: self.result_format(other),
        }
    }

    /// Difference that rails at the i128 bounds instead of failing.
    pub fn saturating_sub(&self, other: &Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_sub(other.nanos),
            format: self.result_format(other),
        }
    }

    /// Truncating division by another quantity, with remainder.
    ///
    /// `None` when `divisor` is zero.
    pub fn div_rem(&self, divisor: &Quantity) -> Option<(i128, Quantity)> {
        if divisor.nanos == 0 {
            return None;
        }
        let n = self.nanos / divisor.nanos;
        let rem = self.nanos % divisor.nanos;
        Some((
            n,
            Quantity {
                nanos: rem,
                format: self.format,
            },
        ))
    }

    /// Plain decimal rendering in base units, fraction trimmed:
    /// `1Ki` becomes `"1024"`, `1500m` becomes `"1.5"`.
    ///
    /// This is the strict textual form used for duplicate detection; equal
    /// canonical strings imply numeric equality and vice versa.
    pub fn canonical_string(&self) -> String {
        let sign = if self.nanos < 0 { "-" } else { "" };
        let magnitude = self.nanos.unsigned_abs();
        let units = magnitude / NANOS_PER_UNIT as u128;
        let frac = magnitude % NANOS_PER_UNIT as u128;
        if frac == 0 {
            format!("{sign}{units}")
        } else {
            let digits = format!("{frac:09}");
            format!("{sign}{units}.{}", digits.trim_end_matches('0'))
        }
    }

    fn result_format(&self, other: &Quantity) -> Format {
        if self.nanos == 0 {
            other.format
        } else {
            self.format
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl FromStr for Quantity {
    type Err = ParseQuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseQuantityError::EmptyInput);
        }

        let (negative, rest) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_digit() || *b == b'.')
            .count();
        let (number, suffix) = rest.split_at(number_len);

        let mut parts = number.splitn(3, '.');
        let int_digits = parts.next().unwrap_or("");
        let frac_digits = parts.next().unwrap_or("");
        if parts.next().is_some() || int_digits.len() + frac_digits.len() == 0 {
            return Err(ParseQuantityError::InvalidNumber(number.to_string()));
        }

        let mut magnitude: i128 = 0;
        for b in int_digits.bytes().chain(frac_digits.bytes()) {
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add((b - b'0') as i128))
                .ok_or_else(|| ParseQuantityError::OutOfRange(s.to_string()))?;
        }
        let frac_len = frac_digits.len() as i32;

        let out_of_range = || ParseQuantityError::OutOfRange(s.to_string());

        let (nanos, format) = if suffix.is_empty() {
            let nanos =
                scale_magnitude(magnitude, 9 - frac_len).ok_or_else(out_of_range)?;
            (nanos, Format::DecimalSI)
        } else if let Some((_, shift)) =
            BINARY_SUFFIXES.iter().find(|(name, _)| *name == suffix)
        {
            let scaled = magnitude
                .checked_mul(1i128 << shift)
                .ok_or_else(out_of_range)?;
            let nanos = scale_magnitude(scaled, 9 - frac_len).ok_or_else(out_of_range)?;
            (nanos, Format::BinarySI)
        } else if let Some((_, exp)) =
            DECIMAL_SUFFIXES.iter().find(|(name, _)| *name == suffix)
        {
            let nanos =
                scale_magnitude(magnitude, 9 + exp - frac_len).ok_or_else(out_of_range)?;
            (nanos, Format::DecimalSI)
        } else if suffix.starts_with('e') || suffix.starts_with('E') {
            let exp: i32 = suffix[1..]
                .parse()
                .map_err(|_| ParseQuantityError::UnknownSuffix(suffix.to_string()))?;
            if exp.abs() > 40 {
                return Err(out_of_range());
            }
            let nanos =
                scale_magnitude(magnitude, 9 + exp - frac_len).ok_or_else(out_of_range)?;
            (nanos, Format::DecimalExponent)
        } else {
            return Err(ParseQuantityError::UnknownSuffix(suffix.to_string()));
        };

        Ok(Quantity {
            nanos: if negative { -nanos } else { nanos },
            format,
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }
        let sign = if self.nanos < 0 { "-" } else { "" };
        let magnitude = self.nanos.unsigned_abs();
        let nanos_per_unit = NANOS_PER_UNIT as u128;

        if magnitude % nanos_per_unit == 0 {
            let base = magnitude / nanos_per_unit;
            match self.format {
                Format::BinarySI => {
                    for (suffix, shift) in BINARY_SUFFIXES {
                        let step = 1u128 << shift;
                        if base % step == 0 {
                            return write!(f, "{sign}{}{suffix}", base / step);
                        }
                    }
                    write!(f, "{sign}{base}")
                }
                Format::DecimalSI => {
                    for (suffix, exp) in DECIMAL_SUFFIXES {
                        if exp <= 0 {
                            break;
                        }
                        let step = 10u128.pow(exp as u32);
                        if base % step == 0 {
                            return write!(f, "{sign}{}{suffix}", base / step);
                        }
                    }
                    write!(f, "{sign}{base}")
                }
                Format::DecimalExponent => {
                    let mut mantissa = base;
                    let mut exp = 0;
                    while mantissa % 1000 == 0 {
                        mantissa /= 1000;
                        exp += 3;
                    }
                    if exp > 0 {
                        write!(f, "{sign}{mantissa}e{exp}")
                    } else {
                        write!(f, "{sign}{mantissa}")
                    }
                }
            }
        } else if magnitude % 1_000_000 == 0 {
            write!(f, "{sign}{}m", magnitude / 1_000_000)
        } else if magnitude % 1_000 == 0 {
            write!(f, "{sign}{}u", magnitude / 1_000)
        } else {
            write!(f, "{sign}{}n", magnitude)
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
