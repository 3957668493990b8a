//! Strict fixed-point decimal parsing and arithmetic.
//!
//! Wire amounts are fixed-point decimal strings (spec §3), quantized to
//! 0.01 for fiat-like equivalents or 1e-18 for high-precision ones, and
//! must be compared through a strict parser rather than `f64`. The wire
//! grammar is exactly `^\d+(?:\.\d+)?$` (spec §8 scenario 8): no sign, no
//! thousands separators, no exponents, no leading `+`.
//!
//! Internally a [`Decimal`] is an arbitrary-sign `i128` mantissa paired
//! with a `scale` (number of digits after the point), so all arithmetic
//! is exact integer arithmetic — no float drift ever enters a balance.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Scale (decimal places) used for ordinary fiat-like equivalents.
pub const SCALE_CENTS: u32 = 2;
/// Scale used for high-precision equivalents (e.g. `HOUR`).
pub const SCALE_NANO18: u32 = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecimalError {
    #[error("amount is not a valid decimal string: {0:?}")]
    InvalidFormat(String),
    #[error("amount exceeds supported precision")]
    Overflow,
}

/// An exact fixed-point decimal value: `mantissa * 10^-scale`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub fn zero(scale: u32) -> Self {
        Self { mantissa: 0, scale }
    }

    pub fn from_minor(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn is_positive(&self) -> bool {
        self.mantissa > 0
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Parse a wire string strictly against `^\d+(?:\.\d+)?$`, quantizing
    /// (round-half-up) to `scale` fractional digits.
    ///
    /// # Example
    /// ```
    /// use credit_sim_engine::core::decimal::{Decimal, SCALE_CENTS};
    ///
    /// let d = Decimal::parse_strict("12.5", SCALE_CENTS).unwrap();
    /// assert_eq!(d.to_wire_string(), "12.50");
    ///
    /// assert!(Decimal::parse_strict("1,23", SCALE_CENTS).is_err());
    /// assert!(Decimal::parse_strict("-1.00", SCALE_CENTS).is_err());
    /// assert!(Decimal::parse_strict("1e9", SCALE_CENTS).is_err());
    /// ```
    pub fn parse_strict(s: &str, scale: u32) -> Result<Self, DecimalError> {
        if s.is_empty() {
            return Err(DecimalError::InvalidFormat(s.to_string()));
        }
        let bytes = s.as_bytes();
        if !bytes[0].is_ascii_digit() {
            return Err(DecimalError::InvalidFormat(s.to_string()));
        }

        let (int_part, frac_part) = match s.find('.') {
            None => (s, ""),
            Some(idx) => (&s[..idx], &s[idx + 1..]),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalError::InvalidFormat(s.to_string()));
        }
        if s.contains('.') && (frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit())) {
            return Err(DecimalError::InvalidFormat(s.to_string()));
        }

        let int_value: i128 = int_part.parse().map_err(|_| DecimalError::Overflow)?;
        let mut mantissa = int_value
            .checked_mul(10i128.pow(scale))
            .ok_or(DecimalError::Overflow)?;

        if !frac_part.is_empty() {
            let digits: Vec<u8> = frac_part.bytes().map(|b| b - b'0').collect();
            let scale = scale as usize;
            for (i, d) in digits.iter().enumerate() {
                if i < scale {
                    let place = scale - 1 - i;
                    mantissa += (*d as i128) * 10i128.pow(place as u32);
                } else if i == scale {
                    // round-half-up on the first truncated digit
                    if *d >= 5 {
                        mantissa += 1;
                    }
                    break;
                }
            }
        }

        Ok(Self {
            mantissa,
            scale,
        })
    }

    /// Render back to the wire grammar, always showing exactly `scale`
    /// fractional digits (spec §3: amounts are fixed-point strings).
    pub fn to_wire_string(&self) -> String {
        let scale = self.scale as usize;
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        if scale == 0 {
            return format!("{sign}{abs}");
        }
        let divisor = 10u128.pow(scale as u32);
        let int_part = abs / divisor;
        let frac_part = abs % divisor;
        format!("{sign}{int_part}.{frac_part:0width$}", width = scale)
    }

    fn rescaled(&self, target_scale: u32) -> i128 {
        if target_scale == self.scale {
            self.mantissa
        } else if target_scale > self.scale {
            self.mantissa * 10i128.pow(target_scale - self.scale)
        } else {
            self.mantissa / 10i128.pow(self.scale - target_scale)
        }
    }

    pub fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        let scale = self.scale.max(other.scale);
        let a = self.rescaled(scale);
        let b = other.rescaled(scale);
        a.checked_add(b).map(|m| Decimal { mantissa: m, scale })
    }

    pub fn checked_sub(&self, other: &Decimal) -> Option<Decimal> {
        let scale = self.scale.max(other.scale);
        let a = self.rescaled(scale);
        let b = other.rescaled(scale);
        a.checked_sub(b).map(|m| Decimal { mantissa: m, scale })
    }

    pub fn min(&self, other: &Decimal) -> Decimal {
        if *self <= *other {
            *self
        } else {
            *other
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let scale = self.scale.max(other.scale);
        self.rescaled(scale) == other.rescaled(scale)
    }
}
impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.rescaled(scale).cmp(&other.rescaled(scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_comma_separator() {
        assert_eq!(
            Decimal::parse_strict("1,23", SCALE_CENTS),
            Err(DecimalError::InvalidFormat("1,23".to_string()))
        );
    }

    #[test]
    fn rejects_sign_and_exponent() {
        assert!(Decimal::parse_strict("+1.00", SCALE_CENTS).is_err());
        assert!(Decimal::parse_strict("-1.00", SCALE_CENTS).is_err());
        assert!(Decimal::parse_strict("1e3", SCALE_CENTS).is_err());
        assert!(Decimal::parse_strict("", SCALE_CENTS).is_err());
        assert!(Decimal::parse_strict(".5", SCALE_CENTS).is_err());
    }

    #[test]
    fn rounds_half_up_at_quantization_boundary() {
        let d = Decimal::parse_strict("1.005", SCALE_CENTS).unwrap();
        assert_eq!(d.to_wire_string(), "1.01");
    }

    #[test]
    fn comparisons_across_scales() {
        let a = Decimal::from_minor(150, SCALE_CENTS); // 1.50
        let b = Decimal::from_minor(15, 1); // 1.5 at scale 1
        assert_eq!(a, b);
        assert!(a >= b);
    }

    #[test]
    fn add_and_sub_are_exact() {
        let a = Decimal::parse_strict("10.00", SCALE_CENTS).unwrap();
        let b = Decimal::parse_strict("3.33", SCALE_CENTS).unwrap();
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.to_wire_string(), "13.33");
        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff.to_wire_string(), "6.67");
    }

    #[test]
    fn zero_is_not_positive_or_negative() {
        let z = Decimal::zero(SCALE_CENTS);
        assert!(!z.is_positive());
        assert!(!z.is_negative());
        assert!(z.is_zero());
    }
}
