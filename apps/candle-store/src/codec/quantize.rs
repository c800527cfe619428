//! Decimal quantization of non-negative reals into whole/fraction bit fields.
//!
//! A value `v` is stored as `floor(v)` in the whole field and
//! `round(frac(v) * 10^d)` in the fraction field, where `d` is the largest
//! digit count whose maximum (`10^d - 1`) fits in the fraction width `F`:
//!
//! ```text
//! F:  0..=3  4..=6  7..=9  10..=13  ...  60..=63  64
//! d:    0      1      2       3           18      19
//! ```

use crate::error::{Result, StoreError};

/// Largest supported fraction width.
pub const MAX_FRACTION_WIDTH: u8 = 64;

const fn digits_for_width(width: u8) -> u8 {
    let limit: u128 = 1u128 << width;
    let mut digits = 0u8;
    let mut next_max: u128 = 9; // 10^(digits + 1) - 1
    while digits < 19 && next_max < limit {
        digits += 1;
        next_max = next_max * 10 + 9;
    }
    digits
}

const fn build_digit_table() -> [u8; MAX_FRACTION_WIDTH as usize + 1] {
    let mut table = [0u8; MAX_FRACTION_WIDTH as usize + 1];
    let mut width = 0;
    while width <= MAX_FRACTION_WIDTH {
        table[width as usize] = digits_for_width(width);
        width += 1;
    }
    table
}

/// Fraction width (bits) to decimal digit count.
pub const DIGIT_TABLE: [u8; MAX_FRACTION_WIDTH as usize + 1] = build_digit_table();

/// Decimal digits a fraction field of `width` bits holds exactly.
///
/// Widths above 64 are clamped.
#[must_use]
pub const fn fraction_digits(width: u8) -> u8 {
    if width > MAX_FRACTION_WIDTH {
        DIGIT_TABLE[MAX_FRACTION_WIDTH as usize]
    } else {
        DIGIT_TABLE[width as usize]
    }
}

/// `10^digits` (digits at most 19).
#[must_use]
pub const fn pow10(digits: u8) -> u64 {
    10u64.pow(digits as u32)
}

/// How an encode treats a quantized part wider than its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fail with [`StoreError::EncodeOverflow`].
    #[default]
    Error,
    /// Keep the low-order `width` bits (`value mod 2^width`).
    Wrap,
}

impl OverflowPolicy {
    /// Parse a policy name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "wrap" => Some(Self::Wrap),
            _ => None,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Wrap => "wrap",
        }
    }

    /// Fit `value` into `width` bits under this policy.
    pub fn fit(self, field: &'static str, value: u64, width: u8) -> Result<u64> {
        if width >= 64 || value >> width == 0 {
            return Ok(value);
        }
        match self {
            Self::Error => Err(StoreError::EncodeOverflow {
                field,
                value,
                width,
            }),
            Self::Wrap => Ok(value & ((1u64 << width) - 1)),
        }
    }
}

/// Whole and fraction-digit parts of one quantized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quantized {
    /// Integer part.
    pub whole: u64,
    /// Fraction scaled by `10^d`.
    pub fraction: u64,
}

/// Split `value` into whole and fraction digits with `digits` decimal places.
///
/// A fraction that rounds up to `10^digits` carries into the whole part.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedValue`] for negative, NaN or infinite
/// input, and [`StoreError::EncodeOverflow`] when the whole part exceeds 64 bits.
pub fn quantize(field: &'static str, value: f64, digits: u8) -> Result<Quantized> {
    if !value.is_finite() || value < 0.0 {
        return Err(StoreError::UnsupportedValue { field, value });
    }
    let floor = value.floor();
    if floor >= 18_446_744_073_709_551_616.0 {
        return Err(StoreError::EncodeOverflow {
            field,
            value: u64::MAX,
            width: 64,
        });
    }
    let scale = pow10(digits);
    let mut whole = floor as u64;
    let mut fraction = ((value - floor) * scale as f64).round() as u64;
    if fraction >= scale {
        fraction -= scale;
        whole = whole.checked_add(1).ok_or(StoreError::EncodeOverflow {
            field,
            value: u64::MAX,
            width: 64,
        })?;
    }
    Ok(Quantized { whole, fraction })
}

/// Rebuild a real from its parts.
#[must_use]
pub fn dequantize(parts: Quantized, digits: u8) -> f64 {
    parts.whole as f64 + parts.fraction as f64 / pow10(digits) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0)]
    #[test_case(3, 0)]
    #[test_case(4, 1)]
    #[test_case(6, 1)]
    #[test_case(7, 2)]
    #[test_case(9, 2)]
    #[test_case(10, 3)]
    #[test_case(13, 3)]
    #[test_case(14, 4)]
    #[test_case(15, 4)]
    #[test_case(16, 4)]
    #[test_case(52, 15)]
    #[test_case(63, 18)]
    #[test_case(64, 19)]
    fn test_digit_table(width: u8, digits: u8) {
        assert_eq!(fraction_digits(width), digits);
    }

    #[test]
    fn test_digit_bound_holds_for_every_width() {
        for width in 0..=MAX_FRACTION_WIDTH {
            let d = u32::from(fraction_digits(width));
            let limit = 1u128 << width;
            assert!(10u128.pow(d) - 1 < limit, "lower bound at {width}");
            if d < 19 {
                assert!(limit <= 10u128.pow(d + 1) - 1, "upper bound at {width}");
            }
        }
    }

    #[test]
    fn test_quantize_scenario_values() {
        assert_eq!(
            quantize("volume", 10.5, 1).unwrap(),
            Quantized {
                whole: 10,
                fraction: 5
            }
        );
        assert_eq!(
            quantize("open", 4.1, 1).unwrap(),
            Quantized {
                whole: 4,
                fraction: 1
            }
        );
        assert_eq!(
            quantize("high", 9.7, 1).unwrap(),
            Quantized {
                whole: 9,
                fraction: 7
            }
        );
    }

    #[test]
    fn test_quantize_carries_rounded_fraction() {
        assert_eq!(
            quantize("close", 2.96, 1).unwrap(),
            Quantized {
                whole: 3,
                fraction: 0
            }
        );
    }

    #[test]
    fn test_quantize_rejects_unsupported() {
        for value in [-0.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                quantize("low", value, 2),
                Err(StoreError::UnsupportedValue { field: "low", .. })
            ));
        }
    }

    #[test]
    fn test_dequantize() {
        let value = dequantize(
            Quantized {
                whole: 12,
                fraction: 34,
            },
            2,
        );
        assert!((value - 12.34).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_policy() {
        assert_eq!(OverflowPolicy::Error.fit("f", 15, 4).unwrap(), 15);
        assert!(matches!(
            OverflowPolicy::Error.fit("f", 16, 4),
            Err(StoreError::EncodeOverflow {
                value: 16,
                width: 4,
                ..
            })
        ));
        assert_eq!(OverflowPolicy::Wrap.fit("f", 0b1_0011, 4).unwrap(), 0b0011);
        assert_eq!(OverflowPolicy::Error.fit("f", u64::MAX, 64).unwrap(), u64::MAX);
        assert!(OverflowPolicy::Error.fit("f", 1, 0).is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(OverflowPolicy::parse("WRAP"), Some(OverflowPolicy::Wrap));
        assert_eq!(OverflowPolicy::parse("error"), Some(OverflowPolicy::Error));
        assert_eq!(OverflowPolicy::parse("saturate"), None);
        assert_eq!(OverflowPolicy::default().as_str(), "error");
    }
}
