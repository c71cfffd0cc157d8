//! Fixed-width integer constant arithmetic
//!
//! `ApInt` models the value of an integral IR constant: a bit pattern of a
//! declared width in {1, 8, 16, 32, 64}. All arithmetic wraps at the width.
//! Signedness is a property of the operation, not of the value, so signed
//! and unsigned views are provided side by side.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A two's-complement integer of a fixed bit width.
///
/// The stored bit pattern is always masked to the width, so two `ApInt`s
/// compare equal exactly when they have the same width and the same bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApInt {
    bits: u64,
    width: u32,
}

impl ApInt {
    /// Creates a value of the given width from a raw bit pattern. Bits above
    /// the width are discarded.
    pub fn new(bits: u64, width: u32) -> Self {
        assert!(matches!(width, 1 | 8 | 16 | 32 | 64), "unsupported bit width {width}");
        Self { bits: mask(bits, width), width }
    }

    /// Creates a value from a signed integer, wrapping at the width.
    pub fn from_i64(value: i64, width: u32) -> Self {
        Self::new(value as u64, width)
    }

    /// The boolean constants, as `i1`.
    pub fn truth(value: bool) -> Self {
        Self::new(value as u64, 1)
    }

    pub fn zero(width: u32) -> Self {
        Self::new(0, width)
    }

    pub fn one(width: u32) -> Self {
        Self::new(1, width)
    }

    pub fn width(self) -> u32 {
        self.width
    }

    /// The raw bit pattern, zero-extended to 64 bits.
    pub fn bits(self) -> u64 {
        self.bits
    }

    /// The value interpreted as unsigned.
    pub fn as_u64(self) -> u64 {
        self.bits
    }

    /// The value interpreted as signed (sign-extended to 64 bits).
    pub fn as_i64(self) -> i64 {
        if self.width == 64 {
            return self.bits as i64;
        }
        let shift = 64 - self.width;
        ((self.bits << shift) as i64) >> shift
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    /// Interprets an `i1` as a branch condition.
    pub fn as_bool(self) -> bool {
        !self.is_zero()
    }

    /// Parses a decimal or `0x`-prefixed hexadecimal literal, with an
    /// optional leading minus sign.
    pub fn from_str_radix(text: &str, width: u32) -> Option<Self> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).ok()?
        } else {
            // Reject empty and non-digit input before parsing.
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            u64::from_str_radix(digits, 10).ok()?
        };
        let bits = if negative { (magnitude as i64).wrapping_neg() as u64 } else { magnitude };
        Some(Self::new(bits, width))
    }

    pub fn wrapping_add(self, rhs: Self) -> Self {
        Self::new(self.bits.wrapping_add(rhs.bits), self.width)
    }

    pub fn wrapping_sub(self, rhs: Self) -> Self {
        Self::new(self.bits.wrapping_sub(rhs.bits), self.width)
    }

    pub fn wrapping_mul(self, rhs: Self) -> Self {
        Self::new(self.bits.wrapping_mul(rhs.bits), self.width)
    }

    /// Unsigned division. `None` on division by zero.
    pub fn udiv(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(Self::new(self.as_u64() / rhs.as_u64(), self.width))
    }

    /// Signed division. `None` on division by zero.
    pub fn sdiv(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(Self::from_i64(self.as_i64().wrapping_div(rhs.as_i64()), self.width))
    }

    pub fn urem(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(Self::new(self.as_u64() % rhs.as_u64(), self.width))
    }

    pub fn srem(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(Self::from_i64(self.as_i64().wrapping_rem(rhs.as_i64()), self.width))
    }

    /// Logical shift left. Shift amounts at or above the width yield zero.
    pub fn shl(self, amount: Self) -> Self {
        let n = amount.as_u64();
        if n >= u64::from(self.width) {
            return Self::zero(self.width);
        }
        Self::new(self.bits << n, self.width)
    }

    /// Logical shift right.
    pub fn lshr(self, amount: Self) -> Self {
        let n = amount.as_u64();
        if n >= u64::from(self.width) {
            return Self::zero(self.width);
        }
        Self::new(self.bits >> n, self.width)
    }

    /// Arithmetic shift right (replicates the sign bit).
    pub fn ashr(self, amount: Self) -> Self {
        let n = amount.as_u64().min(u64::from(self.width) - 1);
        Self::from_i64(self.as_i64() >> n, self.width)
    }

    pub fn bitand(self, rhs: Self) -> Self {
        Self::new(self.bits & rhs.bits, self.width)
    }

    pub fn bitor(self, rhs: Self) -> Self {
        Self::new(self.bits | rhs.bits, self.width)
    }

    pub fn bitxor(self, rhs: Self) -> Self {
        Self::new(self.bits ^ rhs.bits, self.width)
    }

    pub fn bitnot(self) -> Self {
        Self::new(!self.bits, self.width)
    }

    pub fn wrapping_neg(self) -> Self {
        Self::new(self.bits.wrapping_neg(), self.width)
    }

    /// Logical negation of an `i1`.
    pub fn lognot(self) -> Self {
        Self::truth(self.is_zero())
    }

    pub fn zext(self, width: u32) -> Self {
        Self::new(self.bits, width)
    }

    pub fn sext(self, width: u32) -> Self {
        Self::new(self.as_i64() as u64, width)
    }

    pub fn trunc(self, width: u32) -> Self {
        Self::new(self.bits, width)
    }

    pub fn ucmp(self, rhs: Self) -> std::cmp::Ordering {
        self.as_u64().cmp(&rhs.as_u64())
    }

    pub fn scmp(self, rhs: Self) -> std::cmp::Ordering {
        self.as_i64().cmp(&rhs.as_i64())
    }
}

impl fmt::Display for ApInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

fn mask(bits: u64, width: u32) -> u64 {
    if width == 64 {
        bits
    } else {
        bits & ((1u64 << width) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wrapping_at_width() {
        let a = ApInt::new(0xff, 8);
        assert_eq!(a.wrapping_add(ApInt::one(8)), ApInt::zero(8));
        assert_eq!(a.as_i64(), -1);
        assert_eq!(a.as_u64(), 255);
    }

    #[test]
    fn signed_division_rounds_toward_zero() {
        let a = ApInt::from_i64(-7, 32);
        let b = ApInt::from_i64(2, 32);
        assert_eq!(a.sdiv(b).unwrap().as_i64(), -3);
        assert_eq!(a.srem(b).unwrap().as_i64(), -1);
    }

    #[test]
    fn division_by_zero_is_rejected() {
        let a = ApInt::from_i64(1, 64);
        assert!(a.udiv(ApInt::zero(64)).is_none());
        assert!(a.srem(ApInt::zero(64)).is_none());
    }

    #[test]
    fn shifts_saturate_at_width() {
        let a = ApInt::new(1, 8);
        assert_eq!(a.shl(ApInt::new(8, 8)), ApInt::zero(8));
        assert_eq!(ApInt::from_i64(-2, 8).ashr(ApInt::new(9, 8)).as_i64(), -1);
    }

    #[test]
    fn extension_and_truncation() {
        let a = ApInt::from_i64(-1, 8);
        assert_eq!(a.zext(32).as_u64(), 255);
        assert_eq!(a.sext(32).as_i64(), -1);
        assert_eq!(ApInt::new(0x1ff, 64).trunc(8).as_u64(), 0xff);
    }

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(ApInt::from_str_radix("42", 64).unwrap().as_u64(), 42);
        assert_eq!(ApInt::from_str_radix("-1", 8).unwrap().as_u64(), 255);
        assert_eq!(ApInt::from_str_radix("0xff", 64).unwrap().as_u64(), 255);
        assert!(ApInt::from_str_radix("12a", 64).is_none());
        assert!(ApInt::from_str_radix("", 64).is_none());
    }

    proptest! {
        #[test]
        fn add_commutes(a in any::<u64>(), b in any::<u64>()) {
            let x = ApInt::new(a, 32);
            let y = ApInt::new(b, 32);
            prop_assert_eq!(x.wrapping_add(y), y.wrapping_add(x));
        }

        #[test]
        fn neg_is_sub_from_zero(a in any::<u64>()) {
            let x = ApInt::new(a, 16);
            prop_assert_eq!(x.wrapping_neg(), ApInt::zero(16).wrapping_sub(x));
        }

        #[test]
        fn masked_bits_fit_width(a in any::<u64>()) {
            let x = ApInt::new(a, 8);
            prop_assert!(x.bits() <= 0xff);
        }
    }
}
