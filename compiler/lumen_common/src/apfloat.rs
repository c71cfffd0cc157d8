//! Fixed-width floating point constant arithmetic
//!
//! `ApFloat` stores the bit pattern of an `f32` or `f64` constant so that
//! constants can be interned and hashed; arithmetic round-trips through the
//! native type of the declared width.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A floating point constant of width 32 or 64, stored as its bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApFloat {
    bits: u64,
    width: u32,
}

impl ApFloat {
    pub fn from_f64(value: f64, width: u32) -> Self {
        assert!(matches!(width, 32 | 64), "unsupported float width {width}");
        let bits = match width {
            32 => u64::from((value as f32).to_bits()),
            _ => value.to_bits(),
        };
        Self { bits, width }
    }

    pub fn zero(width: u32) -> Self {
        Self::from_f64(0.0, width)
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn bits(self) -> u64 {
        self.bits
    }

    pub fn as_f64(self) -> f64 {
        match self.width {
            32 => f64::from(f32::from_bits(self.bits as u32)),
            _ => f64::from_bits(self.bits),
        }
    }

    pub fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }

    /// Parses a float literal. The textual IR requires a `.` in every float
    /// literal, but this helper accepts anything `f64::from_str` does.
    pub fn parse(text: &str, width: u32) -> Option<Self> {
        text.parse::<f64>().ok().map(|v| Self::from_f64(v, width))
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::from_f64(self.as_f64() + rhs.as_f64(), self.width)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::from_f64(self.as_f64() - rhs.as_f64(), self.width)
    }

    pub fn mul(self, rhs: Self) -> Self {
        Self::from_f64(self.as_f64() * rhs.as_f64(), self.width)
    }

    pub fn div(self, rhs: Self) -> Self {
        Self::from_f64(self.as_f64() / rhs.as_f64(), self.width)
    }

    pub fn neg(self) -> Self {
        Self::from_f64(-self.as_f64(), self.width)
    }

    /// IEEE partial order; NaN compares as incomparable (`None`).
    pub fn fcmp(self, rhs: Self) -> Option<std::cmp::Ordering> {
        self.as_f64().partial_cmp(&rhs.as_f64())
    }

    pub fn convert(self, width: u32) -> Self {
        Self::from_f64(self.as_f64(), width)
    }
}

impl fmt::Display for ApFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = format!("{}", self.as_f64());
        // The textual IR requires float literals to carry a dot.
        if text.contains('.') || text.contains("inf") || text.contains("NaN") {
            write!(f, "{text}")
        } else {
            write!(f, "{text}.0")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_round_trips_through_bits() {
        let x = ApFloat::from_f64(1.5, 32);
        assert_eq!(x.as_f64(), 1.5);
        assert_eq!(x.width(), 32);
    }

    #[test]
    fn display_always_has_a_dot() {
        assert_eq!(ApFloat::from_f64(1.0, 64).to_string(), "1.0");
        assert_eq!(ApFloat::from_f64(2.5, 64).to_string(), "2.5");
    }

    #[test]
    fn interning_key_distinguishes_widths() {
        let narrow = ApFloat::from_f64(1.0, 32);
        let wide = ApFloat::from_f64(1.0, 64);
        assert_ne!(narrow, wide);
    }

    #[test]
    fn nan_is_incomparable() {
        let nan = ApFloat::from_f64(f64::NAN, 64);
        assert!(nan.fcmp(nan).is_none());
    }
}
