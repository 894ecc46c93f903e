//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Summing a month of sales as floats drifts:                             │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Kopecks                                          │
//! │    Every amount is an i64 count of the smallest unit (1 ₽ = 100 коп.)   │
//! │    Monthly totals, profit and spend thresholds stay exact               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use medstock_core::money::Money;
//!
//! let price = Money::from_minor(459_900); // 4 599.00 ₽
//! let doubled = price * 2;
//! assert_eq!(doubled.minor(), 919_800);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (kopecks).
///
/// ## Design Decisions
/// - **i64 (signed)**: profit can be negative in a month with heavy restocking
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serializes as a plain integer** so the admin console sees kopecks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from kopecks (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use medstock_core::money::Money;
    ///
    /// let price = Money::from_minor(1099);
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from roubles and kopecks.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -5.50 ₽.
    ///
    /// ## Example
    /// ```rust
    /// use medstock_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(4599, 0).minor(), 459_900);
    /// assert_eq!(Money::from_major_minor(-5, 50).minor(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in kopecks.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rouble portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the kopeck portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.saturating_abs())
    }

    /// Applies a whole-percent discount and returns the discounted amount.
    ///
    /// The discount itself is rounded half up to the kopeck.
    ///
    /// ## Example
    /// ```rust
    /// use medstock_core::money::Money;
    ///
    /// let price = Money::from_minor(10_000);
    /// assert_eq!(price.apply_percent_discount(15).minor(), 8_500);
    /// ```
    pub fn apply_percent_discount(&self, percent: u8) -> Money {
        let discount = (self.0 as i128 * percent as i128 + 50) / 100;
        Money::from_minor(self.0 - discount as i64)
    }

    /// Divides the amount by a count, rounding half away from zero.
    ///
    /// Returns zero when `count` is zero. Used for per-transaction averages.
    ///
    /// ## Example
    /// ```rust
    /// use medstock_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(1000).divide_rounded(3).minor(), 333);
    /// assert_eq!(Money::from_minor(1001).divide_rounded(2).minor(), 501);
    /// assert!(Money::from_minor(1000).divide_rounded(0).is_zero());
    /// ```
    pub fn divide_rounded(&self, count: i64) -> Money {
        if count == 0 {
            return Money::zero();
        }
        let n = self.0 as i128;
        let d = count as i128;
        let half = d.abs() / 2;
        let q = if (n >= 0) == (d > 0) {
            (n.abs() + half) / d.abs()
        } else {
            -((n.abs() + half) / d.abs())
        };
        Money::from_minor(q as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================
//
// Arithmetic saturates at the i64 bounds. Validated inputs stay far below
// them; saturation keeps an aggregate over corrupt rows from panicking.

/// Display shows roubles for logs and CLI output, e.g. `4599.00 ₽`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02} ₽", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
