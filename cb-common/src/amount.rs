//! A RON money newtype which maintains some useful internal invariants and
//! provides utilities for fee and discount arithmetic.
//!
//! Note that we don't impl `From<u64>`, `TryFrom<Decimal>`, [`FromStr`], etc
//! because we want calling code to be explicit about what the input unit is.
//!
//! ### Parsing [`Amount`]s
//!
//! If an [`Amount`] needs to be parsed from a user-provided [`String`], use
//! `Decimal::from_str`, then call the appropriate [`Amount`] constructor.
//!
//! ```
//! # use cb_common::amount::Amount;
//! # use rust_decimal::Decimal;
//! # use std::str::FromStr;
//!
//! let ron_str = "149.50";
//! let ron_dec = Decimal::from_str(ron_str).expect("Not a number");
//! let amount = Amount::try_from_ron(ron_dec).expect("Invalid amount");
//! ```
//!
//! ### Precision
//!
//! Intermediate computations (multiplier application, percentage fees) keep
//! the full [`Decimal`] precision; values are only rounded to two decimal
//! places at the persistence boundary via [`Amount::round2`]. Invariant
//! comparisons over persisted values should use [`Amount::approx_eq`], which
//! tolerates the 0.01 epsilon introduced by that rounding.
//!
//! [`Display`]: std::fmt::Display
//! [`FromStr`]: std::str::FromStr
//! [`Decimal`]: rust_decimal::Decimal

use std::{
    fmt::{self, Display},
    iter::Sum,
    ops::{Add, Div, Mul, Sub},
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when attempting to construct an [`Amount`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Amount is negative")]
    Negative,
    #[error("Amount is too large")]
    TooLarge,
}

/// A RON amount, internally represented as a [`Decimal`], which provides the
/// following properties:
///
/// - The contained value is non-negative.
/// - The contained value is no greater than [`Amount::MAX`].
/// - Converting to bani (1/100 RON) and back via divisions and
///   multiplications by 100 doesn't lose any precision.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct Amount(Decimal);

impl Amount {
    /// The maximum [`Amount`] this type can represent. Chosen to fit the
    /// store's `NUMERIC(12, 2)` monetary columns with headroom to spare.
    pub const MAX: Self = Self(dec!(9_999_999_999.99));

    /// An [`Amount`] of zero lei.
    pub const ZERO: Self = Self(dec!(0));

    // --- Constructors --- //

    /// Construct an [`Amount`] from a bani (1/100 RON) [`u64`] value.
    #[inline]
    pub fn try_from_bani(bani: u64) -> Result<Self, Error> {
        Self::try_from_inner(Decimal::from(bani) / dec!(100))
    }

    /// Construct an [`Amount`] from a whole-lei [`u32`] value.
    #[inline]
    pub fn from_ron_u32(ron: u32) -> Self {
        // u32::MAX lei < Amount::MAX, so this can't fail.
        Self(Decimal::from(ron))
    }

    /// Construct an [`Amount`] from a RON [`Decimal`] value.
    #[inline]
    pub fn try_from_ron(ron: Decimal) -> Result<Self, Error> {
        Self::try_from_inner(ron)
    }

    // --- Getters --- //

    /// Returns the [`Amount`] as a [`Decimal`] RON value.
    #[inline]
    pub fn ron(&self) -> Decimal {
        self.0
    }

    /// Returns the [`Amount`] as a [`u64`] bani value, rounding to the
    /// nearest ban.
    #[inline]
    pub fn bani(&self) -> u64 {
        (self.0 * dec!(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .expect("Amount::MAX bani fits in u64")
    }

    /// Whether this amount is exactly zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    // --- Money arithmetic --- //

    /// Round to two decimal places (midpoint away from zero), the canonical
    /// representation at the persistence boundary.
    #[inline]
    pub fn round2(self) -> Self {
        Self(
            self.0.round_dp_with_strategy(
                2,
                RoundingStrategy::MidpointAwayFromZero,
            ),
        )
    }

    /// Returns `pct` percent of this amount, e.g. `total.percent(dec!(10))`
    /// is a 10% platform fee. The result keeps full precision; call
    /// [`round2`](Self::round2) before persisting.
    #[inline]
    pub fn percent(self, pct: Decimal) -> Self {
        Self::try_from_inner(self.0 * pct / dec!(100)).expect("Overflowed")
    }

    /// Whether two amounts are equal within the 0.01 epsilon used for all
    /// persisted-invariant comparisons.
    #[inline]
    pub fn approx_eq(self, other: Self) -> bool {
        let diff = if self.0 >= other.0 {
            self.0 - other.0
        } else {
            other.0 - self.0
        };
        diff <= dec!(0.01)
    }

    // --- Checked arithmetic --- //

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let inner = self.0.checked_add(rhs.0)?;
        Self::try_from_inner(inner).ok()
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let inner = self.0.checked_sub(rhs.0)?;
        Self::try_from_inner(inner).ok()
    }

    // Amount * scalar => Amount
    pub fn checked_mul(self, rhs: Decimal) -> Option<Self> {
        let inner = self.0.checked_mul(rhs)?;
        Self::try_from_inner(inner).ok()
    }

    // Amount / scalar => Amount
    pub fn checked_div(self, rhs: Decimal) -> Option<Self> {
        let inner = self.0.checked_div(rhs)?;
        Self::try_from_inner(inner).ok()
    }

    /// Checks all internal invariants, returning [`Self`] if all were OK.
    #[inline]
    fn try_from_inner(inner: Decimal) -> Result<Self, Error> {
        if inner.is_sign_negative() {
            Err(Error::Negative)
        } else if inner > Self::MAX.0 {
            Err(Error::TooLarge)
        } else {
            Ok(Self(inner))
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner: Decimal = Deserialize::deserialize(deserializer)?;

        Self::try_from_inner(inner).map_err(|e| match e {
            Error::Negative => serde::de::Error::custom("Amount was negative"),
            Error::TooLarge => serde::de::Error::custom("Amount was too large"),
        })
    }
}

impl Display for Amount {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Decimal's Display impl which respects `std::fmt` syntax.
        Decimal::fmt(&self.0, f)
    }
}

// --- Basic std::ops impls --- //

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::try_from_inner(self.0 + rhs.0).expect("Overflowed")
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::try_from_inner(self.0 - rhs.0).expect("Underflowed")
    }
}

// Amount * scalar => Amount
impl Mul<Decimal> for Amount {
    type Output = Self;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Self::try_from_inner(self.0 * rhs).expect("Overflowed")
    }
}
// scalar * Amount => Amount
impl Mul<Amount> for Decimal {
    type Output = Amount;
    fn mul(self, rhs: Amount) -> Self::Output {
        Amount::try_from_inner(self * rhs.0).expect("Overflowed")
    }
}

// Amount / scalar => Amount
impl Div<Decimal> for Amount {
    type Output = Self;
    fn div(self, rhs: Decimal) -> Self::Output {
        Self::try_from_inner(self.0 / rhs).expect("Overflowed")
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

// --- Tests and test infra --- //

#[cfg(any(test, feature = "test-utils"))]
mod arbitrary_impl {
    use proptest::{
        arbitrary::{any, Arbitrary},
        strategy::{BoxedStrategy, Strategy},
    };

    use super::*;

    impl Arbitrary for Amount {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            // Bani values up to Amount::MAX, i.e. realistic money amounts
            // with at most two decimal places.
            (0u64..=999_999_999_999)
                .prop_map(|bani| {
                    Amount::try_from_bani(bani).expect("In range")
                })
                .boxed()
        }
    }
}
