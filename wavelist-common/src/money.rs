//! Fixed-point USD amounts.
//!
//! §4.3 / §9 of the specification require that budget arithmetic never
//! touch a binary float: "Use fixed-point decimal with four fractional
//! digits end-to-end." `Usd` wraps `rust_decimal::Decimal` and rescales to
//! exactly 4 fractional digits on construction and after every arithmetic
//! operation, so accumulated rounding cannot silently drift.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SCALE: u32 = 4;

/// A non-negative-by-convention (callers may still construct negatives for
/// deltas) fixed-point USD amount, always carrying exactly 4 fractional
/// digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Usd(Decimal);

impl Usd {
    pub const ZERO: Usd = Usd(Decimal::ZERO);

    /// Construct from a `Decimal`, rescaling to 4 fractional digits.
    pub fn new(mut value: Decimal) -> Self {
        value.rescale(SCALE);
        Usd(value)
    }

    pub fn from_str_strict(s: &str) -> Result<Self, rust_decimal::Error> {
        Decimal::from_str(s).map(Self::new)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Usd) -> Option<Usd> {
        self.0.checked_add(other.0).map(Usd::new)
    }

    pub fn checked_sub(self, other: Usd) -> Option<Usd> {
        self.0.checked_sub(other.0).map(Usd::new)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Cost of `count` units (e.g. tokens) at `rate`, rescaled to 4
    /// fractional digits at the end rather than on `rate` itself — `rate`
    /// keeps its own finer precision right up until it's charged.
    pub fn from_rate(rate: UnitRate, count: u64) -> Usd {
        Usd::new(rate.0 * Decimal::from(count))
    }
}

impl Default for Usd {
    fn default() -> Self {
        Usd::ZERO
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl FromStr for Usd {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_strict(s)
    }
}

impl From<Usd> for String {
    fn from(value: Usd) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Usd {
    type Error = rust_decimal::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Usd::from_str_strict(&value)
    }
}

impl std::ops::Add for Usd {
    type Output = Usd;
    fn add(self, rhs: Usd) -> Usd {
        Usd::new(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Usd {
    type Output = Usd;
    fn sub(self, rhs: Usd) -> Usd {
        Usd::new(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Usd {
    fn sum<I: Iterator<Item = Usd>>(iter: I) -> Self {
        iter.fold(Usd::ZERO, |acc, x| acc + x)
    }
}

const RATE_SCALE: u32 = 9;

/// A per-unit price (e.g. USD per LLM token), kept at 9 fractional
/// digits rather than `Usd`'s 4. Real per-token rates are routinely
/// below $0.000001/token; rescaling one of those to 4 digits on
/// construction would round it straight to zero before a single call
/// is made. `UnitRate` only collapses to `Usd` precision once
/// `Usd::from_rate` actually charges it for a count of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct UnitRate(Decimal);

impl UnitRate {
    pub const ZERO: UnitRate = UnitRate(Decimal::ZERO);

    pub fn new(mut value: Decimal) -> Self {
        value.rescale(RATE_SCALE);
        UnitRate(value)
    }

    pub fn from_str_strict(s: &str) -> Result<Self, rust_decimal::Error> {
        Decimal::from_str(s).map(Self::new)
    }
}

impl Default for UnitRate {
    fn default() -> Self {
        UnitRate::ZERO
    }
}

impl fmt::Display for UnitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}", self.0)
    }
}

impl FromStr for UnitRate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_strict(s)
    }
}

impl From<UnitRate> for String {
    fn from(value: UnitRate) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for UnitRate {
    type Error = rust_decimal::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        UnitRate::from_str_strict(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescales_to_four_digits() {
        let v = Usd::from_str_strict("1.2").unwrap();
        assert_eq!(v.to_string(), "1.2000");
    }

    #[test]
    fn addition_stays_fixed_point() {
        let a = Usd::from_str_strict("2.6000").unwrap();
        let b = Usd::from_str_strict("2.4000").unwrap();
        assert_eq!((a + b).to_string(), "5.0000");
    }

    #[test]
    fn from_rate_is_exact() {
        let price = UnitRate::from_str_strict("0.0001").unwrap();
        let total = Usd::from_rate(price, 12_345);
        assert_eq!(total.to_string(), "1.2345");
    }

    #[test]
    fn from_rate_keeps_sub_cent_per_token_prices_from_rounding_to_zero() {
        let rate = UnitRate::from_str_strict("0.00000015").unwrap();
        let total = Usd::from_rate(rate, 2_000_000);
        assert_eq!(total.to_string(), "0.3000");
    }

    #[test]
    fn round_trips_through_json() {
        let v = Usd::from_str_strict("5.2500").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"5.2500\"");
        let back: Usd = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
