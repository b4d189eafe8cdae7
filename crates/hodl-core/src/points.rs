// crates/hodl-core/src/points.rs
//
// Fixed-point amounts for the ledger.
//
// Balances (`Points`) and ratios (`Rate`, e.g. APY or portfolio percentage)
// both carry exactly four fractional digits. Internally they are integer
// "units" where 1.0 = 10^4 units, so all accounting is exact and
// low-water-mark comparisons are plain integer comparisons.
//
// Textual form is the canonical wire and storage form ("12.5", "0.0001").
// Deserialization also accepts JSON/TOML numbers for configuration
// convenience.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HodlError;

/// Number of units in 1.0. Four fractional digits.
pub const UNITS_PER_POINT: u64 = 10_000;

const FRACTION_DIGITS: usize = 4;

/// A non-negative point balance with four fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Points {
    /// Amount in units (1 point = 10^4 units).
    pub units: u64,
}

/// A non-negative ratio with four fractional digits (0.05 = 5%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rate {
    /// Ratio in units (1.0 = 10^4 units).
    pub units: u64,
}

impl Points {
    /// Zero points.
    pub const ZERO: Points = Points { units: 0 };

    /// Create an amount from raw units.
    pub const fn from_units(units: u64) -> Self {
        Self { units }
    }

    /// Create an amount from a whole number of points.
    pub const fn from_whole(points: u64) -> Self {
        Self {
            units: points * UNITS_PER_POINT,
        }
    }

    /// Checked addition. Returns `None` on overflow.
    pub fn checked_add(self, rhs: Points) -> Option<Points> {
        self.units.checked_add(rhs.units).map(Points::from_units)
    }

    /// Checked subtraction. Returns `None` if the result would be negative.
    pub fn checked_sub(self, rhs: Points) -> Option<Points> {
        self.units.checked_sub(rhs.units).map(Points::from_units)
    }

    /// Multiply by a chain of rates, truncating once at the end.
    ///
    /// `Points(60).scaled(&[apy(0.05), portfolio(0.2)])` is 0.6. Truncating
    /// only after the full product keeps intermediate precision. Rates no
    /// larger than `Rate::ONE` never scale an amount up.
    pub fn scaled(self, rates: &[Rate]) -> Points {
        let mut numerator = self.units as u128;
        let mut denominator: u128 = 1;
        for rate in rates {
            numerator *= rate.units as u128;
            denominator *= UNITS_PER_POINT as u128;
        }
        let units = numerator / denominator;
        Points::from_units(u64::try_from(units).unwrap_or(u64::MAX))
    }

    /// Human-facing form: rounded to one decimal place (half-even), with a
    /// trailing `.0` removed. `60` → "60", `0.6` → "0.6", `12.25` → "12.2".
    pub fn pretty(&self) -> String {
        let step = UNITS_PER_POINT / 10;
        let mut tenths = self.units / step;
        let rem = self.units % step;
        let half = step / 2;
        if rem > half || (rem == half && tenths % 2 == 1) {
            tenths += 1;
        }
        let whole = tenths / 10;
        let digit = tenths % 10;
        if digit == 0 {
            whole.to_string()
        } else {
            format!("{}.{}", whole, digit)
        }
    }
}

impl Rate {
    /// 1.0, the largest rate an epoch may carry.
    pub const ONE: Rate = Rate {
        units: UNITS_PER_POINT,
    };

    /// Create a rate from raw units.
    pub const fn from_units(units: u64) -> Self {
        Self { units }
    }
}

/// Parse a non-negative decimal string into units.
///
/// Accepts `"12"`, `"12.5"`, `".5"`, `"0.0001"`. Digits beyond the fourth
/// fractional place are rounded half-up, matching a NUMERIC(15, 4) column.
fn parse_units(raw: &str) -> Result<u64, HodlError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(HodlError::InvalidAmount("empty amount".to_string()));
    }
    if s.starts_with('-') {
        return Err(HodlError::InvalidAmount(format!("negative amount: {}", s)));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(HodlError::InvalidAmount(format!("no digits in {:?}", s)));
    }
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(HodlError::InvalidAmount(format!("not a decimal: {:?}", s)));
    }

    let overflow = || HodlError::InvalidAmount(format!("amount out of range: {}", s));

    let whole: u64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| overflow())?
    };

    let kept = &frac_part[..frac_part.len().min(FRACTION_DIGITS)];
    let mut frac: u64 = 0;
    for (i, b) in kept.bytes().enumerate() {
        frac += (b - b'0') as u64 * 10u64.pow((FRACTION_DIGITS - 1 - i) as u32);
    }
    let round_up = frac_part
        .as_bytes()
        .get(FRACTION_DIGITS)
        .map(|b| *b >= b'5')
        .unwrap_or(false);

    whole
        .checked_mul(UNITS_PER_POINT)
        .and_then(|u| u.checked_add(frac))
        .and_then(|u| u.checked_add(round_up as u64))
        .ok_or_else(overflow)
}

/// Write units as a decimal with trailing fractional zeros trimmed.
fn write_units(units: u64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let whole = units / UNITS_PER_POINT;
    let frac = units % UNITS_PER_POINT;
    if frac == 0 {
        write!(f, "{}", whole)
    } else {
        let frac_str = format!("{:04}", frac);
        write!(f, "{}.{}", whole, frac_str.trim_end_matches('0'))
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_units(self.units, f)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_units(self.units, f)
    }
}

impl FromStr for Points {
    type Err = HodlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_units(s).map(Points::from_units)
    }
}

impl FromStr for Rate {
    type Err = HodlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_units(s).map(Rate::from_units)
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnitsVisitor).map(Points::from_units)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnitsVisitor).map(Rate::from_units)
    }
}

struct UnitsVisitor;

impl<'de> Visitor<'de> for UnitsVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative decimal with at most four fractional digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        parse_units(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        v.checked_mul(UNITS_PER_POINT)
            .ok_or_else(|| E::custom(format!("amount out of range: {}", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        if v < 0 {
            return Err(E::custom(format!("negative amount: {}", v)));
        }
        self.visit_u64(v as u64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(E::custom(format!("invalid amount: {}", v)));
        }
        let units = (v * UNITS_PER_POINT as f64).round();
        if units > u64::MAX as f64 {
            return Err(E::custom(format!("amount out of range: {}", v)));
        }
        Ok(units as u64)
    }
}
