use crate::error::LoyaltyError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const SCALE: u32 = 2;
const MINOR_PER_UNIT: i64 = 100;

/// Represents a non-negative amount of loyalty points with two decimal places.
///
/// Stored as an integer count of hundredths so balance arithmetic never goes
/// through binary floating point. Conversion to and from decimals only happens
/// at the edges (oracle responses, HTTP bodies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, SCALE)
    }

    /// Exact conversion. Rejects negative values and sub-hundredth precision.
    pub fn try_from_decimal(value: Decimal) -> Result<Self, LoyaltyError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LoyaltyError::Validation(format!(
                "amount must not be negative, got {value}"
            )));
        }
        if value.normalize().scale() > SCALE {
            return Err(LoyaltyError::Validation(format!(
                "amount {value} has more than {SCALE} fractional digits"
            )));
        }
        (value * Decimal::from(MINOR_PER_UNIT))
            .trunc()
            .to_i64()
            .map(Self)
            .ok_or_else(|| LoyaltyError::Validation(format!("amount {value} is out of range")))
    }

    /// Rounds half away from zero to the nearest hundredth before converting.
    pub fn from_decimal_rounded(value: Decimal) -> Result<Self, LoyaltyError> {
        Self::try_from_decimal(value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Returns `None` when the result would drop below zero.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).filter(|v| *v >= 0).map(Self)
    }
}

impl FromStr for Money {
    type Err = LoyaltyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s.trim())
            .map_err(|e| LoyaltyError::Validation(format!("invalid amount {s:?}: {e}")))?;
        Self::try_from_decimal(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// JSON clients expect plain numbers. Every hundredths value below 2^53 survives
// the trip through f64 and prints back as the same decimal.
impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.0 as f64 / MINOR_PER_UNIT as f64)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl MoneyVisitor {
    fn convert<E: de::Error>(value: Decimal) -> Result<Money, E> {
        Money::try_from_decimal(value).map_err(E::custom)
    }
}

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative amount with at most two decimal places")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        Self::convert(Decimal::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Self::convert(Decimal::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        // Display of f64 is the shortest round-trip form, so 300.5 stays "300.5".
        let value = Decimal::from_str_exact(&v.to_string()).map_err(E::custom)?;
        Self::convert(value)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        Money::from_str(v).map_err(E::custom)
    }
}
