use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed-point currency amount with 2 decimal places, stored as integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub(crate) const SCALE: i64 = 100;

    pub const fn zero() -> Self {
        Money(0)
    }

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, e.g. `Money::from_units(100)` is `100.00`.
    pub const fn from_units(units: i64) -> Self {
        Money(units * Self::SCALE)
    }

    /// Converts a wire float, rounding half away from zero to the cent.
    pub fn from_float(value: f64) -> Self {
        Money((value * Self::SCALE as f64).round() as i64)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

/// Error returned when a string is not a valid money amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseMoneyError {
    #[error("empty amount")]
    Empty,
    #[error("invalid character in amount '{0}'")]
    InvalidCharacter(String),
    #[error("amount '{0}' has more than two decimal places")]
    TooPrecise(String),
    #[error("amount '{0}' is out of range")]
    Overflow(String),
}

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if digits.is_empty() {
            return Err(ParseMoneyError::Empty);
        }

        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(ParseMoneyError::InvalidCharacter(s.to_string()));
        }
        if frac.len() > 2 {
            return Err(ParseMoneyError::TooPrecise(s.to_string()));
        }

        let overflow = || ParseMoneyError::Overflow(s.to_string());
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        // "5" after the point means 50 cents
        let frac: i64 = format!("{frac:0<2}").parse().map_err(|_| overflow())?;
        let cents = whole
            .checked_mul(Self::SCALE)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(overflow)?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_float())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                v.checked_mul(Money::SCALE)
                    .map(Money)
                    .ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                let v = i64::try_from(v).map_err(|_| E::custom("amount out of range"))?;
                self.visit_i64(v)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                if !v.is_finite() {
                    return Err(E::custom("amount is not finite"));
                }
                Ok(Money::from_float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cents_preserves_value() {
        assert_eq!(Money::from_cents(12345), Money(12345));
    }

    #[test]
    fn from_float_converts_correctly() {
        assert_eq!(Money::from_float(100.0), Money::from_cents(10_000));
        assert_eq!(Money::from_float(1.5), Money::from_cents(150));
        assert_eq!(Money::from_float(0.01), Money::from_cents(1));
    }

    #[test]
    fn from_float_rounds_half_away_from_zero() {
        assert_eq!(Money::from_float(1.234), Money::from_cents(123));
        assert_eq!(Money::from_float(1.236), Money::from_cents(124));
        assert_eq!(Money::from_float(-50.255), Money::from_cents(-5026));
    }

    #[test]
    fn display_formats_positive() {
        assert_eq!(Money::from_cents(25_000).to_string(), "250.00");
        assert_eq!(Money::from_cents(150).to_string(), "1.50");
        assert_eq!(Money::from_cents(1).to_string(), "0.01");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn display_formats_negative() {
        assert_eq!(Money::from_cents(-5025).to_string(), "-50.25");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
    }

    #[test]
    fn parse_accepts_whole_and_fractional() {
        assert_eq!("100".parse::<Money>(), Ok(Money::from_units(100)));
        assert_eq!("12.5".parse::<Money>(), Ok(Money::from_cents(1250)));
        assert_eq!("12.05".parse::<Money>(), Ok(Money::from_cents(1205)));
        assert_eq!(".5".parse::<Money>(), Ok(Money::from_cents(50)));
        assert_eq!("-3.10".parse::<Money>(), Ok(Money::from_cents(-310)));
        assert_eq!(" 7 ".parse::<Money>(), Ok(Money::from_units(7)));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("".parse::<Money>(), Err(ParseMoneyError::Empty));
        assert!(matches!(
            "1.234".parse::<Money>(),
            Err(ParseMoneyError::TooPrecise(_))
        ));
        assert!(matches!(
            "$10".parse::<Money>(),
            Err(ParseMoneyError::InvalidCharacter(_))
        ));
        assert!(matches!(
            ".".parse::<Money>(),
            Err(ParseMoneyError::InvalidCharacter(_))
        ));
        assert!(matches!(
            "99999999999999999999".parse::<Money>(),
            Err(ParseMoneyError::Overflow(_))
        ));
    }

    #[test]
    fn display_parse_is_stable() {
        let amount = Money::from_cents(123_456);
        assert_eq!(amount.to_string().parse::<Money>(), Ok(amount));
    }

    #[test]
    fn default_is_zero() {
        assert_eq!(Money::default(), Money::zero());
    }

    #[test]
    fn arithmetic() {
        let mut a = Money::from_cents(100);
        a += Money::from_cents(50);
        assert_eq!(a, Money::from_cents(150));
        a -= Money::from_cents(30);
        assert_eq!(a, Money::from_cents(120));
        assert_eq!(a - Money::from_cents(20), Money::from_cents(100));
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn sum() {
        let total: Money = [1, 2, 3].into_iter().map(Money::from_units).sum();
        assert_eq!(total, Money::from_units(6));
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let values: Vec<Money> = serde_json::from_str(r#"[100, 2.5, "3.75", 0.1]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Money::from_units(100),
                Money::from_cents(250),
                Money::from_cents(375),
                Money::from_cents(10),
            ]
        );
    }

    #[test]
    fn serializes_as_number() {
        let json = serde_json::to_string(&Money::from_cents(25_050)).unwrap();
        assert_eq!(json, "250.5");
    }
}
