//! Outcomes, decimal odds, and the payout calculator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::Money;

/// One selectable side of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outcome '{0}'")]
pub struct UnknownOutcome(pub String);

impl FromStr for Outcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(Outcome::Home),
            "draw" => Ok(Outcome::Draw),
            "away" => Ok(Outcome::Away),
            _ => Err(UnknownOutcome(s.to_string())),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Decimal odds multiplier with 4 decimal places, stored as a scaled integer.
/// Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Odds(i64);

impl Odds {
    pub(crate) const SCALE: i64 = 10_000;

    pub fn from_scaled(value: i64) -> Option<Self> {
        (value > 0).then_some(Odds(value))
    }

    /// Returns `None` for zero, negative, or non-finite multipliers.
    pub fn from_float(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Self::from_scaled((value * Self::SCALE as f64).round() as i64)
    }

    pub fn scaled(self) -> i64 {
        self.0
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = format!("{:04}", self.0 % Self::SCALE);
        // keep at least two decimals: 2.5000 -> 2.50, 1.8333 -> 1.8333
        let trimmed = frac.trim_end_matches('0');
        let frac = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{whole}.{frac}")
    }
}

impl Serialize for Odds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_float())
    }
}

impl<'de> Deserialize<'de> for Odds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Odds::from_float(value)
            .ok_or_else(|| de::Error::custom(format!("odds must be positive, got {value}")))
    }
}

/// Potential payout of `stake` at `odds`: stake x multiplier, rounded half-up to the cent.
///
/// Absent odds give a zero payout, the display default before a selection is made.
pub fn potential_payout(stake: Money, odds: Option<Odds>) -> Money {
    let Some(odds) = odds else {
        return Money::zero();
    };
    let scale = Odds::SCALE as i128;
    let half = scale / 2;
    let product = stake.cents() as i128 * odds.scaled() as i128;
    let rounded = if product >= 0 {
        (product + half) / scale
    } else {
        (product - half) / scale
    };
    let cents = i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN });
    Money::from_cents(cents)
}

/// Per-outcome odds for one match. Outcomes missing from the map are not offered,
/// which is how two-way markets omit the draw.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OddsQuote(BTreeMap<Outcome, Odds>);

impl OddsQuote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a quote from wire floats; `None` and non-positive values are not offered.
    pub fn from_floats(home: Option<f64>, draw: Option<f64>, away: Option<f64>) -> Self {
        let entries = [
            (Outcome::Home, home),
            (Outcome::Draw, draw),
            (Outcome::Away, away),
        ];
        OddsQuote(
            entries
                .into_iter()
                .filter_map(|(outcome, value)| Some((outcome, Odds::from_float(value?)?)))
                .collect(),
        )
    }

    pub fn get(&self, outcome: Outcome) -> Option<Odds> {
        self.0.get(&outcome).copied()
    }

    pub fn is_offered(&self, outcome: Outcome) -> bool {
        self.0.contains_key(&outcome)
    }

    /// Offered outcomes in home, draw, away order.
    pub fn offered(&self) -> impl Iterator<Item = (Outcome, Odds)> + '_ {
        self.0.iter().map(|(outcome, odds)| (*outcome, *odds))
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for OddsQuote {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Outcome::ALL.len()))?;
        for outcome in Outcome::ALL {
            map.serialize_entry(outcome.as_str(), &self.get(outcome))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OddsQuote {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
        let mut quote = OddsQuote::new();
        for (key, value) in raw {
            // unrelated keys from the feed are ignored
            let Ok(outcome) = key.parse::<Outcome>() else {
                continue;
            };
            if let Some(odds) = value.and_then(Odds::from_float) {
                quote.0.insert(outcome, odds);
            }
        }
        Ok(quote)
    }
}
