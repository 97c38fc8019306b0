//! Argument expression parsing: price offsets, durations and easing curves.
//!
//! Offsets are side-aware price displacements:
//!
//! - `100` - one hundred quote units away in the side-favourable direction
//! - `1%` - one percent of the current side-quoted price
//! - `@9000` - absolute price 9000
//!
//! Durations are a number with an optional unit suffix (`s`, `m`, `h`, `d`);
//! a bare number means seconds.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Error parsing an offset, duration or easing expression.
#[derive(Debug, Clone, Error)]
pub enum ParseExprError {
    #[error("invalid offset '{0}'")]
    Offset(String),

    #[error("invalid duration '{0}'")]
    Duration(String),

    #[error("invalid easing '{0}', expected 'linear', 'ease-in' or 'ease-out'")]
    Easing(String),
}

/// A price displacement, resolved against the current ticker at use time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSpec {
    /// Plain quote-unit distance in the side-favourable direction.
    Ticks(Decimal),
    /// Percentage of the current side-quoted price.
    Percent(Decimal),
    /// Absolute price.
    Absolute(Decimal),
}

impl fmt::Display for OffsetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticks(n) => write!(f, "{n}"),
            Self::Percent(p) => write!(f, "{p}%"),
            Self::Absolute(x) => write!(f, "@{x}"),
        }
    }
}

impl FromStr for OffsetSpec {
    type Err = ParseExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseExprError::Offset(s.to_string());

        if let Some(abs) = s.strip_prefix('@') {
            let price: Decimal = abs.trim().parse().map_err(|_| err())?;
            return Ok(Self::Absolute(price));
        }
        if let Some(pct) = s.strip_suffix('%') {
            let percent: Decimal = pct.trim().parse().map_err(|_| err())?;
            return Ok(Self::Percent(percent));
        }
        let ticks: Decimal = s.parse().map_err(|_| err())?;
        Ok(Self::Ticks(ticks))
    }
}

/// Parse a duration expression like `20`, `20s`, `5m`, `2h` or `1d`.
///
/// Bare numbers are seconds. Fractional values are accepted (`0.5s`).
pub fn parse_duration(s: &str) -> Result<Duration, ParseExprError> {
    let s = s.trim();
    let err = || ParseExprError::Duration(s.to_string());
    if s.is_empty() {
        return Err(err());
    }

    let (number, multiplier) = match s.chars().last() {
        Some('s') | Some('S') => (&s[..s.len() - 1], 1.0),
        Some('m') | Some('M') => (&s[..s.len() - 1], 60.0),
        Some('h') | Some('H') => (&s[..s.len() - 1], 3600.0),
        Some('d') | Some('D') => (&s[..s.len() - 1], 86_400.0),
        _ => (s, 1.0),
    };

    let value: f64 = number.trim().parse().map_err(|_| err())?;
    if !value.is_finite() || value < 0.0 {
        return Err(err());
    }
    Ok(Duration::from_secs_f64(value * multiplier))
}

/// Interpolation curve for scaled order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
}

impl Easing {
    /// Map `t` in `[0, 1]` through the curve.
    pub fn apply(&self, t: f64) -> f64 {
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}

impl FromStr for Easing {
    type Err = ParseExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "easein" | "ease-in" => Ok(Self::EaseIn),
            "easeout" | "ease-out" => Ok(Self::EaseOut),
            _ => Err(ParseExprError::Easing(s.to_string())),
        }
    }
}
