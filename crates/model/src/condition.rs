//! Predicates for the `continueIf` / `stopIf` flow-control commands.
//!
//! Price tests are evaluated against the bid/ask midpoint, position tests
//! against the signed position size, date tests at day precision in UTC and
//! time tests against `HH:mm` UTC today.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Error parsing a condition name or its value.
#[derive(Debug, Clone, Error)]
pub enum ParseConditionError {
    #[error("unknown condition '{0}'")]
    UnknownName(String),

    #[error("condition '{name}' has invalid value '{value}'")]
    InvalidValue { name: String, value: String },
}

/// A parsed predicate, ready to evaluate against live inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    Never,
    IsAfterDate(NaiveDate),
    IsOnOrAfterDate(NaiveDate),
    IsBeforeDate(NaiveDate),
    IsOnOrBeforeDate(NaiveDate),
    IsSameDate(NaiveDate),
    IsAfterTime(NaiveTime),
    IsBeforeTime(NaiveTime),
    PositionLessThan(Decimal),
    PositionGreaterThan(Decimal),
    PositionLessThanEq(Decimal),
    PositionGreaterThanEq(Decimal),
    PositionLong,
    PositionShort,
    PositionNone,
    PriceLessThan(Decimal),
    PriceGreaterThan(Decimal),
    PriceLessThanEq(Decimal),
    PriceGreaterThanEq(Decimal),
}

/// Live values a condition is tested against.
#[derive(Debug, Clone, Copy)]
pub struct ConditionInputs {
    /// Bid/ask midpoint.
    pub mid_price: Decimal,
    /// Signed position size (positive long, negative short).
    pub position: Decimal,
    /// Evaluation instant.
    pub now: DateTime<Utc>,
}

impl Condition {
    /// Parse a condition from its name and value strings.
    ///
    /// `always`/`never` accept `true`/`false` as aliases; their value is
    /// ignored. Date values are `YYYY-MM-DD`, time values `HH:mm`.
    pub fn parse(name: &str, value: &str) -> Result<Self, ParseConditionError> {
        let lname = name.trim().to_lowercase();
        let value = value.trim();
        let bad_value = || ParseConditionError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };
        let date = || NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| bad_value());
        let time = || NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| bad_value());
        let number = || Decimal::from_str(value).map_err(|_| bad_value());

        Ok(match lname.as_str() {
            "always" | "true" => Self::Always,
            "never" | "false" => Self::Never,
            "isafterdate" => Self::IsAfterDate(date()?),
            "isonorafterdate" => Self::IsOnOrAfterDate(date()?),
            "isbeforedate" => Self::IsBeforeDate(date()?),
            "isonorbeforedate" => Self::IsOnOrBeforeDate(date()?),
            "issamedate" => Self::IsSameDate(date()?),
            "isaftertime" => Self::IsAfterTime(time()?),
            "isbeforetime" => Self::IsBeforeTime(time()?),
            "positionlessthan" => Self::PositionLessThan(number()?),
            "positiongreaterthan" => Self::PositionGreaterThan(number()?),
            "positionlessthaneq" => Self::PositionLessThanEq(number()?),
            "positiongreaterthaneq" => Self::PositionGreaterThanEq(number()?),
            "positionlong" => Self::PositionLong,
            "positionshort" => Self::PositionShort,
            "positionnone" => Self::PositionNone,
            "pricelessthan" => Self::PriceLessThan(number()?),
            "pricegreaterthan" => Self::PriceGreaterThan(number()?),
            "pricelessthaneq" => Self::PriceLessThanEq(number()?),
            "pricegreaterthaneq" => Self::PriceGreaterThanEq(number()?),
            _ => return Err(ParseConditionError::UnknownName(name.to_string())),
        })
    }

    /// Whether evaluation reads the market price.
    pub fn needs_price(&self) -> bool {
        matches!(
            self,
            Self::PriceLessThan(_)
                | Self::PriceGreaterThan(_)
                | Self::PriceLessThanEq(_)
                | Self::PriceGreaterThanEq(_)
        )
    }

    /// Whether evaluation reads the position size.
    pub fn needs_position(&self) -> bool {
        matches!(
            self,
            Self::PositionLessThan(_)
                | Self::PositionGreaterThan(_)
                | Self::PositionLessThanEq(_)
                | Self::PositionGreaterThanEq(_)
                | Self::PositionLong
                | Self::PositionShort
                | Self::PositionNone
        )
    }

    /// Evaluate the predicate.
    pub fn evaluate(&self, inputs: &ConditionInputs) -> bool {
        let today = inputs.now.date_naive();
        // Compare at minute precision so "14:30" matches the whole minute.
        let minute_now = inputs
            .now
            .time()
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or_else(|| inputs.now.time());

        match self {
            Self::Always => true,
            Self::Never => false,
            Self::IsAfterDate(d) => today > *d,
            Self::IsOnOrAfterDate(d) => today >= *d,
            Self::IsBeforeDate(d) => today < *d,
            Self::IsOnOrBeforeDate(d) => today <= *d,
            Self::IsSameDate(d) => today == *d,
            Self::IsAfterTime(t) => minute_now > *t,
            Self::IsBeforeTime(t) => minute_now < *t,
            Self::PositionLessThan(n) => inputs.position < *n,
            Self::PositionGreaterThan(n) => inputs.position > *n,
            Self::PositionLessThanEq(n) => inputs.position <= *n,
            Self::PositionGreaterThanEq(n) => inputs.position >= *n,
            Self::PositionLong => inputs.position > Decimal::ZERO,
            Self::PositionShort => inputs.position < Decimal::ZERO,
            Self::PositionNone => inputs.position == Decimal::ZERO,
            Self::PriceLessThan(n) => inputs.mid_price < *n,
            Self::PriceGreaterThan(n) => inputs.mid_price > *n,
            Self::PriceLessThanEq(n) => inputs.mid_price <= *n,
            Self::PriceGreaterThanEq(n) => inputs.mid_price >= *n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn inputs(mid: Decimal, position: Decimal) -> ConditionInputs {
        ConditionInputs {
            mid_price: mid,
            position,
            now: Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 45).unwrap(),
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Condition::parse("always", "").unwrap(), Condition::Always);
        assert_eq!(Condition::parse("TRUE", "x").unwrap(), Condition::Always);
        assert_eq!(Condition::parse("never", "").unwrap(), Condition::Never);
        assert_eq!(Condition::parse("false", "").unwrap(), Condition::Never);
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            Condition::parse("sometimes", ""),
            Err(ParseConditionError::UnknownName(_))
        ));
    }

    #[test]
    fn test_parse_bad_value() {
        assert!(matches!(
            Condition::parse("priceLessThan", "cheap"),
            Err(ParseConditionError::InvalidValue { .. })
        ));
        assert!(matches!(
            Condition::parse("isAfterDate", "June 1st"),
            Err(ParseConditionError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_price_conditions() {
        let i = inputs(dec!(100), dec!(0));
        assert!(Condition::parse("priceLessThan", "101").unwrap().evaluate(&i));
        assert!(!Condition::parse("priceLessThan", "100").unwrap().evaluate(&i));
        assert!(Condition::parse("priceLessThanEq", "100").unwrap().evaluate(&i));
        assert!(Condition::parse("priceGreaterThan", "99").unwrap().evaluate(&i));
        assert!(Condition::parse("priceGreaterThanEq", "100").unwrap().evaluate(&i));
    }

    #[test]
    fn test_position_conditions() {
        let long = inputs(dec!(100), dec!(2));
        let short = inputs(dec!(100), dec!(-3));
        let flat = inputs(dec!(100), dec!(0));

        assert!(Condition::PositionLong.evaluate(&long));
        assert!(!Condition::PositionLong.evaluate(&short));
        assert!(Condition::PositionShort.evaluate(&short));
        assert!(Condition::PositionNone.evaluate(&flat));
        assert!(Condition::parse("positionGreaterThan", "1").unwrap().evaluate(&long));
        assert!(Condition::parse("positionLessThanEq", "-3").unwrap().evaluate(&short));
    }

    #[test]
    fn test_date_conditions() {
        let i = inputs(dec!(1), dec!(0)); // 2024-06-15
        assert!(Condition::parse("isAfterDate", "2024-06-14").unwrap().evaluate(&i));
        assert!(!Condition::parse("isAfterDate", "2024-06-15").unwrap().evaluate(&i));
        assert!(Condition::parse("isOnOrAfterDate", "2024-06-15").unwrap().evaluate(&i));
        assert!(Condition::parse("isBeforeDate", "2024-06-16").unwrap().evaluate(&i));
        assert!(Condition::parse("isSameDate", "2024-06-15").unwrap().evaluate(&i));
    }

    #[test]
    fn test_time_conditions() {
        let i = inputs(dec!(1), dec!(0)); // 14:30:45 UTC
        assert!(Condition::parse("isAfterTime", "14:00").unwrap().evaluate(&i));
        assert!(Condition::parse("isBeforeTime", "15:00").unwrap().evaluate(&i));
        // 14:30:45 compares equal to 14:30 at minute precision
        assert!(!Condition::parse("isAfterTime", "14:30").unwrap().evaluate(&i));
        assert!(!Condition::parse("isBeforeTime", "14:30").unwrap().evaluate(&i));
    }
}
