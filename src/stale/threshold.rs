use std::fmt::{self, Display};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::OnceLock;

use derive_more::Into;
use regex_lite::{Regex, RegexBuilder};
use time::{Date, Month, OffsetDateTime};

use crate::error::StaleError;

pub const DEFAULT_DAYS_UNTIL_STALE: u32 = 90;

/// The largest accepted day count. Keeps `now - days` inside the representable date range.
pub const MAX_DAYS_UNTIL_STALE: u32 = 3_000_000;

/// The administrator-configured age limit. Between one and [`MAX_DAYS_UNTIL_STALE`] days.
#[derive(Into, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaysUntilStale(NonZeroU32);

impl DaysUntilStale {
    pub fn new(days: u32) -> Option<Self> {
        if days > MAX_DAYS_UNTIL_STALE {
            return None;
        }

        NonZeroU32::new(days).map(Self)
    }

    /// Coerces any integer into a valid day count by clamping it into the accepted range.
    pub fn clamped(days: i64) -> Self {
        let days = days.clamp(1, MAX_DAYS_UNTIL_STALE.into()) as u32;

        Self(NonZeroU32::new(days).unwrap_or(NonZeroU32::MIN))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl Default for DaysUntilStale {
    fn default() -> Self {
        Self::clamped(DEFAULT_DAYS_UNTIL_STALE.into())
    }
}

impl FromStr for DaysUntilStale {
    type Err = StaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let days = s
            .trim()
            .parse::<i64>()
            .map_err(|e| StaleError::invalid_threshold(format!("`{s}` is not a day count: {e}")))?;

        u32::try_from(days)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| {
                StaleError::invalid_threshold(format!(
                    "{days} is not a day count between 1 and {MAX_DAYS_UNTIL_STALE}"
                ))
            })
    }
}

impl Display for DaysUntilStale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// A positive calendar offset into the past, e.g. `90 days` or `3 months`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    amount: NonZeroU32,
    unit: Unit,
}

impl Threshold {
    pub fn new(amount: u32, unit: Unit) -> Result<Self, StaleError> {
        let amount = NonZeroU32::new(amount)
            .ok_or_else(|| StaleError::invalid_threshold("the threshold must be positive"))?;

        Ok(Self { amount, unit })
    }

    pub fn days(days: DaysUntilStale) -> Self {
        Self {
            amount: days.into(),
            unit: Unit::Day,
        }
    }

    pub fn amount(&self) -> u32 {
        self.amount.get()
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Returns `now` moved back by this threshold.
    ///
    /// Months and years are calendar offsets. When the target month is shorter, the excess days
    /// roll over into the following month (`2026-05-31 - 3 months = 2026-03-03`).
    pub fn cutoff(&self, now: OffsetDateTime) -> Result<OffsetDateTime, StaleError> {
        let amount = self.amount.get();

        let cutoff = match self.unit {
            Unit::Day => now.checked_sub(time::Duration::days(amount.into())),
            Unit::Week => now.checked_sub(time::Duration::weeks(amount.into())),
            Unit::Month => months_before(now, amount.into()),
            Unit::Year => months_before(now, i64::from(amount) * 12),
        };

        cutoff.ok_or_else(|| {
            StaleError::invalid_threshold(format!("`{self}` before {now} is out of range"))
        })
    }
}

fn months_before(now: OffsetDateTime, months: i64) -> Option<OffsetDateTime> {
    let total = i64::from(now.year()) * 12 + i64::from(u8::from(now.month())) - 1 - months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(total.rem_euclid(12) + 1).ok()?).ok()?;
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    let date = first.checked_add(time::Duration::days(i64::from(now.day()) - 1))?;

    Some(now.replace_date(date))
}

impl FromStr for Threshold {
    type Err = StaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static REGEXP: OnceLock<Regex> = OnceLock::new();

        let regexp = REGEXP.get_or_init(|| {
            RegexBuilder::new(
                r"
                ^ \s*
                (?<sign> [-+])?
                (?<amount> \d+) [\s_]*
                (?<unit> day|week|month|year) s?
                \s* $",
            )
            .ignore_whitespace(true)
            .case_insensitive(true)
            .build()
            .unwrap()
        });

        let Some(captures) = regexp.captures(s) else {
            return Err(StaleError::invalid_threshold(format!(
                "`{s}` is not a duration like `90 days` or `3 months`"
            )));
        };

        if captures.name("sign").is_some_and(|m| m.as_str() == "-") {
            return Err(StaleError::invalid_threshold(format!(
                "`{s}` is negative; the threshold must be positive"
            )));
        }

        let amount = captures["amount"]
            .parse::<u32>()
            .map_err(|e| StaleError::invalid_threshold(format!("could not parse `{s}`: {e}")))?;
        let unit = match captures["unit"].to_ascii_lowercase().as_str() {
            "day" => Unit::Day,
            "week" => Unit::Week,
            "month" => Unit::Month,
            _ => Unit::Year,
        };

        Self::new(amount, unit)
    }
}

impl Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self.amount();
        let suffix = if amount == 1 { "" } else { "s" };

        write!(f, "{amount} {}{suffix}", self.unit().as_str())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_parse_thresholds() {
        let cases = [
            ("90 days", 90, Unit::Day),
            ("90_days", 90, Unit::Day),
            ("1_year", 1, Unit::Year),
            ("3 Months", 3, Unit::Month),
            ("  2 weeks ", 2, Unit::Week),
            ("+1 day", 1, Unit::Day),
            ("60days", 60, Unit::Day),
        ];

        for (input, amount, unit) in cases {
            let threshold: Threshold = input.parse().unwrap();
            assert_eq!((threshold.amount(), threshold.unit()), (amount, unit), "{input}");
        }
    }

    #[test]
    fn test_reject_invalid_thresholds() {
        for input in ["", "0 days", "-3 months", "days", "3 fortnights", "99999999999 days"] {
            assert!(
                matches!(input.parse::<Threshold>(), Err(StaleError::InvalidThreshold(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Threshold::new(1, Unit::Year).unwrap().to_string(), "1 year");
        assert_eq!(Threshold::new(60, Unit::Day).unwrap().to_string(), "60 days");
    }

    #[test]
    fn test_cutoff_days_and_weeks() {
        let now = datetime!(2026-10-19 12:00 UTC);

        assert_eq!(
            "60 days".parse::<Threshold>().unwrap().cutoff(now).unwrap(),
            datetime!(2026-08-20 12:00 UTC)
        );
        assert_eq!(
            "2 weeks".parse::<Threshold>().unwrap().cutoff(now).unwrap(),
            datetime!(2026-10-05 12:00 UTC)
        );
    }

    #[test]
    fn test_cutoff_calendar_months() {
        let now = datetime!(2026-05-31 08:30 UTC);

        assert_eq!(
            "3 months".parse::<Threshold>().unwrap().cutoff(now).unwrap(),
            datetime!(2026-03-03 08:30 UTC)
        );
        assert_eq!(
            "5 months".parse::<Threshold>().unwrap().cutoff(now).unwrap(),
            datetime!(2025-12-31 08:30 UTC)
        );
        assert_eq!(
            "1 month".parse::<Threshold>().unwrap().cutoff(now).unwrap(),
            datetime!(2026-05-01 08:30 UTC)
        );
        assert_eq!(
            "1 year".parse::<Threshold>().unwrap().cutoff(datetime!(2028-02-29 00:00 UTC)).unwrap(),
            datetime!(2027-03-01 00:00 UTC)
        );
    }

    #[test]
    fn test_cutoff_out_of_range() {
        let threshold = Threshold::new(u32::MAX, Unit::Year).unwrap();

        assert!(matches!(
            threshold.cutoff(datetime!(2026-10-19 12:00 UTC)),
            Err(StaleError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_days_until_stale() {
        assert_eq!(DaysUntilStale::default().get(), 90);
        assert_eq!(DaysUntilStale::clamped(0).get(), 1);
        assert_eq!(DaysUntilStale::clamped(-15).get(), 1);
        assert_eq!(DaysUntilStale::clamped(365).get(), 365);
        assert_eq!(DaysUntilStale::clamped(i64::MAX).get(), MAX_DAYS_UNTIL_STALE);
        assert_eq!(DaysUntilStale::new(MAX_DAYS_UNTIL_STALE + 1), None);
        assert_eq!("365".parse::<DaysUntilStale>().unwrap().get(), 365);
        assert!("0".parse::<DaysUntilStale>().is_err());
        assert!("-1".parse::<DaysUntilStale>().is_err());
        assert!("soon".parse::<DaysUntilStale>().is_err());
        assert!("4294967295".parse::<DaysUntilStale>().is_err());
    }

    #[test]
    fn test_largest_day_count_has_a_cutoff() {
        let days = DaysUntilStale::clamped(i64::MAX);

        assert!(Threshold::days(days).cutoff(datetime!(2026-10-19 12:00 UTC)).is_ok());
    }
}
