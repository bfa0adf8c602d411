//! Granularity of space time datasets and calendar arithmetic on absolute time.
//!
//! The granularity of a dataset is the greatest common divisor of the lengths
//! of its member intervals and of the gaps between them. For absolute time the
//! divisor is expressed in the finest calendar unit that actually changes
//! across those lengths.

use chrono::{Datelike, Months, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::construct::Map;
use crate::datatype::{check_year, TemporalType, TemporalValue, TimePoint, TimeUnit};
use crate::error::{Result, TgisError};

// ------------- Granularity -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `<step> <unit>`, e.g. `1 month` or `6 hours`
    Absolute { step: i64, unit: TimeUnit },
    /// a step in the relative unit of the dataset
    Relative(i64),
}

impl Granularity {
    pub fn absolute(step: i64, unit: TimeUnit) -> Self {
        Granularity::Absolute { step, unit }
    }
    /// Parses a granularity that must fit the given temporal type.
    pub fn parse(s: &str, temporal_type: TemporalType) -> Result<Self> {
        let granularity: Granularity = s.parse()?;
        if !granularity.fits(temporal_type) {
            return Err(TgisError::parse(format!(
                "granularity '{}' does not fit {} time",
                s, temporal_type
            )));
        }
        Ok(granularity)
    }
    pub fn fits(&self, temporal_type: TemporalType) -> bool {
        matches!(
            (self, temporal_type),
            (Granularity::Absolute { .. }, TemporalType::Absolute)
                | (Granularity::Relative(_), TemporalType::Relative(_))
        )
    }
    /// The calendar increment of one absolute granule.
    pub fn increment(&self) -> Option<Increment> {
        let Granularity::Absolute { step, unit } = *self else {
            return None;
        };
        let mut increment = Increment::default();
        let slot = match unit {
            TimeUnit::Seconds => &mut increment.seconds,
            TimeUnit::Minutes => &mut increment.minutes,
            TimeUnit::Hours => &mut increment.hours,
            TimeUnit::Days => &mut increment.days,
            TimeUnit::Months => &mut increment.months,
            TimeUnit::Years => &mut increment.years,
        };
        *slot = step;
        Some(increment)
    }
    /// Moves a time point by `mult` granules.
    pub fn advance(&self, point: TimePoint, mult: i64) -> Result<TimePoint> {
        match (self, point) {
            (Granularity::Absolute { .. }, TimePoint::Absolute(t)) => {
                let increment = self.increment().unwrap_or_default();
                increment.apply(&t, mult).map(TimePoint::Absolute)
            }
            (Granularity::Relative(step), TimePoint::Relative(t)) => step
                .checked_mul(mult)
                .and_then(|offset| t.checked_add(offset))
                .map(TimePoint::Relative)
                .ok_or_else(|| {
                    TgisError::parse(format!("moving {} by {} granules of {} overflows", t, mult, self))
                }),
            _ => Err(TgisError::parse(format!("granularity '{}' does not fit time {}", self, point))),
        }
    }
    /// Moves both ends of the value by `mult` granules.
    pub fn shift(&self, value: &TemporalValue, mult: i64) -> Result<TemporalValue> {
        let start = self.advance(value.start(), mult)?;
        let end = value.end().map(|end| self.advance(end, mult)).transpose()?;
        TemporalValue::from_points(value.temporal_type(), start, end, value.timezone())
    }
}
impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Granularity::Absolute { step, unit } => write!(f, "{} {}", step, unit.label(*step)),
            Granularity::Relative(step) => write!(f, "{}", step),
        }
    }
}
impl FromStr for Granularity {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(step) = s.parse::<i64>() {
            return Ok(Granularity::Relative(step));
        }
        let parts: Vec<&str> = s.split(' ').collect();
        match parts.as_slice() {
            [step, unit] => {
                let step = step
                    .parse::<i64>()
                    .map_err(|_| TgisError::parse(format!("invalid granularity '{}'", s)))?;
                Ok(Granularity::absolute(step, unit.parse()?))
            }
            _ => Err(TgisError::parse(format!("invalid granularity '{}'", s))),
        }
    }
}

// ------------- Datetime delta -------------
/// The distance between two timestamps counted per calendar unit.
///
/// Each unit is only counted when it actually changes between the two
/// timestamps, e.g. the days of `2001-01-01 - 2001-02-01` are zero since both
/// fall on the first of the month. `months` is absent when the day of month
/// differs, as whole months can then not be counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatetimeDelta {
    pub years: i64,
    pub months: Option<i64>,
    pub days: i64,
    /// whole days between the timestamps, regardless of the calendar
    pub max_days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

pub fn compute_datetime_delta(start: &NaiveDateTime, end: &NaiveDateTime) -> DatetimeDelta {
    let day_diff = (*end - *start).num_days();
    let years = i64::from(end.year() - start.year());

    let months = if start.month() == 1 && end.month() == 1 {
        Some(0)
    } else if start.day() == 1 && end.day() == 1 {
        let d = i64::from(end.month()) - i64::from(start.month());
        Some(match d {
            d if d < 0 => d + 12 * years,
            0 => 12 * years,
            d => d,
        })
    } else {
        None
    };

    let days = if start.day() == 1 && end.day() == 1 { 0 } else { day_diff };

    let hours = if start.hour() == 0 && end.hour() == 0 {
        0
    } else {
        let d = i64::from(end.hour()) - i64::from(start.hour());
        if d < 0 { d + 24 + 24 * day_diff } else { d + 24 * day_diff }
    };

    let minutes = if start.minute() == 0 && end.minute() == 0 {
        0
    } else {
        let d = i64::from(end.minute()) - i64::from(start.minute());
        let carried = if hours != 0 { 60 * hours } else { 24 * 60 * day_diff };
        d + carried
    };

    let seconds = if start.second() == 0 && end.second() == 0 {
        0
    } else {
        let d = i64::from(end.second()) - i64::from(start.second());
        let carried = if minutes != 0 {
            60 * minutes
        } else if hours != 0 {
            3600 * hours
        } else {
            24 * 60 * 60 * day_diff
        };
        d + carried
    };

    DatetimeDelta {
        years,
        months,
        days,
        max_days: day_diff,
        hours,
        minutes,
        seconds,
    }
}

// ------------- Inference -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Unit(TimeUnit),
    MaxDays,
}

// scanned from the finest to the coarsest unit
const SLOTS: [Slot; 7] = [
    Slot::Unit(TimeUnit::Seconds),
    Slot::Unit(TimeUnit::Minutes),
    Slot::Unit(TimeUnit::Hours),
    Slot::MaxDays,
    Slot::Unit(TimeUnit::Days),
    Slot::Unit(TimeUnit::Months),
    Slot::Unit(TimeUnit::Years),
];

impl DatetimeDelta {
    fn slot(&self, slot: Slot) -> Option<i64> {
        match slot {
            Slot::Unit(TimeUnit::Seconds) => Some(self.seconds),
            Slot::Unit(TimeUnit::Minutes) => Some(self.minutes),
            Slot::Unit(TimeUnit::Hours) => Some(self.hours),
            Slot::MaxDays => Some(self.max_days),
            Slot::Unit(TimeUnit::Days) => Some(self.days),
            Slot::Unit(TimeUnit::Months) => self.months,
            Slot::Unit(TimeUnit::Years) => Some(self.years),
        }
    }
}

fn slot_index(slot: Slot) -> usize {
    SLOTS.iter().position(|s| *s == slot).unwrap_or(0)
}

/// Factors converting coarser slots into the assigned unit.
fn multipliers(unit: TimeUnit) -> &'static [(Slot, i64)] {
    match unit {
        TimeUnit::Seconds => &[
            (Slot::Unit(TimeUnit::Minutes), 60),
            (Slot::Unit(TimeUnit::Hours), 3600),
            (Slot::Unit(TimeUnit::Days), 24 * 3600),
            (Slot::MaxDays, 24 * 3600),
        ],
        TimeUnit::Minutes => &[
            (Slot::Unit(TimeUnit::Hours), 60),
            (Slot::Unit(TimeUnit::Days), 24 * 60),
            (Slot::MaxDays, 24 * 60),
        ],
        TimeUnit::Hours => &[(Slot::Unit(TimeUnit::Days), 24), (Slot::MaxDays, 24)],
        TimeUnit::Days => &[(Slot::MaxDays, 1)],
        TimeUnit::Months => &[(Slot::Unit(TimeUnit::Years), 12)],
        TimeUnit::Years => &[],
    }
}

fn record(delta: &DatetimeDelta, slots: &mut [BTreeSet<i64>; 7]) {
    for (i, slot) in SLOTS.iter().enumerate() {
        if let Some(value) = delta.slot(*slot) {
            if value > 0 {
                slots[i].insert(value);
                if *slot != Slot::MaxDays {
                    break;
                }
            }
        }
    }
}

pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn gcd_all(values: impl IntoIterator<Item = i64>) -> Option<i64> {
    values.into_iter().reduce(gcd)
}

/// True when `start` lies after the previous map, judged by its end if it has
/// one and by its start otherwise.
fn is_after<T: PartialOrd>(start: &T, previous_start: &T, previous_end: Option<&T>) -> bool {
    match previous_end {
        Some(end) => start > end,
        None => start > previous_start,
    }
}

/// Granularity of maps with absolute time, ordered by start time. Only
/// meaningful for maps that do not overlap.
pub fn infer_absolute_granularity(maps: &[Map]) -> Option<Granularity> {
    let extents: Vec<(NaiveDateTime, Option<NaiveDateTime>)> = maps
        .iter()
        .filter_map(|m| match m.temporal {
            Some(TemporalValue::Absolute(a)) => Some((a.extent.start, a.extent.end)),
            _ => None,
        })
        .collect();
    let (mut previous_start, mut previous_end) = *extents.first()?;

    let mut slots: [BTreeSet<i64>; 7] = Default::default();
    for (start, end) in &extents {
        if let Some(end) = end {
            record(&compute_datetime_delta(start, end), &mut slots);
        }
        if is_after(start, &previous_start, previous_end.as_ref()) {
            let from = previous_end.unwrap_or(previous_start);
            record(&compute_datetime_delta(&from, start), &mut slots);
        }
        previous_start = *start;
        previous_end = *end;
    }

    let unit = SLOTS.iter().enumerate().find_map(|(i, slot)| match slot {
        Slot::Unit(unit) if !slots[i].is_empty() => Some(*unit),
        _ => None,
    })?;
    let mut values: BTreeSet<i64> = slots[slot_index(Slot::Unit(unit))].clone();
    for (slot, factor) in multipliers(unit) {
        values.extend(slots[slot_index(*slot)].iter().map(|v| v * factor));
    }
    let step = gcd_all(values)?;
    Some(Granularity::absolute(step, unit))
}

/// Granularity of maps with relative time, ordered by start time. Only
/// meaningful for maps that do not overlap.
pub fn infer_relative_granularity(maps: &[Map]) -> Option<Granularity> {
    let extents: Vec<(i64, Option<i64>)> = maps
        .iter()
        .filter_map(|m| match m.temporal {
            Some(TemporalValue::Relative(r)) => Some((r.extent.start, r.extent.end)),
            _ => None,
        })
        .collect();
    let (mut previous_start, mut previous_end) = *extents.first()?;

    let mut deltas = BTreeSet::new();
    for (start, end) in &extents {
        if let Some(end) = end {
            deltas.insert(end.abs_diff(*start));
        }
        if is_after(start, &previous_start, previous_end.as_ref()) {
            deltas.insert(start.abs_diff(previous_end.unwrap_or(previous_start)));
        }
        previous_start = *start;
        previous_end = *end;
    }
    // distances beyond i64 can not be a step
    let steps = deltas.into_iter().filter(|d| *d > 0).filter_map(|d| i64::try_from(d).ok());
    gcd_all(steps).map(Granularity::Relative)
}

/// Dispatches on the temporal type of the maps.
pub fn infer_granularity(temporal_type: TemporalType, maps: &[Map]) -> Option<Granularity> {
    match temporal_type {
        TemporalType::Absolute => infer_absolute_granularity(maps),
        TemporalType::Relative(_) => infer_relative_granularity(maps),
    }
}

// ------------- Increments -------------
/// A calendar increment such as `"3 months, 2 days"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Increment {
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl FromStr for Increment {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        let mut increment = Increment::default();
        for part in s.split(',') {
            let fields: Vec<&str> = part.split_whitespace().collect();
            let [count, unit] = fields.as_slice() else {
                return Err(TgisError::parse(format!("wrong increment format '{}'", s)));
            };
            let count = count
                .parse::<i64>()
                .map_err(|_| TgisError::parse(format!("wrong increment format '{}'", s)))?;
            let slot = match unit.to_lowercase().trim_end_matches('s') {
                "second" => &mut increment.seconds,
                "minute" => &mut increment.minutes,
                "hour" => &mut increment.hours,
                "day" => &mut increment.days,
                "week" => &mut increment.weeks,
                "month" => &mut increment.months,
                "year" => &mut increment.years,
                _ => return Err(TgisError::parse(format!("wrong increment format '{}'", s))),
            };
            *slot = count;
        }
        Ok(increment)
    }
}
impl Increment {
    /// Applies the increment `mult` times. Months and years follow the
    /// calendar, the day of month is clamped to the length of the target month.
    pub fn apply(&self, datetime: &NaiveDateTime, mult: i64) -> Result<NaiveDateTime> {
        let overflow = || TgisError::parse(format!("incrementing {} by {} overflows", datetime, self));
        let months = self
            .years
            .checked_mul(12)
            .and_then(|m| m.checked_add(self.months))
            .and_then(|m| m.checked_mul(mult))
            .ok_or_else(overflow)?;
        let calendar = u32::try_from(months.unsigned_abs())
            .map(Months::new)
            .map_err(|_| overflow())?;
        let shifted = if months >= 0 {
            datetime.checked_add_months(calendar)
        } else {
            datetime.checked_sub_months(calendar)
        }
        .ok_or_else(overflow)?;
        let seconds = [
            (self.weeks, 7 * 86_400),
            (self.days, 86_400),
            (self.hours, 3_600),
            (self.minutes, 60),
            (self.seconds, 1),
        ]
        .into_iter()
        .try_fold(0i64, |sum, (count, size)| count.checked_mul(size)?.checked_add(sum))
        .and_then(|s| s.checked_mul(mult))
        .ok_or_else(overflow)?;
        let delta = TimeDelta::try_seconds(seconds).ok_or_else(overflow)?;
        let result = shifted.checked_add_signed(delta).ok_or_else(overflow)?;
        check_year(&result)?;
        Ok(result)
    }
}
impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts = [
            (self.years, "year"),
            (self.months, "month"),
            (self.weeks, "week"),
            (self.days, "day"),
            (self.hours, "hour"),
            (self.minutes, "minute"),
            (self.seconds, "second"),
        ];
        let mut first = true;
        for (count, unit) in parts.into_iter().filter(|(count, _)| *count != 0) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{} {}{}", count, unit, if count == 1 { "" } else { "s" })?;
            first = false;
        }
        if first {
            write!(f, "0 seconds")?;
        }
        Ok(())
    }
}

/// Increments a timestamp by an increment string, `mult` times.
pub fn increment_datetime(datetime: &NaiveDateTime, increment: &str, mult: i64) -> Result<NaiveDateTime> {
    increment.parse::<Increment>()?.apply(datetime, mult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{Identity, MemberKind};
    use crate::datatype::parse_datetime;

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    fn absolute(start: &str, end: Option<&str>) -> Map {
        Map::new(Identity::new("a", "m").unwrap(), MemberKind::Raster)
            .with_time(TemporalValue::parse_absolute(start, end).unwrap())
    }

    fn relative(start: i64, end: Option<i64>) -> Map {
        Map::new(Identity::new("r", "m").unwrap(), MemberKind::Raster)
            .with_time(TemporalValue::relative(start, end, TimeUnit::Days))
    }

    #[test]
    fn granularity_strings() {
        assert_eq!("1 day".parse::<Granularity>().unwrap(), Granularity::absolute(1, TimeUnit::Days));
        assert_eq!("5 months".parse::<Granularity>().unwrap(), Granularity::absolute(5, TimeUnit::Months));
        assert_eq!("3".parse::<Granularity>().unwrap(), Granularity::Relative(3));
        assert!("1 secondo".parse::<Granularity>().is_err());
        assert!("bla second".parse::<Granularity>().is_err());
        assert!("bla".parse::<Granularity>().is_err());
        assert_eq!(Granularity::absolute(1, TimeUnit::Hours).to_string(), "1 hour");
        assert_eq!(Granularity::absolute(6, TimeUnit::Hours).to_string(), "6 hours");
        assert!(Granularity::parse("1 day", TemporalType::Relative(TimeUnit::Days)).is_err());
    }

    #[test]
    fn datetime_deltas() {
        let d = compute_datetime_delta(&dt("2001-01-01"), &dt("2001-02-01"));
        assert_eq!((d.months, d.days, d.max_days), (Some(1), 0, 31));
        let d = compute_datetime_delta(&dt("2001-01-01"), &dt("2002-01-01"));
        assert_eq!((d.years, d.months), (1, Some(0)));
        let d = compute_datetime_delta(&dt("2001-01-01 00:00:00"), &dt("2001-01-01 06:00:00"));
        assert_eq!((d.hours, d.minutes, d.seconds), (6, 0, 0));
        let d = compute_datetime_delta(&dt("2011-06-01 00:00:00"), &dt("2012-06-01 00:30:00"));
        assert_eq!(d.minutes, 527_070);
        let d = compute_datetime_delta(&dt("2011-06-01 00:00:00"), &dt("2012-06-01 00:00:05"));
        assert_eq!(d.seconds, 31_622_405);
    }

    #[test]
    fn absolute_inference() {
        let monthly = vec![
            absolute("2001-01-01", Some("2001-02-01")),
            absolute("2001-02-01", Some("2001-03-01")),
            absolute("2001-03-01", Some("2001-04-01")),
        ];
        assert_eq!(infer_absolute_granularity(&monthly), Some(Granularity::absolute(1, TimeUnit::Months)));

        let daily_with_gap = vec![
            absolute("2001-01-02", Some("2001-01-04")),
            absolute("2001-01-06", Some("2001-01-08")),
        ];
        assert_eq!(infer_absolute_granularity(&daily_with_gap), Some(Granularity::absolute(2, TimeUnit::Days)));

        let six_hourly = vec![
            absolute("2001-01-01 00:00:00", None),
            absolute("2001-01-01 06:00:00", None),
            absolute("2001-01-01 12:00:00", None),
        ];
        assert_eq!(infer_absolute_granularity(&six_hourly), Some(Granularity::absolute(6, TimeUnit::Hours)));
        assert_eq!(infer_absolute_granularity(&[]), None);
    }

    #[test]
    fn relative_inference() {
        let maps = vec![relative(0, Some(2)), relative(2, Some(4)), relative(8, Some(10))];
        assert_eq!(infer_relative_granularity(&maps), Some(Granularity::Relative(2)));
        let points = vec![relative(0, None), relative(3, None), relative(9, None)];
        assert_eq!(infer_relative_granularity(&points), Some(Granularity::Relative(3)));
        assert_eq!(infer_relative_granularity(&[relative(1, None)]), None);
        let far_apart = vec![relative(i64::MIN, None), relative(i64::MAX, None)];
        assert_eq!(infer_relative_granularity(&far_apart), None);
        let wide = vec![relative(-10, Some(i64::MAX)), relative(i64::MAX, Some(i64::MAX))];
        assert_eq!(infer_relative_granularity(&wide), None);
    }

    #[test]
    fn increments() {
        assert_eq!(increment_datetime(&dt("2001-01-01"), "3600 seconds", 1).unwrap(), dt("2001-01-01 01:00:00"));
        assert_eq!(increment_datetime(&dt("2001-01-01"), "30 days", 1).unwrap(), dt("2001-01-31"));
        assert_eq!(increment_datetime(&dt("2001-01-31"), "1 month", 1).unwrap(), dt("2001-02-28"));
        assert_eq!(increment_datetime(&dt("2001-01-01"), "1 month", 14).unwrap(), dt("2002-03-01"));
        assert_eq!(
            increment_datetime(
                &dt("2001-01-01"),
                "60 seconds, 4 minutes, 12 hours, 10 days, 1 weeks, 5 months, 1 years",
                1
            )
            .unwrap(),
            dt("2002-06-18 12:05:00")
        );
        assert_eq!(increment_datetime(&dt("2001-03-01"), "1 month", -1).unwrap(), dt("2001-02-01"));
        assert!(increment_datetime(&dt("2001-01-01"), "1 fortnight", 1).is_err());
    }

    #[test]
    fn huge_increments_fail_instead_of_wrapping() {
        let start = dt("2001-01-01");
        for increment in [
            "9999999999999999 weeks",
            "9223372036854775807 seconds, 1 minutes",
            "9223372036854775807 years",
            "768614336404564650 years, 12 months",
            "4294967296 months",
        ] {
            assert!(
                matches!(increment_datetime(&start, increment, 1), Err(TgisError::Parse { .. })),
                "{}",
                increment
            );
        }
        assert!(increment_datetime(&start, "1 day", i64::MAX).is_err());
        assert!(increment_datetime(&start, "1 month", i64::MIN).is_err());
        assert!(matches!(
            increment_datetime(&dt("9999-12-31"), "1 day", 1),
            Err(TgisError::OutOfRange(_))
        ));
        assert_eq!("3 months, 1 day".parse::<Increment>().unwrap().to_string(), "3 months, 1 day");
    }

    #[test]
    fn shifting_by_granules() {
        let monthly = Granularity::absolute(1, TimeUnit::Months);
        let january = TemporalValue::parse_absolute("2001-01-31", Some("2001-02-28")).unwrap();
        assert_eq!(
            monthly.shift(&january, 1).unwrap(),
            TemporalValue::parse_absolute("2001-02-28", Some("2001-03-28")).unwrap()
        );
        let zoned = TemporalValue::parse_absolute("2001-01-01", None).unwrap().with_timezone(2);
        assert_eq!(monthly.shift(&zoned, -2).unwrap().timezone(), Some(2));

        let step = Granularity::Relative(5);
        let days = TemporalValue::relative(1, Some(3), TimeUnit::Days);
        assert_eq!(step.shift(&days, 2).unwrap(), TemporalValue::relative(11, Some(13), TimeUnit::Days));
        assert!(step.shift(&january, 1).is_err());
        assert!(monthly.shift(&days, 1).is_err());
        assert!(step.shift(&TemporalValue::relative(i64::MAX, None, TimeUnit::Days), 1).is_err());
        assert_eq!(step.increment(), None);
        assert_eq!(Granularity::absolute(6, TimeUnit::Hours).increment().unwrap().hours, 6);
    }
}
