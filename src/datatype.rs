// used for timestamps in the database
use chrono::{Datelike, NaiveDate, NaiveDateTime};

// used to validate time literals before handing them to chrono
use lazy_static::lazy_static;
use regex::Regex;

use serde::{Deserialize, Serialize};

// used to print out readable forms of a data type
use std::fmt;
use std::cmp::Ordering;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::{Result, TgisError};

lazy_static! {
    static ref DATE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref DATE_TIME: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?$").unwrap();
}

/// Years whose text form has four digits and parses back.
pub const YEARS: RangeInclusive<i32> = 0..=9999;

// ------------- TimeUnit -------------
/// Units of relative time, ordered from the finest to the coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 6] = [
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
        TimeUnit::Months,
        TimeUnit::Years,
    ];
    pub fn plural(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
        }
    }
    pub fn singular(&self) -> &'static str {
        let plural = self.plural();
        &plural[..plural.len() - 1]
    }
    /// Picks the singular or plural spelling for a count.
    pub fn label(&self, count: i64) -> &'static str {
        if count == 1 { self.singular() } else { self.plural() }
    }
}
impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.plural())
    }
}
impl FromStr for TimeUnit {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        TimeUnit::ALL
            .into_iter()
            .find(|u| s == u.plural() || s == u.singular())
            .ok_or_else(|| TgisError::parse(format!("unknown time unit '{}'", s)))
    }
}

// ------------- TemporalType -------------
/// Absolute (calendar) or relative (numeric offset in a unit) time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalType {
    Absolute,
    Relative(TimeUnit),
}

impl TemporalType {
    pub fn name(&self) -> &'static str {
        match self {
            TemporalType::Absolute => "absolute",
            TemporalType::Relative(_) => "relative",
        }
    }
    pub fn unit(&self) -> Option<TimeUnit> {
        match self {
            TemporalType::Absolute => None,
            TemporalType::Relative(unit) => Some(*unit),
        }
    }
}
impl fmt::Display for TemporalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TemporalType::Absolute => write!(f, "absolute"),
            TemporalType::Relative(unit) => write!(f, "relative ({})", unit),
        }
    }
}

// ------------- Extent -------------
/// A start with an optional end. No end means a single point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent<T> {
    pub start: T,
    pub end: Option<T>,
}

impl<T: Ord + Copy> Extent<T> {
    pub fn new(start: T, end: Option<T>) -> Self {
        Self { start, end }
    }
    pub fn point(start: T) -> Self {
        Self { start, end: None }
    }
    pub fn interval(start: T, end: T) -> Self {
        Self { start, end: Some(end) }
    }
    pub fn is_point(&self) -> bool {
        self.end.is_none()
    }
    pub fn is_interval(&self) -> bool {
        self.end.is_some()
    }
    /// An interval that ends before it starts.
    pub fn is_malformed(&self) -> bool {
        matches!(self.end, Some(end) if end < self.start)
    }
}

// ------------- TimePoint -------------
/// A single instant, used where start and end times are handled one at a time
/// (persisted columns, aggregated extents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePoint {
    Absolute(NaiveDateTime),
    Relative(i64),
}

impl PartialOrd for TimePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (TimePoint::Absolute(a), TimePoint::Absolute(b)) => Some(a.cmp(b)),
            (TimePoint::Relative(a), TimePoint::Relative(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}
impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimePoint::Absolute(t) => write!(f, "{}", format_datetime(t)),
            TimePoint::Relative(t) => write!(f, "{}", t),
        }
    }
}

// ------------- TemporalValue -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsoluteTime {
    pub extent: Extent<NaiveDateTime>,
    /// offset from UTC in hours, informational only
    pub timezone: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativeTime {
    pub extent: Extent<i64>,
    pub unit: TimeUnit,
}

/// The valid time of a map or a space time dataset.
///
/// Values are immutable: an owner replaces its value wholesale. An interval
/// with `end < start` can be represented, but is refused by the relation
/// classifier and by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalValue {
    Absolute(AbsoluteTime),
    Relative(RelativeTime),
}

impl TemporalValue {
    pub fn absolute(start: NaiveDateTime, end: Option<NaiveDateTime>) -> Self {
        TemporalValue::Absolute(AbsoluteTime {
            extent: Extent::new(start, end),
            timezone: None,
        })
    }
    pub fn relative(start: i64, end: Option<i64>, unit: TimeUnit) -> Self {
        TemporalValue::Relative(RelativeTime {
            extent: Extent::new(start, end),
            unit,
        })
    }
    /// Parses ISO like time literals, e.g. `2001-01-01` or `2001-01-01 12:00:00`.
    pub fn parse_absolute(start: &str, end: Option<&str>) -> Result<Self> {
        let start = parse_datetime(start)?;
        let end = end.map(parse_datetime).transpose()?;
        Ok(Self::absolute(start, end))
    }
    pub fn with_timezone(self, timezone: i32) -> Self {
        match self {
            TemporalValue::Absolute(a) => TemporalValue::Absolute(AbsoluteTime {
                timezone: Some(timezone),
                ..a
            }),
            relative => relative,
        }
    }
    /// Builds a value from persisted start and end points of the given type.
    pub fn from_points(
        temporal_type: TemporalType,
        start: TimePoint,
        end: Option<TimePoint>,
        timezone: Option<i32>,
    ) -> Result<Self> {
        let value = match (temporal_type, start, end) {
            (TemporalType::Absolute, TimePoint::Absolute(s), None) => {
                Ok(Self::absolute(s, None))
            }
            (TemporalType::Absolute, TimePoint::Absolute(s), Some(TimePoint::Absolute(e))) => {
                Ok(Self::absolute(s, Some(e)))
            }
            (TemporalType::Relative(unit), TimePoint::Relative(s), None) => {
                Ok(Self::relative(s, None, unit))
            }
            (TemporalType::Relative(unit), TimePoint::Relative(s), Some(TimePoint::Relative(e))) => {
                Ok(Self::relative(s, Some(e), unit))
            }
            _ => Err(TgisError::corruption(format!(
                "time points {:?}/{:?} do not match {} time",
                start, end, temporal_type
            ))),
        }?;
        Ok(match timezone {
            Some(tz) => value.with_timezone(tz),
            None => value,
        })
    }
    pub fn temporal_type(&self) -> TemporalType {
        match self {
            TemporalValue::Absolute(_) => TemporalType::Absolute,
            TemporalValue::Relative(r) => TemporalType::Relative(r.unit),
        }
    }
    pub fn start(&self) -> TimePoint {
        match self {
            TemporalValue::Absolute(a) => TimePoint::Absolute(a.extent.start),
            TemporalValue::Relative(r) => TimePoint::Relative(r.extent.start),
        }
    }
    pub fn end(&self) -> Option<TimePoint> {
        match self {
            TemporalValue::Absolute(a) => a.extent.end.map(TimePoint::Absolute),
            TemporalValue::Relative(r) => r.extent.end.map(TimePoint::Relative),
        }
    }
    pub fn timezone(&self) -> Option<i32> {
        match self {
            TemporalValue::Absolute(a) => a.timezone,
            TemporalValue::Relative(_) => None,
        }
    }
    pub fn is_point(&self) -> bool {
        self.end().is_none()
    }
    pub fn is_interval(&self) -> bool {
        self.end().is_some()
    }
    /// Fails with `MalformedInterval` when the end lies before the start.
    pub fn check_interval(&self) -> Result<()> {
        let malformed = match self {
            TemporalValue::Absolute(a) => a.extent.is_malformed(),
            TemporalValue::Relative(r) => r.extent.is_malformed(),
        };
        if malformed {
            return Err(TgisError::MalformedInterval {
                start: self.start().to_string(),
                end: self.end().map(|e| e.to_string()).unwrap_or_default(),
            });
        }
        Ok(())
    }
    /// Fails with `OutOfRange` when an absolute time stamp has a year that
    /// can not be stored.
    pub fn check_years(&self) -> Result<()> {
        if let TemporalValue::Absolute(a) = self {
            check_year(&a.extent.start)?;
            if let Some(end) = &a.extent.end {
                check_year(end)?;
            }
        }
        Ok(())
    }
    /// Everything a stored valid time must satisfy.
    pub fn validate(&self) -> Result<()> {
        self.check_interval()?;
        self.check_years()
    }
}
impl fmt::Display for TemporalValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.end() {
            Some(end) => write!(f, "{} - {}", self.start(), end)?,
            None => write!(f, "{}", self.start())?,
        }
        if let TemporalValue::Relative(r) = self {
            write!(f, " {}", r.unit)?;
        }
        Ok(())
    }
}

// ------------- Parsing -------------
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if DATE.is_match(s) {
        return NaiveDate::from_str(s)
            .map(|d| d.and_time(chrono::NaiveTime::MIN))
            .map_err(|e| TgisError::parse(format!("invalid date '{}': {}", s, e)));
    }
    if DATE_TIME.is_match(s) {
        let normalized = s.replacen('T', " ", 1);
        let format = match normalized.len() {
            16 => "%Y-%m-%d %H:%M",
            19 => "%Y-%m-%d %H:%M:%S",
            _ => "%Y-%m-%d %H:%M:%S%.f",
        };
        return NaiveDateTime::parse_from_str(&normalized, format)
            .map_err(|e| TgisError::parse(format!("invalid date time '{}': {}", s, e)));
    }
    Err(TgisError::parse(format!(
        "'{}' is not a supported time literal (YYYY-MM-DD[ HH:MM[:SS[.s]]])",
        s
    )))
}

pub fn check_year(t: &NaiveDateTime) -> Result<()> {
    if YEARS.contains(&t.year()) {
        Ok(())
    } else {
        Err(TgisError::OutOfRange(t.to_string()))
    }
}

/// The text form used both for display and for persisted columns, so that
/// lexical order equals temporal order.
pub fn format_datetime(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_literals() {
        let d = parse_datetime("2001-01-01").unwrap();
        assert_eq!(format_datetime(&d), "2001-01-01 00:00:00");
        let dt = parse_datetime("2001-01-01T12:30:05").unwrap();
        assert_eq!(format_datetime(&dt), "2001-01-01 12:30:05");
        let hm = parse_datetime("2001-01-01 12:30").unwrap();
        assert_eq!(format_datetime(&hm), "2001-01-01 12:30:00");
        assert!(parse_datetime("01/01/2001").is_err());
        assert!(parse_datetime("2001-13-01").is_err());
    }

    #[test]
    fn unit_spellings() {
        assert_eq!("day".parse::<TimeUnit>().unwrap(), TimeUnit::Days);
        assert_eq!("Months".parse::<TimeUnit>().unwrap(), TimeUnit::Months);
        assert_eq!(TimeUnit::Hours.label(1), "hour");
        assert_eq!(TimeUnit::Hours.label(2), "hours");
        assert!("fortnight".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn malformed_interval_is_representable_but_checked() {
        let v = TemporalValue::relative(10, Some(5), TimeUnit::Days);
        assert!(v.is_interval());
        assert!(matches!(v.check_interval(), Err(TgisError::MalformedInterval { .. })));
        assert!(TemporalValue::relative(5, Some(5), TimeUnit::Days).check_interval().is_ok());
    }

    #[test]
    fn years_beyond_four_digits_are_refused() {
        let last = parse_datetime("9999-12-31 23:59:59").unwrap();
        assert!(TemporalValue::absolute(last, None).validate().is_ok());
        let next = last + chrono::TimeDelta::seconds(1);
        assert_eq!(format_datetime(&next), "+10000-01-01 00:00:00");
        let value = TemporalValue::absolute(last, Some(next));
        assert!(matches!(value.validate(), Err(TgisError::OutOfRange(_))));
        assert!(value.check_interval().is_ok());
        assert!(TemporalValue::relative(i64::MAX, None, TimeUnit::Years).validate().is_ok());
    }

    #[test]
    fn time_points_of_different_kinds_do_not_compare() {
        let a = TimePoint::Relative(1);
        let b = TimePoint::Absolute(parse_datetime("2001-01-01").unwrap());
        assert_eq!(a.partial_cmp(&b), None);
        assert!(TimePoint::Relative(1) < TimePoint::Relative(2));
    }
}
