//! Temporal relations between valid times, after Allen's interval algebra.
//!
//! All relations are stated from the perspective of the first operand `a`
//! relative to the second operand `b`. A point in time is an [`Extent`]
//! without an end; the relations that need both ends (`starts`, `started`,
//! `finishes`, `finished`, `overlaps`, `overlapped`) never hold when either
//! side is a point.
//!
//! ```text
//! overlaps     A    |---------|     overlapped   A  |---------|
//!              B  |---------|                    B    |---------|
//! follows      A            |-----| precedes     A  |-----|
//!              B  |---------|                    B        |---------|
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::datatype::{Extent, TemporalValue};
use crate::error::{Result, TgisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalRelation {
    Equal,
    During,
    Contains,
    Overlaps,
    Overlapped,
    After,
    Before,
    Starts,
    Finishes,
    Started,
    Finished,
    Follows,
    Precedes,
}

impl TemporalRelation {
    /// The relations in the order in which the classifier tries them.
    pub const PRIORITY: [TemporalRelation; 13] = [
        TemporalRelation::Equal,
        TemporalRelation::During,
        TemporalRelation::Contains,
        TemporalRelation::Overlaps,
        TemporalRelation::Overlapped,
        TemporalRelation::After,
        TemporalRelation::Before,
        TemporalRelation::Starts,
        TemporalRelation::Finishes,
        TemporalRelation::Started,
        TemporalRelation::Finished,
        TemporalRelation::Follows,
        TemporalRelation::Precedes,
    ];

    /// The relation of `b` to `a` when `self` is the relation of `a` to `b`.
    pub fn inverse(&self) -> TemporalRelation {
        use TemporalRelation::*;
        match self {
            Equal => Equal,
            During => Contains,
            Contains => During,
            Overlaps => Overlapped,
            Overlapped => Overlaps,
            After => Before,
            Before => After,
            Starts => Started,
            Started => Starts,
            Finishes => Finished,
            Finished => Finishes,
            Follows => Precedes,
            Precedes => Follows,
        }
    }

    /// True for the relations that can only hold between two intervals.
    pub fn requires_intervals(&self) -> bool {
        use TemporalRelation::*;
        matches!(
            self,
            Starts | Started | Finishes | Finished | Overlaps | Overlapped
        )
    }

    /// True for the relations that place the first operand inside the second
    /// without coinciding with it: during, starts and finishes.
    pub fn is_within(&self) -> bool {
        matches!(
            self,
            TemporalRelation::During | TemporalRelation::Starts | TemporalRelation::Finishes
        )
    }

    pub fn name(&self) -> &'static str {
        use TemporalRelation::*;
        match self {
            Equal => "equal",
            During => "during",
            Contains => "contains",
            Overlaps => "overlaps",
            Overlapped => "overlapped",
            After => "after",
            Before => "before",
            Starts => "starts",
            Finishes => "finishes",
            Started => "started",
            Finished => "finished",
            Follows => "follows",
            Precedes => "precedes",
        }
    }

    /// Evaluates this single relation between `a` and `b`.
    pub fn holds<T: Ord + Copy>(&self, a: &Extent<T>, b: &Extent<T>) -> bool {
        use TemporalRelation::*;
        match self {
            Equal => equal(a, b),
            During => during(a, b),
            Contains => contains(a, b),
            Overlaps => overlaps(a, b),
            Overlapped => overlapped(a, b),
            After => after(a, b),
            Before => before(a, b),
            Starts => starts(a, b),
            Finishes => finishes(a, b),
            Started => started(a, b),
            Finished => finished(a, b),
            Follows => follows(a, b),
            Precedes => precedes(a, b),
        }
    }
}
impl fmt::Display for TemporalRelation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
impl FromStr for TemporalRelation {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        TemporalRelation::PRIORITY
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| TgisError::parse(format!("unknown temporal relation '{}'", s)))
    }
}

// ------------- Predicates -------------
pub fn equal<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (None, None) => a.start == b.start,
        (Some(a_end), Some(b_end)) => a.start == b.start && a_end == b_end,
        _ => false,
    }
}

pub fn during<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    let Some(b_end) = b.end else {
        return false;
    };
    match a.end {
        // a single point of time inside the interval
        None => a.start > b.start && a.start < b_end,
        Some(a_end) => a.start > b.start && a_end < b_end,
    }
}

pub fn contains<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    during(b, a)
}

pub fn overlaps<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a.start > b.start && a_end > b_end && a.start < b_end,
        _ => false,
    }
}

pub fn overlapped<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a.start < b.start && a_end < b_end && a_end > b.start,
        _ => false,
    }
}

pub fn after<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match b.end {
        None => a.start > b.start,
        Some(b_end) => a.start > b_end,
    }
}

pub fn before<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match a.end {
        None => a.start < b.start,
        Some(a_end) => a_end < b.start,
    }
}

pub fn starts<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a.start == b.start && a_end < b_end,
        _ => false,
    }
}

pub fn started<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a.start == b.start && a_end > b_end,
        _ => false,
    }
}

pub fn finishes<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a_end == b_end && a.start > b.start,
        _ => false,
    }
}

pub fn finished<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a_end == b_end && a.start < b.start,
        _ => false,
    }
}

pub fn follows<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    matches!(b.end, Some(b_end) if a.start == b_end)
}

pub fn precedes<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    matches!(a.end, Some(a_end) if a_end == b.start)
}

/// Meeting neighbours in either direction.
pub fn adjacent<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> bool {
    if a.end.is_none() && b.end.is_none() {
        return false;
    }
    follows(a, b) || precedes(a, b)
}

// ------------- Classifier -------------
/// Classifies two extents of the same time representation. The first
/// relation in [`TemporalRelation::PRIORITY`] that holds wins.
pub fn relation_of<T: Ord + Copy>(a: &Extent<T>, b: &Extent<T>) -> Option<TemporalRelation> {
    TemporalRelation::PRIORITY
        .into_iter()
        .find(|relation| relation.holds(a, b))
}

/// Classifies the relation of `a` to `b`.
///
/// Returns `Ok(None)` when no relation is computable: one value is absolute and
/// the other relative, or both are relative with different units. Fails with
/// `MalformedInterval` when either interval ends before it starts.
pub fn classify(a: &TemporalValue, b: &TemporalValue) -> Result<Option<TemporalRelation>> {
    a.check_interval()?;
    b.check_interval()?;
    Ok(match (a, b) {
        (TemporalValue::Absolute(a), TemporalValue::Absolute(b)) => {
            relation_of(&a.extent, &b.extent)
        }
        (TemporalValue::Relative(a), TemporalValue::Relative(b)) if a.unit == b.unit => {
            relation_of(&a.extent, &b.extent)
        }
        _ => None,
    })
}
