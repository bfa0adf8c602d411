//! Reductions that derive the state of a space time dataset from its members.
//!
//! The persisted recompute in [`crate::database`] stores the provisional
//! temporal extent, reads the stored end back and then settles the end time
//! and the map time classification with [`resolve_end_time`]. The remaining
//! reductions are pure functions of the member list.

use std::cmp::Ordering;

use crate::construct::{AggregateMetadata, Map, MapTime, SpatialExtent};
use crate::datatype::TimePoint;
use crate::error::{Result, TgisError};

/// The temporal bounds of a set of members, before end time defaulting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalBounds {
    pub min_start: TimePoint,
    pub max_start: TimePoint,
    /// `None` when every member is a point in time
    pub max_end: Option<TimePoint>,
}

fn compare(a: &TimePoint, b: &TimePoint) -> Result<Ordering> {
    a.partial_cmp(b).ok_or_else(|| {
        TgisError::corruption(format!(
            "registered maps mix absolute and relative time ({} and {})",
            a, b
        ))
    })
}

fn earliest(a: TimePoint, b: TimePoint) -> Result<TimePoint> {
    Ok(if compare(&b, &a)? == Ordering::Less { b } else { a })
}

fn latest(a: TimePoint, b: TimePoint) -> Result<TimePoint> {
    Ok(if compare(&b, &a)? == Ordering::Greater { b } else { a })
}

/// Minimum start, maximum start and maximum end over the members that carry a
/// valid time. `None` for an empty (or entirely untimed) membership.
pub fn temporal_bounds(members: &[Map]) -> Result<Option<TemporalBounds>> {
    let mut bounds: Option<TemporalBounds> = None;
    for temporal in members.iter().filter_map(|m| m.temporal.as_ref()) {
        let start = temporal.start();
        let end = temporal.end();
        bounds = Some(match bounds {
            None => TemporalBounds {
                min_start: start,
                max_start: start,
                max_end: end,
            },
            Some(b) => TemporalBounds {
                min_start: earliest(b.min_start, start)?,
                max_start: latest(b.max_start, start)?,
                max_end: match (b.max_end, end) {
                    (Some(x), Some(y)) => Some(latest(x, y)?),
                    (x, y) => x.or(y),
                },
            },
        });
    }
    Ok(bounds)
}

/// Settles the end time of a dataset from its stored end and the latest start
/// of its members.
///
/// * no stored end: every member is a point, the extent ends at the latest start
/// * stored end before the latest start: points follow the last interval, the
///   extent ends at the latest start
/// * otherwise the stored end stands
pub fn resolve_end_time(stored_end: Option<TimePoint>, max_start: TimePoint) -> Result<(TimePoint, MapTime)> {
    match stored_end {
        None => Ok((max_start, MapTime::Point)),
        Some(end) => match compare(&end, &max_start)? {
            Ordering::Less => Ok((max_start, MapTime::Mixed)),
            _ => Ok((end, MapTime::Interval)),
        },
    }
}

/// Bounding union of the spatial extents of the members.
pub fn spatial_union(members: &[Map]) -> Option<SpatialExtent> {
    members
        .iter()
        .map(|m| m.spatial)
        .reduce(|acc, extent| acc.union(&extent))
}

fn fold_min(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.min(v)),
        (a, v) => a.or(v),
    }
}

fn fold_max(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.max(v)),
        (a, v) => a.or(v),
    }
}

/// Count and min/max reductions of the member statistics and resolutions.
pub fn aggregate_metadata(members: &[Map]) -> AggregateMetadata {
    members.iter().fold(AggregateMetadata::default(), |acc, m| {
        let md = &m.metadata;
        AggregateMetadata {
            count: acc.count + 1,
            min_min: fold_min(acc.min_min, md.min),
            min_max: fold_max(acc.min_max, md.min),
            max_min: fold_min(acc.max_min, md.max),
            max_max: fold_max(acc.max_max, md.max),
            nsres_min: fold_min(acc.nsres_min, md.nsres),
            nsres_max: fold_max(acc.nsres_max, md.nsres),
            ewres_min: fold_min(acc.ewres_min, md.ewres),
            ewres_max: fold_max(acc.ewres_max, md.ewres),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{Identity, MapMetadata, MemberKind};
    use crate::datatype::{TemporalValue, TimeUnit};

    fn map(name: &str, start: i64, end: Option<i64>) -> Map {
        Map::new(Identity::new(name, "m").unwrap(), MemberKind::Raster)
            .with_time(TemporalValue::relative(start, end, TimeUnit::Days))
    }

    #[test]
    fn bounds_of_points_have_no_end() {
        let members = vec![map("a", 3, None), map("b", 1, None), map("c", 2, None)];
        let bounds = temporal_bounds(&members).unwrap().unwrap();
        assert_eq!(bounds.min_start, TimePoint::Relative(1));
        assert_eq!(bounds.max_start, TimePoint::Relative(3));
        assert_eq!(bounds.max_end, None);
        assert_eq!(
            resolve_end_time(bounds.max_end, bounds.max_start).unwrap(),
            (TimePoint::Relative(3), MapTime::Point)
        );
    }

    #[test]
    fn points_after_the_last_interval_make_mixed() {
        let members = vec![map("a", 0, Some(2)), map("b", 5, None)];
        let bounds = temporal_bounds(&members).unwrap().unwrap();
        assert_eq!(bounds.max_end, Some(TimePoint::Relative(2)));
        assert_eq!(
            resolve_end_time(bounds.max_end, bounds.max_start).unwrap(),
            (TimePoint::Relative(5), MapTime::Mixed)
        );
    }

    #[test]
    fn intervals_keep_their_end() {
        let members = vec![map("a", 0, Some(2)), map("b", 2, Some(4))];
        let bounds = temporal_bounds(&members).unwrap().unwrap();
        assert_eq!(
            resolve_end_time(bounds.max_end, bounds.max_start).unwrap(),
            (TimePoint::Relative(4), MapTime::Interval)
        );
    }

    #[test]
    fn empty_membership() {
        assert_eq!(temporal_bounds(&[]).unwrap(), None);
        assert_eq!(spatial_union(&[]), None);
        assert_eq!(aggregate_metadata(&[]), AggregateMetadata::default());
    }

    #[test]
    fn metadata_reductions() {
        let mut a = map("a", 0, None);
        a.metadata = MapMetadata {
            min: Some(-1.0),
            max: Some(10.0),
            nsres: Some(30.0),
            ewres: Some(30.0),
            ..MapMetadata::default()
        };
        let mut b = map("b", 1, None);
        b.metadata = MapMetadata {
            min: Some(2.0),
            max: Some(5.0),
            nsres: Some(10.0),
            ewres: None,
            ..MapMetadata::default()
        };
        let md = aggregate_metadata(&[a, b]);
        assert_eq!(md.count, 2);
        assert_eq!((md.min_min, md.min_max), (Some(-1.0), Some(2.0)));
        assert_eq!((md.max_min, md.max_max), (Some(5.0), Some(10.0)));
        assert_eq!((md.nsres_min, md.nsres_max), (Some(10.0), Some(30.0)));
        assert_eq!((md.ewres_min, md.ewres_max), (Some(30.0), Some(30.0)));
    }
}
