//! Temporal topology of the members of a space time dataset.
//!
//! All functions expect their maps ordered by start time, as returned by
//! [`crate::database::TemporalDatabase::get_registered_maps`] with
//! [`crate::database::MapOrder::StartTime`].

// we will use a fast hashing algo since the keys are a handful of relations
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::HashMap;

use crate::construct::{Identity, Map, MapTime};
use crate::datatype::{TemporalType, TemporalValue, TimePoint};
use crate::error::{Result, TgisError};
use crate::granularity::Granularity;
use crate::relation::{classify, TemporalRelation};

pub type RelationHasher = BuildHasherDefault<SeaHasher>;
pub type RelationCounts = HashMap<TemporalRelation, usize, RelationHasher>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemporalTypeCounts {
    pub point: usize,
    pub interval: usize,
    /// maps without a valid time
    pub invalid: usize,
}

pub fn count_temporal_types(maps: &[Map]) -> TemporalTypeCounts {
    let mut counts = TemporalTypeCounts::default();
    for map in maps {
        match &map.temporal {
            Some(t) if t.is_interval() => counts.interval += 1,
            Some(_) => counts.point += 1,
            None => counts.invalid += 1,
        }
    }
    counts
}

/// Number of neighbours separated by a gap.
pub fn count_gaps(maps: &[Map]) -> Result<usize> {
    let mut gaps = 0;
    for pair in maps.windows(2) {
        if pair[1].temporal_relation(&pair[0])? == Some(TemporalRelation::After) {
            gaps += 1;
        }
    }
    Ok(gaps)
}

/// Histogram of the relations between the maps, counted from the perspective
/// of both maps of a pair.
///
/// Each map is only compared with its successors up to the first one that
/// follows it or lies after it, since all later maps start even later.
pub fn count_temporal_relations(maps: &[Map]) -> Result<RelationCounts> {
    let mut counts = RelationCounts::default();
    for (i, map) in maps.iter().enumerate() {
        for other in &maps[i + 1..] {
            let Some(relation) = other.temporal_relation(map)? else {
                continue;
            };
            *counts.entry(relation).or_insert(0) += 1;
            *counts.entry(relation.inverse()).or_insert(0) += 1;
            if matches!(relation, TemporalRelation::Follows | TemporalRelation::After) {
                break;
            }
        }
    }
    Ok(counts)
}

/// Relations allowed between the members of a dataset with interval or mixed
/// map time.
const INTERVAL_TOPOLOGY: [TemporalRelation; 4] = [
    TemporalRelation::After,
    TemporalRelation::Before,
    TemporalRelation::Follows,
    TemporalRelation::Precedes,
];

/// True when the relations describe a valid topology for the map time:
/// intervals neither overlap nor nest nor repeat, points never coincide. An
/// empty dataset has no valid topology.
pub fn check_temporal_topology(map_time: Option<MapTime>, relations: &RelationCounts) -> bool {
    let present = |relation: &TemporalRelation| relations.get(relation).copied().unwrap_or(0) > 0;
    match map_time {
        Some(MapTime::Interval) | Some(MapTime::Mixed) => TemporalRelation::PRIORITY
            .iter()
            .filter(|r| !INTERVAL_TOPOLOGY.contains(*r))
            .all(|r| !present(r)),
        Some(MapTime::Point) => !present(&TemporalRelation::Equal),
        None => false,
    }
}

/// Every pairwise relation, `matrix[i][j]` being the relation of map `i` to
/// map `j`.
pub fn temporal_relation_matrix(maps: &[Map]) -> Result<Vec<Vec<Option<TemporalRelation>>>> {
    maps.iter()
        .map(|a| maps.iter().map(|b| a.temporal_relation(b)).collect())
        .collect()
}

/// A member or a gap between two members, gaps carrying only a valid time.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Map(Map),
    Gap(TemporalValue),
}

impl TimelineEntry {
    pub fn temporal(&self) -> Option<&TemporalValue> {
        match self {
            TimelineEntry::Map(map) => map.temporal.as_ref(),
            TimelineEntry::Gap(time) => Some(time),
        }
    }
    pub fn is_gap(&self) -> bool {
        matches!(self, TimelineEntry::Gap(_))
    }
}

/// Interleaves the maps with gap entries wherever a map lies after its
/// predecessor. A gap runs from the end (or start) of the predecessor to the
/// start of the next map.
pub fn insert_gaps(maps: Vec<Map>) -> Result<Vec<TimelineEntry>> {
    let mut gaps = Vec::with_capacity(maps.len());
    for pair in maps.windows(2) {
        let relation = pair[1].temporal_relation(&pair[0])?;
        gaps.push(match (&pair[0].temporal, &pair[1].temporal, relation) {
            (Some(p), Some(n), Some(TemporalRelation::After)) => Some(gap_between(p, n)),
            _ => None,
        });
    }
    let mut gaps = gaps.into_iter();
    let mut timeline = Vec::with_capacity(maps.len() * 2);
    for map in maps {
        timeline.push(TimelineEntry::Map(map));
        if let Some(Some(gap)) = gaps.next() {
            timeline.push(TimelineEntry::Gap(gap));
        }
    }
    Ok(timeline)
}

fn gap_between(previous: &TemporalValue, next: &TemporalValue) -> TemporalValue {
    match (previous, next) {
        (TemporalValue::Absolute(p), TemporalValue::Absolute(n)) => TemporalValue::absolute(
            p.extent.end.unwrap_or(p.extent.start),
            Some(n.extent.start),
        ),
        (TemporalValue::Relative(p), TemporalValue::Relative(n)) => TemporalValue::relative(
            p.extent.end.unwrap_or(p.extent.start),
            Some(n.extent.start),
            p.unit,
        ),
        // `after` only holds between comparable values
        _ => *next,
    }
}

// ------------- Sampling -------------
/// Maps gathered for one granule of time.
#[derive(Debug, Clone, PartialEq)]
pub struct Granule {
    pub temporal: TemporalValue,
    /// The sampler member the granule stems from. `None` for gaps of the
    /// sampler and for granules cut by a granularity.
    pub source: Option<Identity>,
    pub maps: Vec<Map>,
}

impl Granule {
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// For every entry of the sampler timeline, the maps to which the entry
/// stands in one of the given relations (seen from the entry).
pub fn sample(
    timeline: &[TimelineEntry],
    maps: &[Map],
    relations: &[TemporalRelation],
) -> Result<Vec<Granule>> {
    let mut granules = Vec::with_capacity(timeline.len());
    for entry in timeline {
        let Some(granule) = entry.temporal() else {
            continue;
        };
        let mut selected = Vec::new();
        for map in maps {
            let Some(time) = &map.temporal else {
                continue;
            };
            if matches!(classify(granule, time)?, Some(r) if relations.contains(&r)) {
                selected.push(map.clone());
            }
        }
        granules.push(Granule {
            temporal: *granule,
            source: match entry {
                TimelineEntry::Map(map) => Some(map.id.clone()),
                TimelineEntry::Gap(_) => None,
            },
            maps: selected,
        });
    }
    Ok(granules)
}

// lower ranks win, only the maps of the best rank are kept
fn resample_rank(granule: &TemporalValue, time: &TemporalValue) -> Result<Option<u8>> {
    if time.is_point() {
        let inside = granule.start() <= time.start() && Some(time.start()) < granule.end();
        return Ok(inside.then_some(4));
    }
    Ok(match classify(granule, time)? {
        Some(TemporalRelation::Equal) => Some(0),
        Some(r) if r.is_within() => Some(1),
        Some(TemporalRelation::Overlaps) => Some(2),
        Some(TemporalRelation::Overlapped) => Some(3),
        Some(TemporalRelation::Contains | TemporalRelation::Started | TemporalRelation::Finished) => {
            Some(4)
        }
        _ => None,
    })
}

/// Cuts `[start, end)` into granules of the given granularity and gathers
/// the maps of each granule. Maps equal to the granule are preferred, then
/// maps the granule lies within, maps overlapping it from either side and
/// finally maps inside it. A point belongs to the granule holding it, the
/// granule start included. Granules without maps are gaps.
pub fn resample(
    maps: &[Map],
    start: TimePoint,
    end: TimePoint,
    granularity: &Granularity,
    temporal_type: TemporalType,
) -> Result<Vec<Granule>> {
    let mut granules = Vec::new();
    let mut current = start;
    while current < end {
        let next = granularity.advance(current, 1)?;
        if next <= current {
            return Err(TgisError::parse(format!("granularity '{}' does not advance time", granularity)));
        }
        let granule = TemporalValue::from_points(temporal_type, current, Some(next), None)?;
        let mut ranked = Vec::new();
        for map in maps {
            if let Some(time) = &map.temporal {
                if let Some(rank) = resample_rank(&granule, time)? {
                    ranked.push((rank, map));
                }
            }
        }
        let best = ranked.iter().map(|(rank, _)| *rank).min();
        granules.push(Granule {
            temporal: granule,
            source: None,
            maps: ranked
                .into_iter()
                .filter(|(rank, _)| Some(*rank) == best)
                .map(|(_, map)| map.clone())
                .collect(),
        });
        current = next;
    }
    Ok(granules)
}
