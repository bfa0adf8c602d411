// used to validate identities of the form name@mapset
use lazy_static::lazy_static;
use regex::Regex;

// used for dataset snapshots
use serde::{Deserialize, Serialize};

// used to print out readable forms of a construct
use std::fmt;
use std::str::FromStr;

// our own stuff that we need
use crate::datatype::{TemporalType, TemporalValue};
use crate::error::{Result, TgisError};
use crate::granularity::Granularity;
use crate::relation::{self, TemporalRelation};

lazy_static! {
    static ref IDENTITY: Regex = Regex::new(r"^([^@\s]+)@([^@\s]+)$").unwrap();
}

// ------------- Identity -------------
/// The identity of a map or a space time dataset, `name@mapset`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    name: String,
    mapset: String,
}

impl Identity {
    pub fn new(name: &str, mapset: &str) -> Result<Self> {
        format!("{}@{}", name, mapset).parse()
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn mapset(&self) -> &str {
        &self.mapset
    }
}
impl FromStr for Identity {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        let captures = IDENTITY
            .captures(s.trim())
            .ok_or_else(|| TgisError::parse(format!("'{}' is not of the form name@mapset", s)))?;
        Ok(Self {
            name: captures[1].to_string(),
            mapset: captures[2].to_string(),
        })
    }
}
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.mapset)
    }
}

// ------------- Kinds -------------
/// The kind of a map that can be registered in a space time dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Raster,
    Raster3d,
    Vector,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Raster => "raster",
            MemberKind::Raster3d => "raster3d",
            MemberKind::Vector => "vector",
        }
    }
    pub fn dataset_kind(&self) -> DatasetKind {
        match self {
            MemberKind::Raster => DatasetKind::Strds,
            MemberKind::Raster3d => DatasetKind::Str3ds,
            MemberKind::Vector => DatasetKind::Stvds,
        }
    }
}
impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
impl FromStr for MemberKind {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raster" => Ok(MemberKind::Raster),
            "raster3d" | "raster_3d" => Ok(MemberKind::Raster3d),
            "vector" => Ok(MemberKind::Vector),
            other => Err(TgisError::parse(format!("unknown map type '{}'", other))),
        }
    }
}

/// The kind of a space time dataset, each holding exactly one kind of map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Strds,
    Str3ds,
    Stvds,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Strds => "strds",
            DatasetKind::Str3ds => "str3ds",
            DatasetKind::Stvds => "stvds",
        }
    }
    pub fn member_kind(&self) -> MemberKind {
        match self {
            DatasetKind::Strds => MemberKind::Raster,
            DatasetKind::Str3ds => MemberKind::Raster3d,
            DatasetKind::Stvds => MemberKind::Vector,
        }
    }
}
impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
impl FromStr for DatasetKind {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strds" => Ok(DatasetKind::Strds),
            "str3ds" => Ok(DatasetKind::Str3ds),
            "stvds" => Ok(DatasetKind::Stvds),
            other => Err(TgisError::parse(format!("unknown space time dataset type '{}'", other))),
        }
    }
}

// ------------- SpatialExtent -------------
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub top: f64,
    pub bottom: f64,
}

impl SpatialExtent {
    pub fn new(north: f64, south: f64, east: f64, west: f64, top: f64, bottom: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
            top,
            bottom,
        }
    }
    /// The smallest extent covering both extents.
    pub fn union(&self, other: &SpatialExtent) -> SpatialExtent {
        SpatialExtent {
            north: self.north.max(other.north),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            west: self.west.min(other.west),
            top: self.top.max(other.top),
            bottom: self.bottom.min(other.bottom),
        }
    }
}

// ------------- Map -------------
/// Descriptive metadata of a single map. `cells` holds the number of cells for
/// raster maps and the number of primitives for vector maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapMetadata {
    pub title: String,
    pub description: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub cells: i64,
    pub nsres: Option<f64>,
    pub ewres: Option<f64>,
}

/// A time stamped map. The valid time is `None` until one has been assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub id: Identity,
    pub kind: MemberKind,
    pub temporal: Option<TemporalValue>,
    pub spatial: SpatialExtent,
    pub metadata: MapMetadata,
}

impl Map {
    pub fn new(id: Identity, kind: MemberKind) -> Self {
        Self {
            id,
            kind,
            temporal: None,
            spatial: SpatialExtent::default(),
            metadata: MapMetadata::default(),
        }
    }
    pub fn with_time(mut self, temporal: TemporalValue) -> Self {
        self.temporal = Some(temporal);
        self
    }
    pub fn with_spatial(mut self, spatial: SpatialExtent) -> Self {
        self.spatial = spatial;
        self
    }
    pub fn with_metadata(mut self, metadata: MapMetadata) -> Self {
        self.metadata = metadata;
        self
    }
    pub fn id(&self) -> &Identity {
        &self.id
    }
    pub fn temporal_type(&self) -> Option<TemporalType> {
        self.temporal.as_ref().map(TemporalValue::temporal_type)
    }
    /// The relation of this map to the other map, `None` when either has no
    /// valid time or the times are not comparable.
    pub fn temporal_relation(&self, other: &Map) -> Result<Option<TemporalRelation>> {
        match (&self.temporal, &other.temporal) {
            (Some(a), Some(b)) => relation::classify(a, b),
            _ => Ok(None),
        }
    }
}
impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.temporal {
            Some(t) => write!(f, "{} <{}> [{}]", self.kind, self.id, t),
            None => write!(f, "{} <{}> [no time]", self.kind, self.id),
        }
    }
}

// ------------- SpaceTimeDataset -------------
/// How the members of a dataset are stamped in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapTime {
    Point,
    Interval,
    Mixed,
}

impl MapTime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapTime::Point => "point",
            MapTime::Interval => "interval",
            MapTime::Mixed => "mixed",
        }
    }
}
impl fmt::Display for MapTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
impl FromStr for MapTime {
    type Err = TgisError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "point" => Ok(MapTime::Point),
            "interval" => Ok(MapTime::Interval),
            "mixed" => Ok(MapTime::Mixed),
            other => Err(TgisError::parse(format!("unknown map time '{}'", other))),
        }
    }
}

/// Metadata reduced over all members of a dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateMetadata {
    pub count: i64,
    pub min_min: Option<f64>,
    pub min_max: Option<f64>,
    pub max_min: Option<f64>,
    pub max_max: Option<f64>,
    pub nsres_min: Option<f64>,
    pub nsres_max: Option<f64>,
    pub ewres_min: Option<f64>,
    pub ewres_max: Option<f64>,
}

/// A space time dataset. Everything below `description` is derived from the
/// registered maps and is rewritten whenever the membership changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceTimeDataset {
    pub id: Identity,
    pub kind: DatasetKind,
    pub temporal_type: TemporalType,
    pub granularity: Option<Granularity>,
    pub title: String,
    pub description: String,
    pub temporal: Option<TemporalValue>,
    pub map_time: Option<MapTime>,
    pub spatial: Option<SpatialExtent>,
    pub metadata: AggregateMetadata,
}

impl SpaceTimeDataset {
    pub fn new(
        id: Identity,
        kind: DatasetKind,
        temporal_type: TemporalType,
        granularity: Option<Granularity>,
        title: &str,
        description: &str,
    ) -> Self {
        Self {
            id,
            kind,
            temporal_type,
            granularity,
            title: title.to_string(),
            description: description.to_string(),
            temporal: None,
            map_time: None,
            spatial: None,
            metadata: AggregateMetadata::default(),
        }
    }
    pub fn id(&self) -> &Identity {
        &self.id
    }
    pub fn member_kind(&self) -> MemberKind {
        self.kind.member_kind()
    }
    pub fn is_empty(&self) -> bool {
        self.metadata.count == 0
    }
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TgisError::parse(format!("could not serialize <{}>: {}", self.id, e)))
    }
}
impl fmt::Display for SpaceTimeDataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} <{}> ({} time", self.kind, self.id, self.temporal_type)?;
        if let Some(temporal) = &self.temporal {
            write!(f, ", {}", temporal)?;
        }
        if let Some(map_time) = &self.map_time {
            write!(f, ", {}", map_time)?;
        }
        write!(f, ", {} maps)", self.metadata.count)
    }
}
