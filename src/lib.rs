//! tgis – temporal topology and consistency of space time datasets.
//!
//! tgis keeps track of time stamped maps and of the space time datasets
//! (STDS) they are registered in:
//! * A [`construct::Map`] is a raster, 3D raster or vector map identified by
//!   `name@mapset`, carrying a valid time, a spatial extent and metadata.
//! * A [`construct::SpaceTimeDataset`] aggregates maps of a single kind. Its
//!   temporal extent, map time (point, interval or mixed), spatial extent and
//!   metadata are always derived from its members.
//! * A valid time is a [`datatype::TemporalValue`], either absolute (calendar
//!   time) or relative (an integer offset in a unit), and either a point or
//!   an interval.
//!
//! ## Modules
//! * [`relation`] – Classifies the relation between two valid times into one
//!   of thirteen temporal relations (Allen's interval algebra).
//! * [`database`] – The [`database::TemporalDatabase`] performing registration,
//!   unregistration and deletion, each inside one transaction.
//! * [`aggregate`] – The reductions deriving the state of a dataset.
//! * [`ledger`] – The registration table, the single source of truth for
//!   membership.
//! * [`persist`] – The [`persist::PersistenceGateway`] trait and its SQLite
//!   implementation.
//! * [`granularity`] – Granularity inference and calendar arithmetic.
//! * [`topology`] – Gaps, relation counts and topology checks over members.
//! * [`config`] – Settings and logging setup.
//!
//! ## Temporal relations
//! Relations are stated from the first operand to the second, and the first
//! relation that holds in the order equal, during, contains, overlaps,
//! overlapped, after, before, starts, finishes, started, finished, follows,
//! precedes is the result. Absolute and relative times, or relative times in
//! different units, have no relation (`Ok(None)`). Intervals ending before
//! they start are refused.
//!
//! ## End time defaulting
//! When a dataset is recomputed its extent runs from the earliest start to the
//! latest end of its members. If no member has an end the extent ends at the
//! latest start and the map time is `point`; if the latest end lies before the
//! latest start the extent ends at the latest start and the map time is
//! `mixed`; otherwise the map time is `interval`.
//!
//! ## Quick Start
//! ```
//! use tgis::construct::{DatasetKind, Map, MemberKind};
//! use tgis::database::TemporalDatabase;
//! use tgis::datatype::{TemporalType, TemporalValue};
//! use tgis::persist::PersistenceMode;
//!
//! let mut db = TemporalDatabase::new(PersistenceMode::InMemory).unwrap();
//! let stds = "precipitation@PERMANENT".parse().unwrap();
//! db.create_dataset(&stds, DatasetKind::Strds, TemporalType::Absolute, None, "Precipitation", "")
//!     .unwrap();
//! let map = Map::new("prec_1@PERMANENT".parse().unwrap(), MemberKind::Raster)
//!     .with_time(TemporalValue::parse_absolute("2001-01-01", Some("2001-02-01")).unwrap());
//! assert!(db.register(&map, &stds).unwrap());
//! assert_eq!(db.get_dataset(&stds).unwrap().metadata.count, 1);
//! ```

pub mod aggregate;
pub mod config;
pub mod construct;
pub mod database;
pub mod datatype;
pub mod error;
pub mod granularity;
pub mod ledger;
pub mod persist;
pub mod relation;
pub mod topology;

pub use error::{Result, TgisError};
