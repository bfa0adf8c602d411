//! The temporal database: maps, space time datasets and the registrations
//! between them, kept consistent through a [`PersistenceGateway`].
//!
//! Every public operation that changes anything runs inside one transaction.
//! Whenever the membership of a dataset (or the time of one of its members)
//! changes, the derived state of the dataset is recomputed from its members
//! before the transaction commits, so readers never see stale aggregates.

use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::Settings;
use crate::construct::{
    AggregateMetadata, DatasetKind, Identity, Map, MapTime, SpaceTimeDataset, SpatialExtent,
};
use crate::datatype::{parse_datetime, TemporalType, TemporalValue, TimePoint};
use crate::error::{Result, TgisError};
use crate::granularity::{self, Granularity, Increment};
use crate::ledger::{
    RegistrationLedger, MEMBERS_BY_END_TIME, MEMBERS_BY_ID, MEMBERS_BY_START_TIME,
};
use crate::persist::{
    dataset_from_row, dataset_params, map_from_row, map_params, map_time_params, time_to_value,
    value_to_time, PersistenceGateway, PersistenceMode, SqliteGateway, Statement, Transaction,
    Value, DELETE_DATASET, DELETE_MAP, GET_DATASET, GET_DATASET_END_TIME, GET_MAP, INSERT_DATASET,
    INSERT_MAP, RENAME_DATASET, UPDATE_DATASET_DERIVED, UPDATE_DATASET_GRANULARITY,
    UPDATE_DATASET_TEMPORAL_EXTENT, UPDATE_MAP_TIME,
};
use crate::relation::{self, TemporalRelation};
use crate::topology::{self, Granule, RelationCounts, TimelineEntry};

// ------------- Queries -------------
/// Order of the maps returned by [`TemporalDatabase::get_registered_maps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapOrder {
    #[default]
    StartTime,
    EndTime,
    Id,
}

impl MapOrder {
    fn statement(&self) -> &'static str {
        match self {
            MapOrder::StartTime => MEMBERS_BY_START_TIME,
            MapOrder::EndTime => MEMBERS_BY_END_TIME,
            MapOrder::Id => MEMBERS_BY_ID,
        }
    }
}

/// Selects a subset of the registered maps. The default filter selects all.
#[derive(Debug, Clone, Default)]
pub struct MapFilter {
    name: Option<Regex>,
    relation: Option<(TemporalRelation, TemporalValue)>,
}

impl MapFilter {
    pub fn all() -> Self {
        Self::default()
    }
    /// Keeps maps whose name (without the mapset) matches the expression.
    pub fn name_matching(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| TgisError::parse(format!("invalid name pattern '{}': {}", pattern, e)))?;
        self.name = Some(regex);
        Ok(self)
    }
    /// Keeps maps standing in the given relation to the reference time.
    pub fn related(mut self, relation: TemporalRelation, reference: TemporalValue) -> Self {
        self.relation = Some((relation, reference));
        self
    }
    pub fn accepts(&self, map: &Map) -> Result<bool> {
        if let Some(name) = &self.name {
            if !name.is_match(map.id.name()) {
                return Ok(false);
            }
        }
        if let Some((relation, reference)) = &self.relation {
            let Some(temporal) = &map.temporal else {
                return Ok(false);
            };
            return Ok(relation::classify(temporal, reference)? == Some(*relation));
        }
        Ok(true)
    }
}

// ------------- Time assignment -------------
/// Time stamps given to maps registered in a batch. The n:th map (counting
/// from zero) starts at `start + n * increment`; with `interval` set it also
/// ends one increment later.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeAssignment {
    Absolute {
        start: NaiveDateTime,
        increment: Increment,
        interval: bool,
    },
    Relative {
        start: i64,
        increment: i64,
        interval: bool,
    },
}

impl TimeAssignment {
    /// e.g. `TimeAssignment::absolute("2001-01-01", "1 month", true)`
    pub fn absolute(start: &str, increment: &str, interval: bool) -> Result<Self> {
        Ok(TimeAssignment::Absolute {
            start: parse_datetime(start)?,
            increment: increment.parse()?,
            interval,
        })
    }
    pub fn relative(start: i64, increment: i64, interval: bool) -> Self {
        TimeAssignment::Relative {
            start,
            increment,
            interval,
        }
    }
    fn time_of(&self, index: usize, map: &Identity, dataset: &SpaceTimeDataset) -> Result<TemporalValue> {
        let overflow = || TgisError::parse(format!("time stamp of map <{}> number {} overflows", map, index));
        let n = i64::try_from(index).map_err(|_| overflow())?;
        match (self, dataset.temporal_type) {
            (
                TimeAssignment::Absolute {
                    start,
                    increment,
                    interval,
                },
                TemporalType::Absolute,
            ) => {
                let from = increment.apply(start, n)?;
                let to = if *interval {
                    Some(increment.apply(start, n.checked_add(1).ok_or_else(overflow)?)?)
                } else {
                    None
                };
                Ok(TemporalValue::absolute(from, to))
            }
            (
                TimeAssignment::Relative {
                    start,
                    increment,
                    interval,
                },
                TemporalType::Relative(unit),
            ) => {
                let from = n
                    .checked_mul(*increment)
                    .and_then(|offset| start.checked_add(offset))
                    .ok_or_else(overflow)?;
                let to = if *interval {
                    Some(from.checked_add(*increment).ok_or_else(overflow)?)
                } else {
                    None
                };
                Ok(TemporalValue::relative(from, to, unit))
            }
            (assignment, expected) => Err(TgisError::TemporalTypeMismatch {
                map: map.to_string(),
                dataset: dataset.id.to_string(),
                found: match assignment {
                    TimeAssignment::Absolute { .. } => "absolute".to_string(),
                    TimeAssignment::Relative { .. } => "relative".to_string(),
                },
                expected: expected.to_string(),
            }),
        }
    }
}

// ------------- Database -------------
pub struct TemporalDatabase<G: PersistenceGateway = SqliteGateway> {
    gateway: G,
}

impl TemporalDatabase<SqliteGateway> {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let gateway = SqliteGateway::open(&mode)?;
        info!(mode=?mode, "opened temporal database");
        Ok(Self::with_gateway(gateway))
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.persistence_mode())
    }
}

impl<G: PersistenceGateway> TemporalDatabase<G> {
    pub fn with_gateway(gateway: G) -> Self {
        Self { gateway }
    }
    pub fn gateway(&self) -> &G {
        &self.gateway
    }
    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    // ------------- Maps -------------
    /// Stores the map unless a map with the same identity is already stored.
    /// Returns whether the map was inserted.
    pub fn insert_map(&mut self, map: &Map) -> Result<bool> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        if load_map(&mut *tx, &map.id)?.is_some() {
            return Ok(false);
        }
        tx.execute(&Statement::with_params(INSERT_MAP, map_params(map)))?;
        tx.commit()?;
        debug!(map=%map.id, "inserted map");
        Ok(true)
    }
    pub fn get_map(&mut self, id: &Identity) -> Result<Map> {
        load_map(&mut self.gateway, id)?.ok_or_else(|| TgisError::UnknownMap(id.to_string()))
    }
    /// Replaces the valid time of a map and recomputes every dataset it is
    /// registered in.
    pub fn update_map_time(&mut self, id: &Identity, temporal: TemporalValue) -> Result<()> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        let datasets = retime_map(&mut *tx, id, &temporal)?;
        for dataset in &datasets {
            recompute(&mut *tx, dataset)?;
        }
        tx.commit()?;
        info!(map=%id, time=%temporal, datasets=datasets.len(), "updated map time");
        Ok(())
    }
    /// Unregisters the map from every dataset (recomputing each) and removes it.
    pub fn delete_map(&mut self, id: &Identity) -> Result<()> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        if load_map(&mut *tx, id)?.is_none() {
            return Err(TgisError::UnknownMap(id.to_string()));
        }
        let datasets = RegistrationLedger::new(&mut *tx).datasets_of(id)?;
        for dataset in &datasets {
            unregister_within(&mut *tx, id, dataset)?;
            recompute(&mut *tx, dataset)?;
        }
        tx.execute(&Statement::new(DELETE_MAP).bind(id))?;
        tx.commit()?;
        info!(map=%id, datasets=datasets.len(), "deleted map");
        Ok(())
    }

    // ------------- Datasets -------------
    pub fn create_dataset(
        &mut self,
        id: &Identity,
        kind: DatasetKind,
        temporal_type: TemporalType,
        granularity: Option<Granularity>,
        title: &str,
        description: &str,
    ) -> Result<SpaceTimeDataset> {
        if let Some(g) = granularity {
            require_fit(&g, temporal_type)?;
        }
        let dataset = SpaceTimeDataset::new(id.clone(), kind, temporal_type, granularity, title, description);
        let mut tx = Transaction::begin(&mut self.gateway)?;
        if load_dataset(&mut *tx, id)?.is_some() {
            return Err(TgisError::DatasetExists(id.to_string()));
        }
        tx.execute(&Statement::with_params(INSERT_DATASET, dataset_params(&dataset)))?;
        tx.commit()?;
        info!(dataset=%id, kind=%kind, temporal_type=%temporal_type, "created space time dataset");
        Ok(dataset)
    }
    pub fn get_dataset(&mut self, id: &Identity) -> Result<SpaceTimeDataset> {
        require_dataset(&mut self.gateway, id)
    }
    /// Removes the registrations of every member and then the dataset itself.
    /// The maps are kept.
    pub fn delete_dataset(&mut self, id: &Identity) -> Result<()> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        require_dataset(&mut *tx, id)?;
        let mut ledger = RegistrationLedger::new(&mut *tx);
        let members = ledger.map_ids_of(id)?;
        ledger.remove_dataset(id)?;
        tx.execute(&Statement::new(DELETE_DATASET).bind(id))?;
        tx.commit()?;
        info!(dataset=%id, members=members.len(), "deleted space time dataset");
        Ok(())
    }
    /// Rederives the temporal extent, map time, spatial extent and metadata
    /// of the dataset from its members.
    pub fn update_from_registered_maps(&mut self, id: &Identity) -> Result<SpaceTimeDataset> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        require_dataset(&mut *tx, id)?;
        recompute(&mut *tx, id)?;
        let dataset = require_dataset(&mut *tx, id)?;
        tx.commit()?;
        Ok(dataset)
    }

    // ------------- Registration -------------
    /// Registers the map in the dataset. A map that is not yet stored is
    /// inserted first; a stored map is registered with its stored state.
    /// Registering a map twice is not an error, it only returns `false`.
    pub fn register(&mut self, map: &Map, dataset: &Identity) -> Result<bool> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        let stds = require_dataset(&mut *tx, dataset)?;
        let registered = register_within(&mut *tx, map, &stds)?;
        if registered {
            recompute(&mut *tx, dataset)?;
        }
        tx.commit()?;
        if registered {
            info!(map=%map.id, dataset=%dataset, "registered map");
        }
        Ok(registered)
    }
    /// Removes the map from the dataset. Returns `false` if it was not registered.
    pub fn unregister(&mut self, map: &Identity, dataset: &Identity) -> Result<bool> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        require_dataset(&mut *tx, dataset)?;
        let unregistered = unregister_within(&mut *tx, map, dataset)?;
        if unregistered {
            recompute(&mut *tx, dataset)?;
        }
        tx.commit()?;
        if unregistered {
            info!(map=%map, dataset=%dataset, "unregistered map");
        }
        Ok(unregistered)
    }
    /// Registers many maps at once, optionally assigning their time stamps
    /// in the order given. The dataset is recomputed once at the end. Returns
    /// the number of maps that were newly registered.
    pub fn register_maps(
        &mut self,
        dataset: &Identity,
        maps: &[Map],
        assignment: Option<&TimeAssignment>,
    ) -> Result<usize> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        let stds = require_dataset(&mut *tx, dataset)?;
        let mut touched: BTreeSet<Identity> = BTreeSet::new();
        let mut registered = 0;
        for (index, map) in maps.iter().enumerate() {
            let mut map = map.clone();
            if let Some(assignment) = assignment {
                let temporal = assignment.time_of(index, &map.id, &stds)?;
                if load_map(&mut *tx, &map.id)?.is_some() {
                    touched.extend(retime_map(&mut *tx, &map.id, &temporal)?);
                }
                map.temporal = Some(temporal);
            }
            if register_within(&mut *tx, &map, &stds)? {
                registered += 1;
            }
        }
        touched.insert(dataset.clone());
        for id in &touched {
            recompute(&mut *tx, id)?;
        }
        tx.commit()?;
        info!(dataset=%dataset, registered, offered=maps.len(), "registered maps");
        Ok(registered)
    }
    pub fn is_registered(&mut self, map: &Identity, dataset: &Identity) -> Result<bool> {
        RegistrationLedger::new(&mut self.gateway).contains(dataset, map)
    }
    /// Identities of the datasets the map is registered in.
    pub fn get_registered_datasets(&mut self, map: &Identity) -> Result<Vec<Identity>> {
        RegistrationLedger::new(&mut self.gateway).datasets_of(map)
    }
    pub fn get_registered_maps(
        &mut self,
        dataset: &Identity,
        filter: &MapFilter,
        order: MapOrder,
    ) -> Result<Vec<Map>> {
        require_dataset(&mut self.gateway, dataset)?;
        let members = RegistrationLedger::new(&mut self.gateway).members_of(dataset, order.statement())?;
        let mut selected = Vec::with_capacity(members.len());
        for map in members {
            if filter.accepts(&map)? {
                selected.push(map);
            }
        }
        Ok(selected)
    }
    /// The members ordered by start time, with a gap entry between every two
    /// neighbours that do not touch.
    pub fn get_registered_maps_with_gaps(&mut self, dataset: &Identity) -> Result<Vec<TimelineEntry>> {
        let maps = self.get_registered_maps(dataset, &MapFilter::all(), MapOrder::StartTime)?;
        topology::insert_gaps(maps)
    }

    // ------------- Analysis -------------
    /// Infers the granularity from the members and stores it on the dataset.
    /// A dataset whose members yield no granularity keeps its current one.
    pub fn infer_granularity(&mut self, dataset: &Identity) -> Result<Option<Granularity>> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        let stds = require_dataset(&mut *tx, dataset)?;
        let maps = RegistrationLedger::new(&mut *tx).members_of(dataset, MEMBERS_BY_START_TIME)?;
        let granularity = granularity::infer_granularity(stds.temporal_type, &maps);
        if let Some(g) = granularity {
            tx.execute(
                &Statement::new(UPDATE_DATASET_GRANULARITY)
                    .bind(g.to_string())
                    .bind(dataset),
            )?;
            debug!(dataset=%dataset, granularity=%g, "inferred granularity");
        }
        tx.commit()?;
        Ok(granularity)
    }
    pub fn count_temporal_relations(&mut self, dataset: &Identity) -> Result<RelationCounts> {
        let maps = self.get_registered_maps(dataset, &MapFilter::all(), MapOrder::StartTime)?;
        topology::count_temporal_relations(&maps)
    }
    /// True when no two members overlap, nest or coincide.
    pub fn check_temporal_topology(&mut self, dataset: &Identity) -> Result<bool> {
        let stds = require_dataset(&mut self.gateway, dataset)?;
        let relations = self.count_temporal_relations(dataset)?;
        Ok(topology::check_temporal_topology(stds.map_time, &relations))
    }
    /// Samples the dataset with the timeline of a second dataset. For every
    /// member and every gap of the sampler, collects the members of `dataset`
    /// to which it stands in one of the relations.
    pub fn sample_by_dataset(
        &mut self,
        dataset: &Identity,
        sampler: &Identity,
        relations: &[TemporalRelation],
    ) -> Result<Vec<Granule>> {
        let stds = require_dataset(&mut self.gateway, dataset)?;
        let sampling = require_dataset(&mut self.gateway, sampler)?;
        if stds.temporal_type != sampling.temporal_type {
            return Err(TgisError::InvalidOperation(format!(
                "<{}> has {} time and can not be sampled by <{}> with {} time",
                dataset, stds.temporal_type, sampler, sampling.temporal_type
            )));
        }
        if sampling.map_time != Some(MapTime::Interval) {
            return Err(TgisError::InvalidOperation(format!(
                "the sampler <{}> must have interval time",
                sampler
            )));
        }
        let maps = self.get_registered_maps(dataset, &MapFilter::all(), MapOrder::StartTime)?;
        let timeline = self.get_registered_maps_with_gaps(sampler)?;
        let granules = topology::sample(&timeline, &maps, relations)?;
        debug!(dataset=%dataset, sampler=%sampler, granules=granules.len(), "sampled space time dataset");
        Ok(granules)
    }
    /// Cuts the temporal extent of the dataset into granules of the given
    /// granularity (by default its own) and gathers the members of each, see
    /// [`topology::resample`]. An empty dataset has no granules.
    pub fn get_registered_maps_by_granularity(
        &mut self,
        dataset: &Identity,
        granularity: Option<Granularity>,
    ) -> Result<Vec<Granule>> {
        let stds = require_dataset(&mut self.gateway, dataset)?;
        let Some(granularity) = granularity.or(stds.granularity) else {
            return Err(TgisError::InvalidOperation(format!(
                "space time dataset <{}> has no granularity",
                dataset
            )));
        };
        require_fit(&granularity, stds.temporal_type)?;
        let (Some(temporal), Some(map_time)) = (stds.temporal, stds.map_time) else {
            return Ok(Vec::new());
        };
        let maps = self.get_registered_maps(dataset, &MapFilter::all(), MapOrder::StartTime)?;
        let mut end = temporal.end().unwrap_or(temporal.start());
        // one more granule so that a point at the very end is caught
        if map_time != MapTime::Interval {
            end = granularity.advance(end, 1)?;
        }
        topology::resample(&maps, temporal.start(), end, &granularity, stds.temporal_type)
    }

    // ------------- Editing -------------
    /// Moves every member of the dataset by one granule and recomputes each
    /// dataset holding one of them. Returns the number of maps moved.
    pub fn shift(&mut self, dataset: &Identity, granularity: Granularity) -> Result<usize> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        let stds = require_dataset(&mut *tx, dataset)?;
        require_fit(&granularity, stds.temporal_type)?;
        let maps = RegistrationLedger::new(&mut *tx).members_of(dataset, MEMBERS_BY_START_TIME)?;
        let mut moved = Vec::with_capacity(maps.len());
        for map in &maps {
            if let Some(time) = &map.temporal {
                moved.push((map.id.clone(), granularity.shift(time, 1)?));
            }
        }
        retime_members(&mut *tx, dataset, &moved)?;
        tx.commit()?;
        info!(dataset=%dataset, granularity=%granularity, maps=moved.len(), "shifted space time dataset");
        Ok(moved.len())
    }
    /// Sets the end of every member to the start of its successor, so that
    /// the members form an unbroken sequence of intervals. Members sharing a
    /// start with their successor are left alone. A point at the end gets the
    /// length of one granule, from the stored or the inferred granularity.
    /// Returns the number of maps changed.
    pub fn snap(&mut self, dataset: &Identity) -> Result<usize> {
        let mut tx = Transaction::begin(&mut self.gateway)?;
        let stds = require_dataset(&mut *tx, dataset)?;
        let maps = RegistrationLedger::new(&mut *tx).members_of(dataset, MEMBERS_BY_START_TIME)?;
        let step = stds
            .granularity
            .or_else(|| granularity::infer_granularity(stds.temporal_type, &maps));
        let mut snapped = Vec::new();
        for (i, map) in maps.iter().enumerate() {
            let Some(time) = map.temporal else {
                continue;
            };
            let end = match (maps.get(i + 1).and_then(|next| next.temporal), step) {
                (Some(next), _) if next.start() != time.start() => Some(next.start()),
                (Some(_), _) => time.end(),
                (None, Some(g)) if time.is_point() => Some(g.advance(time.start(), 1)?),
                (None, _) => time.end(),
            };
            if end != time.end() {
                let value =
                    TemporalValue::from_points(time.temporal_type(), time.start(), end, time.timezone())?;
                snapped.push((map.id.clone(), value));
            }
        }
        retime_members(&mut *tx, dataset, &snapped)?;
        tx.commit()?;
        info!(dataset=%dataset, maps=snapped.len(), "snapped space time dataset");
        Ok(snapped.len())
    }
    /// Gives the dataset a new identity in the same mapset. Members and
    /// derived state move along.
    pub fn rename_dataset(&mut self, id: &Identity, new_id: &Identity) -> Result<SpaceTimeDataset> {
        if id.mapset() != new_id.mapset() {
            return Err(TgisError::InvalidOperation(format!(
                "<{}> can not be renamed to <{}> in another mapset",
                id, new_id
            )));
        }
        let mut tx = Transaction::begin(&mut self.gateway)?;
        require_dataset(&mut *tx, id)?;
        if load_dataset(&mut *tx, new_id)?.is_some() {
            return Err(TgisError::DatasetExists(new_id.to_string()));
        }
        tx.execute(&Statement::new(RENAME_DATASET).bind(new_id).bind(id))?;
        RegistrationLedger::new(&mut *tx).rename_dataset(id, new_id)?;
        let dataset = require_dataset(&mut *tx, new_id)?;
        tx.commit()?;
        info!(from=%id, to=%new_id, "renamed space time dataset");
        Ok(dataset)
    }
}

// ------------- Internals -------------
// These run inside the transaction of the public operation calling them.
fn load_map<G: PersistenceGateway + ?Sized>(gateway: &mut G, id: &Identity) -> Result<Option<Map>> {
    gateway
        .execute(&Statement::new(GET_MAP).bind(id))?
        .first()
        .map(map_from_row)
        .transpose()
}

fn load_dataset<G: PersistenceGateway + ?Sized>(
    gateway: &mut G,
    id: &Identity,
) -> Result<Option<SpaceTimeDataset>> {
    gateway
        .execute(&Statement::new(GET_DATASET).bind(id))?
        .first()
        .map(dataset_from_row)
        .transpose()
}

fn require_dataset<G: PersistenceGateway + ?Sized>(gateway: &mut G, id: &Identity) -> Result<SpaceTimeDataset> {
    load_dataset(gateway, id)?.ok_or_else(|| TgisError::UnknownDataset(id.to_string()))
}

/// Structural checks that must pass before anything is written.
fn check_registration(map: &Map, dataset: &SpaceTimeDataset) -> Result<()> {
    if map.kind != dataset.member_kind() {
        return Err(TgisError::TypeMismatch {
            map: map.id.to_string(),
            map_kind: map.kind,
            dataset: dataset.id.to_string(),
            dataset_kind: dataset.kind,
        });
    }
    if map.id.mapset() != dataset.id.mapset() {
        return Err(TgisError::MapsetMismatch {
            map: map.id.to_string(),
            dataset: dataset.id.to_string(),
        });
    }
    let Some(temporal) = &map.temporal else {
        return Err(TgisError::InvalidTime(map.id.to_string()));
    };
    temporal.validate()?;
    if temporal.temporal_type() != dataset.temporal_type {
        return Err(TgisError::TemporalTypeMismatch {
            map: map.id.to_string(),
            dataset: dataset.id.to_string(),
            found: temporal.temporal_type().to_string(),
            expected: dataset.temporal_type.to_string(),
        });
    }
    Ok(())
}

/// Registers without recomputing. Returns `false` for an existing registration.
fn register_within<G: PersistenceGateway + ?Sized>(
    gateway: &mut G,
    map: &Map,
    dataset: &SpaceTimeDataset,
) -> Result<bool> {
    let stored = load_map(gateway, &map.id)?;
    check_registration(stored.as_ref().unwrap_or(map), dataset)?;
    if RegistrationLedger::new(&mut *gateway).contains(&dataset.id, &map.id)? {
        warn!(map=%map.id, dataset=%dataset.id, "map is already registered, skipping");
        return Ok(false);
    }
    if stored.is_none() {
        gateway.execute(&Statement::with_params(INSERT_MAP, map_params(map)))?;
    }
    RegistrationLedger::new(&mut *gateway).insert(&dataset.id, &map.id)?;
    Ok(true)
}

/// Unregisters without recomputing. Returns `false` for a missing registration.
fn unregister_within<G: PersistenceGateway + ?Sized>(
    gateway: &mut G,
    map: &Identity,
    dataset: &Identity,
) -> Result<bool> {
    let mut ledger = RegistrationLedger::new(gateway);
    if !ledger.contains(dataset, map)? {
        warn!(map=%map, dataset=%dataset, "map is not registered, skipping");
        return Ok(false);
    }
    ledger.remove(dataset, map)?;
    Ok(true)
}

/// Stores a new valid time for a map after checking it against every dataset
/// the map is registered in. Returns those datasets, which need recomputing.
fn retime_map<G: PersistenceGateway + ?Sized>(
    gateway: &mut G,
    id: &Identity,
    temporal: &TemporalValue,
) -> Result<Vec<Identity>> {
    temporal.validate()?;
    if load_map(gateway, id)?.is_none() {
        return Err(TgisError::UnknownMap(id.to_string()));
    }
    let datasets = RegistrationLedger::new(&mut *gateway).datasets_of(id)?;
    for dataset in &datasets {
        let stds = require_dataset(gateway, dataset)?;
        if stds.temporal_type != temporal.temporal_type() {
            return Err(TgisError::TemporalTypeMismatch {
                map: id.to_string(),
                dataset: dataset.to_string(),
                found: temporal.temporal_type().to_string(),
                expected: stds.temporal_type.to_string(),
            });
        }
    }
    let mut params = map_time_params(Some(temporal));
    params.push(Value::from(id));
    gateway.execute(&Statement::with_params(UPDATE_MAP_TIME, params))?;
    Ok(datasets)
}

/// Stores new times for members of a dataset, then recomputes the dataset
/// and every other dataset holding one of the maps.
fn retime_members<G: PersistenceGateway + ?Sized>(
    gateway: &mut G,
    dataset: &Identity,
    times: &[(Identity, TemporalValue)],
) -> Result<()> {
    let mut touched = BTreeSet::from([dataset.clone()]);
    for (id, temporal) in times {
        touched.extend(retime_map(gateway, id, temporal)?);
    }
    for id in &touched {
        recompute(gateway, id)?;
    }
    Ok(())
}

fn require_fit(granularity: &Granularity, temporal_type: TemporalType) -> Result<()> {
    if granularity.fits(temporal_type) {
        Ok(())
    } else {
        Err(TgisError::parse(format!(
            "granularity '{}' does not fit {} time",
            granularity, temporal_type
        )))
    }
}

fn derived_statement(
    dataset: &Identity,
    start: Option<TimePoint>,
    end: Option<TimePoint>,
    map_time: Option<MapTime>,
    spatial: Option<SpatialExtent>,
    metadata: &AggregateMetadata,
) -> Statement {
    let mut params = vec![
        time_to_value(start),
        time_to_value(end),
        map_time.map(|m| m.as_str()).into(),
    ];
    match spatial {
        Some(s) => params.extend([s.north, s.south, s.east, s.west, s.top, s.bottom].map(Value::from)),
        None => params.extend(std::iter::repeat_n(Value::Null, 6)),
    }
    params.push(metadata.count.into());
    params.extend(
        [
            metadata.min_min,
            metadata.min_max,
            metadata.max_min,
            metadata.max_max,
            metadata.nsres_min,
            metadata.nsres_max,
            metadata.ewres_min,
            metadata.ewres_max,
        ]
        .map(Value::from),
    );
    params.push(Value::from(dataset));
    Statement::with_params(UPDATE_DATASET_DERIVED, params)
}

/// Rederives the state of a dataset from its members.
///
/// The provisional extent `(min start, max end)` is stored first and the end
/// is read back, so that the end time defaulting works on what the backend
/// actually holds. Granularity is left alone, see
/// [`TemporalDatabase::infer_granularity`].
fn recompute<G: PersistenceGateway + ?Sized>(gateway: &mut G, dataset: &Identity) -> Result<()> {
    let stds = require_dataset(gateway, dataset)?;
    let members = RegistrationLedger::new(&mut *gateway).members_of(dataset, MEMBERS_BY_START_TIME)?;
    let spatial = aggregate::spatial_union(&members);
    let metadata = aggregate::aggregate_metadata(&members);

    let Some(bounds) = aggregate::temporal_bounds(&members)? else {
        debug!(dataset=%dataset, "no timed members, clearing temporal extent");
        gateway.execute(&derived_statement(dataset, None, None, None, spatial, &metadata))?;
        return Ok(());
    };

    gateway.execute(
        &Statement::new(UPDATE_DATASET_TEMPORAL_EXTENT)
            .bind(time_to_value(Some(bounds.min_start)))
            .bind(time_to_value(bounds.max_end))
            .bind(dataset),
    )?;
    let rows = gateway.execute(&Statement::new(GET_DATASET_END_TIME).bind(dataset))?;
    let row = rows
        .first()
        .ok_or_else(|| TgisError::UnknownDataset(dataset.to_string()))?;
    let stored_end = value_to_time(row.get(0)?, stds.temporal_type)?;
    let (end, map_time) = aggregate::resolve_end_time(stored_end, bounds.max_start)?;

    gateway.execute(&derived_statement(
        dataset,
        Some(bounds.min_start),
        Some(end),
        Some(map_time),
        spatial,
        &metadata,
    ))?;
    debug!(
        dataset=%dataset,
        start=%bounds.min_start,
        end=%end,
        map_time=%map_time,
        count=metadata.count,
        "recomputed space time dataset"
    );
    Ok(())
}
