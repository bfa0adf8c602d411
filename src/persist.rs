// used for persistence
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{Connection, ToSql};

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::construct::{
    AggregateMetadata, Identity, Map, MapMetadata, MapTime, SpaceTimeDataset, SpatialExtent,
};
use crate::datatype::{format_datetime, parse_datetime, TemporalType, TemporalValue, TimePoint};
use crate::error::{Result, TgisError};
use crate::granularity::Granularity;

// ------------- Values -------------
/// A backend neutral value bound to, or read from, a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl From<&Identity> for Value {
    fn from(v: &Identity) -> Self {
        Value::Text(v.to_string())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(r) => Value::Real(r),
            SqlValue::Text(t) => Value::Text(t),
            SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}
impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Text(t) => ToSqlOutput::Borrowed(t.as_str().into()),
        })
    }
}

// ------------- Statements and rows -------------
/// Parameterized SQL. The text is always static, only values are bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: &'static str,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: &'static str) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }
    pub fn with_params(sql: &'static str, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
    pub fn get(&self, index: usize) -> Result<&Value> {
        self.values
            .get(index)
            .ok_or_else(|| TgisError::corruption(format!("row has no column {}", index)))
    }
    pub fn opt_text(&self, index: usize) -> Result<Option<String>> {
        match self.get(index)? {
            Value::Null => Ok(None),
            Value::Text(t) => Ok(Some(t.clone())),
            other => Err(TgisError::corruption(format!("expected text in column {}, found {:?}", index, other))),
        }
    }
    pub fn text(&self, index: usize) -> Result<String> {
        self.opt_text(index)?
            .ok_or_else(|| TgisError::corruption(format!("unexpected null in column {}", index)))
    }
    pub fn opt_integer(&self, index: usize) -> Result<Option<i64>> {
        match self.get(index)? {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            other => Err(TgisError::corruption(format!("expected integer in column {}, found {:?}", index, other))),
        }
    }
    pub fn integer(&self, index: usize) -> Result<i64> {
        self.opt_integer(index)?
            .ok_or_else(|| TgisError::corruption(format!("unexpected null in column {}", index)))
    }
    pub fn opt_real(&self, index: usize) -> Result<Option<f64>> {
        match self.get(index)? {
            Value::Null => Ok(None),
            Value::Real(r) => Ok(Some(*r)),
            Value::Integer(i) => Ok(Some(*i as f64)),
            other => Err(TgisError::corruption(format!("expected real in column {}, found {:?}", index, other))),
        }
    }
    pub fn real(&self, index: usize) -> Result<f64> {
        self.opt_real(index)?
            .ok_or_else(|| TgisError::corruption(format!("unexpected null in column {}", index)))
    }
}

pub type RowSet = Vec<Row>;

// ------------- Gateway -------------
/// Everything the temporal database needs from a relational backend.
pub trait PersistenceGateway {
    /// Runs a single statement, returning the selected rows (if any).
    fn execute(&mut self, statement: &Statement) -> Result<RowSet>;
    /// Runs the statements in order, stopping at the first failure.
    fn execute_script(&mut self, statements: &[Statement]) -> Result<()>;
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn table_exists(&mut self, table: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

/// Scoped transaction. Changes are only kept through an explicit
/// [`Transaction::commit`]; dropping the guard in any other way rolls back.
pub struct Transaction<'g, G: PersistenceGateway + ?Sized> {
    gateway: &'g mut G,
    finished: bool,
}

impl<'g, G: PersistenceGateway + ?Sized> Transaction<'g, G> {
    pub fn begin(gateway: &'g mut G) -> Result<Self> {
        gateway.begin()?;
        Ok(Self {
            gateway,
            finished: false,
        })
    }
    pub fn commit(mut self) -> Result<()> {
        let committed = self.gateway.commit();
        if committed.is_ok() {
            self.finished = true;
        }
        committed
    }
}
impl<G: PersistenceGateway + ?Sized> Deref for Transaction<'_, G> {
    type Target = G;
    fn deref(&self) -> &G {
        self.gateway
    }
}
impl<G: PersistenceGateway + ?Sized> DerefMut for Transaction<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        self.gateway
    }
}
impl<G: PersistenceGateway + ?Sized> Drop for Transaction<'_, G> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("rolling back transaction");
            if let Err(e) = self.gateway.rollback() {
                warn!(error=%e, "rollback failed");
            }
        }
    }
}

// ------------- SQLite -------------
// The "STRICT" keyword breaks external tools like DBeaver, so it is left out.
// Time columns are typed "any", holding text for absolute time and integers
// for relative time.
const SCHEMA: &str = "
    create table if not exists Map (
        Map_Identity text not null,
        MemberKind text not null,
        TemporalType text null,
        TimeUnit text null,
        StartTime any null,
        EndTime any null,
        Timezone integer null,
        North real not null,
        South real not null,
        East real not null,
        West real not null,
        Top real not null,
        Bottom real not null,
        Title text not null,
        Description text not null,
        MinValue real null,
        MaxValue real null,
        Cells integer not null,
        NsRes real null,
        EwRes real null,
        constraint referenceable_Map_Identity primary key (
            Map_Identity
        )
    );
    create table if not exists Dataset (
        Dataset_Identity text not null,
        DatasetKind text not null,
        TemporalType text not null,
        TimeUnit text null,
        Granularity text null,
        Title text not null,
        Description text not null,
        StartTime any null,
        EndTime any null,
        MapTime text null,
        North real null,
        South real null,
        East real null,
        West real null,
        Top real null,
        Bottom real null,
        MapCount integer not null default 0,
        MinMin real null,
        MinMax real null,
        MaxMin real null,
        MaxMax real null,
        NsResMin real null,
        NsResMax real null,
        EwResMin real null,
        EwResMax real null,
        constraint referenceable_Dataset_Identity primary key (
            Dataset_Identity
        )
    );
";

pub struct SqliteGateway {
    connection: Connection,
}

impl SqliteGateway {
    pub fn open(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory(),
            PersistenceMode::File(path) => Connection::open(path),
        }
        .map_err(|e| TgisError::persistence("open", e))?;
        connection
            .execute_batch(SCHEMA)
            .map_err(|e| TgisError::persistence(SCHEMA, e))?;
        Ok(Self { connection })
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    fn batch(&mut self, sql: &'static str) -> Result<()> {
        self.connection
            .execute_batch(sql)
            .map_err(|e| TgisError::persistence(sql, e))
    }
}

impl PersistenceGateway for SqliteGateway {
    fn execute(&mut self, statement: &Statement) -> Result<RowSet> {
        let fail = |e: rusqlite::Error| TgisError::persistence(statement.sql, e);
        let mut prepared = self.connection.prepare_cached(statement.sql).map_err(fail)?;
        let columns = prepared.column_count();
        let params = rusqlite::params_from_iter(statement.params.iter());
        if columns == 0 {
            prepared.execute(params).map_err(fail)?;
            return Ok(RowSet::new());
        }
        let mut rows = prepared.query(params).map_err(fail)?;
        let mut result = RowSet::new();
        while let Some(row) = rows.next().map_err(fail)? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(Value::from(row.get::<_, SqlValue>(i).map_err(fail)?));
            }
            result.push(Row::new(values));
        }
        Ok(result)
    }
    fn execute_script(&mut self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }
    fn begin(&mut self) -> Result<()> {
        self.batch("begin")
    }
    fn commit(&mut self) -> Result<()> {
        self.batch("commit")
    }
    fn rollback(&mut self) -> Result<()> {
        self.batch("rollback")
    }
    fn table_exists(&mut self, table: &str) -> Result<bool> {
        let rows = self.execute(&Statement::new(TABLE_EXISTS).bind(table))?;
        Ok(!rows.is_empty())
    }
}

const TABLE_EXISTS: &str = "
    select name
        from sqlite_master
        where type = 'table'
        and name = ?
";

// ------------- Map statements -------------
// Expands to a select of all map columns, in the order map_from_row reads them.
macro_rules! select_map_columns {
    ($rest:literal) => {
        concat!(
            "
            select m.Map_Identity,
                    m.MemberKind,
                    m.TemporalType,
                    m.TimeUnit,
                    m.StartTime,
                    m.EndTime,
                    m.Timezone,
                    m.North,
                    m.South,
                    m.East,
                    m.West,
                    m.Top,
                    m.Bottom,
                    m.Title,
                    m.Description,
                    m.MinValue,
                    m.MaxValue,
                    m.Cells,
                    m.NsRes,
                    m.EwRes
                from Map m
            ",
            $rest
        )
    };
}
pub(crate) use select_map_columns;

pub const INSERT_MAP: &str = "
    insert into Map (
        Map_Identity,
        MemberKind,
        TemporalType,
        TimeUnit,
        StartTime,
        EndTime,
        Timezone,
        North,
        South,
        East,
        West,
        Top,
        Bottom,
        Title,
        Description,
        MinValue,
        MaxValue,
        Cells,
        NsRes,
        EwRes
    ) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

pub const GET_MAP: &str = select_map_columns!("where m.Map_Identity = ?");

pub const UPDATE_MAP_TIME: &str = "
    update Map
        set TemporalType = ?,
            TimeUnit = ?,
            StartTime = ?,
            EndTime = ?,
            Timezone = ?
        where Map_Identity = ?
";

pub const DELETE_MAP: &str = "
    delete from Map
        where Map_Identity = ?
";

// ------------- Dataset statements -------------
pub const INSERT_DATASET: &str = "
    insert into Dataset (
        Dataset_Identity,
        DatasetKind,
        TemporalType,
        TimeUnit,
        Granularity,
        Title,
        Description
    ) values (?, ?, ?, ?, ?, ?, ?)
";

pub const GET_DATASET: &str = "
    select Dataset_Identity,
            DatasetKind,
            TemporalType,
            TimeUnit,
            Granularity,
            Title,
            Description,
            StartTime,
            EndTime,
            MapTime,
            North,
            South,
            East,
            West,
            Top,
            Bottom,
            MapCount,
            MinMin,
            MinMax,
            MaxMin,
            MaxMax,
            NsResMin,
            NsResMax,
            EwResMin,
            EwResMax
        from Dataset
        where Dataset_Identity = ?
";

pub const DELETE_DATASET: &str = "
    delete from Dataset
        where Dataset_Identity = ?
";

pub const RENAME_DATASET: &str = "
    update Dataset
        set Dataset_Identity = ?
        where Dataset_Identity = ?
";

pub const UPDATE_DATASET_TEMPORAL_EXTENT: &str = "
    update Dataset
        set StartTime = ?,
            EndTime = ?
        where Dataset_Identity = ?
";

pub const GET_DATASET_END_TIME: &str = "
    select EndTime
        from Dataset
        where Dataset_Identity = ?
";

pub const UPDATE_DATASET_DERIVED: &str = "
    update Dataset
        set StartTime = ?,
            EndTime = ?,
            MapTime = ?,
            North = ?,
            South = ?,
            East = ?,
            West = ?,
            Top = ?,
            Bottom = ?,
            MapCount = ?,
            MinMin = ?,
            MinMax = ?,
            MaxMin = ?,
            MaxMax = ?,
            NsResMin = ?,
            NsResMax = ?,
            EwResMin = ?,
            EwResMax = ?
        where Dataset_Identity = ?
";

pub const UPDATE_DATASET_GRANULARITY: &str = "
    update Dataset
        set Granularity = ?
        where Dataset_Identity = ?
";

// ------------- Codecs -------------
pub fn time_to_value(time: Option<TimePoint>) -> Value {
    match time {
        None => Value::Null,
        Some(TimePoint::Absolute(t)) => Value::Text(format_datetime(&t)),
        Some(TimePoint::Relative(t)) => Value::Integer(t),
    }
}

pub fn value_to_time(value: &Value, temporal_type: TemporalType) -> Result<Option<TimePoint>> {
    match (value, temporal_type) {
        (Value::Null, _) => Ok(None),
        (Value::Text(t), TemporalType::Absolute) => Ok(Some(TimePoint::Absolute(parse_datetime(t)?))),
        (Value::Integer(t), TemporalType::Relative(_)) => Ok(Some(TimePoint::Relative(*t))),
        (other, _) => Err(TgisError::corruption(format!(
            "stored time {:?} is not {} time",
            other, temporal_type
        ))),
    }
}

/// The TemporalType and TimeUnit columns.
pub fn temporal_type_to_values(temporal_type: Option<TemporalType>) -> (Value, Value) {
    match temporal_type {
        None => (Value::Null, Value::Null),
        Some(t) => (t.name().into(), t.unit().map(|u| u.plural()).into()),
    }
}

pub fn temporal_type_from_values(kind: Option<String>, unit: Option<String>) -> Result<Option<TemporalType>> {
    match (kind.as_deref(), unit) {
        (None, _) => Ok(None),
        (Some("absolute"), _) => Ok(Some(TemporalType::Absolute)),
        (Some("relative"), Some(unit)) => Ok(Some(TemporalType::Relative(unit.parse()?))),
        (Some(other), unit) => Err(TgisError::corruption(format!(
            "invalid temporal type {} ({:?})",
            other, unit
        ))),
    }
}

fn temporal_value_from_row(
    row: &Row,
    temporal_type: Option<TemporalType>,
    start: usize,
    end: usize,
    timezone: Option<i32>,
) -> Result<Option<TemporalValue>> {
    let Some(temporal_type) = temporal_type else {
        return Ok(None);
    };
    let Some(start) = value_to_time(row.get(start)?, temporal_type)? else {
        return Ok(None);
    };
    let end = value_to_time(row.get(end)?, temporal_type)?;
    TemporalValue::from_points(temporal_type, start, end, timezone).map(Some)
}

/// Time columns of a map in UPDATE_MAP_TIME order, without the identity.
pub fn map_time_params(temporal: Option<&TemporalValue>) -> Vec<Value> {
    let (kind, unit) = temporal_type_to_values(temporal.map(TemporalValue::temporal_type));
    vec![
        kind,
        unit,
        time_to_value(temporal.map(TemporalValue::start)),
        time_to_value(temporal.and_then(TemporalValue::end)),
        temporal.and_then(TemporalValue::timezone).map(i64::from).into(),
    ]
}

pub fn map_params(map: &Map) -> Vec<Value> {
    let time = map_time_params(map.temporal.as_ref());
    let mut params = Vec::with_capacity(20);
    params.push(Value::from(&map.id));
    params.push(map.kind.as_str().into());
    params.extend(time);
    let s = &map.spatial;
    for v in [s.north, s.south, s.east, s.west, s.top, s.bottom] {
        params.push(v.into());
    }
    let md = &map.metadata;
    params.push(md.title.as_str().into());
    params.push(md.description.as_str().into());
    params.push(md.min.into());
    params.push(md.max.into());
    params.push(md.cells.into());
    params.push(md.nsres.into());
    params.push(md.ewres.into());
    params
}

pub fn map_from_row(row: &Row) -> Result<Map> {
    let id: Identity = row.text(0)?.parse()?;
    let temporal_type = temporal_type_from_values(row.opt_text(2)?, row.opt_text(3)?)?;
    let timezone = row
        .opt_integer(6)?
        .map(|tz| i32::try_from(tz).map_err(|_| TgisError::corruption(format!("invalid timezone {}", tz))))
        .transpose()?;
    Ok(Map {
        id,
        kind: row.text(1)?.parse()?,
        temporal: temporal_value_from_row(row, temporal_type, 4, 5, timezone)?,
        spatial: SpatialExtent::new(
            row.real(7)?,
            row.real(8)?,
            row.real(9)?,
            row.real(10)?,
            row.real(11)?,
            row.real(12)?,
        ),
        metadata: MapMetadata {
            title: row.text(13)?,
            description: row.text(14)?,
            min: row.opt_real(15)?,
            max: row.opt_real(16)?,
            cells: row.integer(17)?,
            nsres: row.opt_real(18)?,
            ewres: row.opt_real(19)?,
        },
    })
}

pub fn dataset_params(dataset: &SpaceTimeDataset) -> Vec<Value> {
    let (kind, unit) = temporal_type_to_values(Some(dataset.temporal_type));
    vec![
        Value::from(&dataset.id),
        dataset.kind.as_str().into(),
        kind,
        unit,
        dataset.granularity.map(|g| g.to_string()).into(),
        dataset.title.as_str().into(),
        dataset.description.as_str().into(),
    ]
}

pub fn dataset_from_row(row: &Row) -> Result<SpaceTimeDataset> {
    let id: Identity = row.text(0)?.parse()?;
    let temporal_type = temporal_type_from_values(Some(row.text(2)?), row.opt_text(3)?)?
        .ok_or_else(|| TgisError::corruption(format!("dataset <{}> has no temporal type", id)))?;
    let granularity = row
        .opt_text(4)?
        .map(|g| Granularity::parse(&g, temporal_type))
        .transpose()?;
    let spatial = match row.opt_real(10)? {
        Some(north) => Some(SpatialExtent::new(
            north,
            row.real(11)?,
            row.real(12)?,
            row.real(13)?,
            row.real(14)?,
            row.real(15)?,
        )),
        None => None,
    };
    Ok(SpaceTimeDataset {
        kind: row.text(1)?.parse()?,
        temporal_type,
        granularity,
        title: row.text(5)?,
        description: row.text(6)?,
        temporal: temporal_value_from_row(row, Some(temporal_type), 7, 8, None)?,
        map_time: row.opt_text(9)?.map(|m| m.parse::<MapTime>()).transpose()?,
        spatial,
        metadata: AggregateMetadata {
            count: row.integer(16)?,
            min_min: row.opt_real(17)?,
            min_max: row.opt_real(18)?,
            max_min: row.opt_real(19)?,
            max_max: row.opt_real(20)?,
            nsres_min: row.opt_real(21)?,
            nsres_max: row.opt_real(22)?,
            ewres_min: row.opt_real(23)?,
            ewres_max: row.opt_real(24)?,
        },
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::MemberKind;
    use crate::datatype::TimeUnit;

    #[test]
    fn schema_is_created_on_open() {
        let mut gateway = SqliteGateway::open(&PersistenceMode::InMemory).unwrap();
        assert!(gateway.table_exists("Map").unwrap());
        assert!(gateway.table_exists("Dataset").unwrap());
        assert!(!gateway.table_exists("Registration").unwrap());
    }

    #[test]
    fn maps_survive_a_round_trip() {
        let mut gateway = SqliteGateway::open(&PersistenceMode::InMemory).unwrap();
        let map = Map::new("a@m".parse().unwrap(), MemberKind::Vector)
            .with_time(TemporalValue::relative(3, Some(7), TimeUnit::Months))
            .with_spatial(SpatialExtent::new(1.0, -1.0, 2.0, -2.0, 0.0, 0.0))
            .with_metadata(MapMetadata {
                title: "roads".into(),
                cells: 42,
                min: Some(0.5),
                ..MapMetadata::default()
            });
        gateway
            .execute(&Statement::with_params(INSERT_MAP, map_params(&map)))
            .unwrap();
        let rows = gateway
            .execute(&Statement::new(GET_MAP).bind(&map.id))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(map_from_row(&rows[0]).unwrap(), map);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut gateway = SqliteGateway::open(&PersistenceMode::InMemory).unwrap();
        let map = Map::new("a@m".parse().unwrap(), MemberKind::Raster);
        {
            let mut tx = Transaction::begin(&mut gateway).unwrap();
            tx.execute(&Statement::with_params(INSERT_MAP, map_params(&map)))
                .unwrap();
        }
        let rows = gateway
            .execute(&Statement::new(GET_MAP).bind(&map.id))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn absolute_time_is_stored_as_text() {
        let t = parse_datetime("2001-01-01 10:00:00").unwrap();
        let value = time_to_value(Some(TimePoint::Absolute(t)));
        assert_eq!(value, Value::Text("2001-01-01 10:00:00".into()));
        assert_eq!(
            value_to_time(&value, TemporalType::Absolute).unwrap(),
            Some(TimePoint::Absolute(t))
        );
        assert!(value_to_time(&value, TemporalType::Relative(TimeUnit::Days)).is_err());
    }
}
