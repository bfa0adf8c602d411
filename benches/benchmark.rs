use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use tgis::construct::{DatasetKind, Identity, Map, MemberKind};
use tgis::database::{MapFilter, MapOrder, TemporalDatabase, TimeAssignment};
use tgis::datatype::{TemporalType, TemporalValue, TimeUnit};
use tgis::persist::PersistenceMode;
use tgis::relation::classify;
use tgis::topology;

fn grid(size: i64) -> Vec<TemporalValue> {
    let mut values = Vec::new();
    for start in 0..size {
        values.push(TemporalValue::relative(start, None, TimeUnit::Days));
        for end in start..size {
            values.push(TemporalValue::relative(start, Some(end), TimeUnit::Days));
        }
    }
    values
}

fn database(maps: usize) -> (TemporalDatabase, Identity) {
    let mut db = TemporalDatabase::new(PersistenceMode::InMemory).unwrap();
    let stds: Identity = "bench@PERMANENT".parse().unwrap();
    db.create_dataset(&stds, DatasetKind::Strds, TemporalType::Absolute, None, "", "")
        .unwrap();
    let members: Vec<Map> = (0..maps)
        .map(|i| Map::new(format!("m{}@PERMANENT", i).parse().unwrap(), MemberKind::Raster))
        .collect();
    let daily = TimeAssignment::absolute("2001-01-01", "1 day", true).unwrap();
    db.register_maps(&stds, &members, Some(&daily)).unwrap();
    (db, stds)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let values = grid(20);
    println!("{} values, {} pairs", values.len(), values.len() * values.len());
    c.bench_function("classify grid", |b| {
        b.iter(|| {
            for a in &values {
                for v in &values {
                    black_box(classify(a, v).unwrap());
                }
            }
        })
    });

    let (mut db, stds) = database(1000);
    c.bench_function("recompute 1k", |b| {
        b.iter(|| black_box(db.update_from_registered_maps(&stds).unwrap()))
    });
    let maps = db
        .get_registered_maps(&stds, &MapFilter::all(), MapOrder::StartTime)
        .unwrap();
    c.bench_function("relation counts 1k", |b| {
        b.iter(|| black_box(topology::count_temporal_relations(&maps).unwrap()))
    });

    let extra = Map::new("extra@PERMANENT".parse().unwrap(), MemberKind::Raster)
        .with_time(TemporalValue::parse_absolute("2005-01-01", None).unwrap());
    c.bench_function("register and unregister 1k", |b| {
        b.iter(|| {
            db.register(&extra, &stds).unwrap();
            db.unregister(&extra.id, &stds).unwrap();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
