use tgis::construct::{DatasetKind, Identity, Map, MapTime, MemberKind};
use tgis::database::{TemporalDatabase, TimeAssignment};
use tgis::datatype::{TemporalType, TemporalValue, TimeUnit};
use tgis::granularity::Granularity;
use tgis::persist::PersistenceMode;
use tgis::relation::TemporalRelation;
use tgis::TgisError;

fn id(s: &str) -> Identity {
    s.parse().expect("identity")
}

fn map(name: &str, start: i64, end: Option<i64>) -> Map {
    Map::new(id(name), MemberKind::Raster).with_time(TemporalValue::relative(start, end, TimeUnit::Days))
}

fn days(t: i64, end: Option<i64>) -> Option<TemporalValue> {
    Some(TemporalValue::relative(t, end, TimeUnit::Days))
}

fn database(datasets: &[&str]) -> TemporalDatabase {
    let mut db = TemporalDatabase::new(PersistenceMode::InMemory).expect("db");
    for name in datasets {
        db.create_dataset(&id(name), DatasetKind::Strds, TemporalType::Relative(TimeUnit::Days), None, "", "")
            .expect("dataset");
    }
    db
}

fn names(maps: &[Map]) -> Vec<&str> {
    maps.iter().map(|m| m.id.name()).collect()
}

#[test]
fn shifting_moves_members_and_every_holding_dataset() {
    let mut db = database(&["A@m", "B@m"]);
    db.register(&map("m1@m", 0, Some(2)), &id("A@m")).unwrap();
    db.register(&map("m2@m", 2, Some(4)), &id("A@m")).unwrap();
    db.register(&map("m2@m", 2, Some(4)), &id("B@m")).unwrap();

    assert_eq!(db.shift(&id("A@m"), Granularity::Relative(5)).unwrap(), 2);
    assert_eq!(db.get_map(&id("m1@m")).unwrap().temporal, days(5, Some(7)));
    assert_eq!(db.get_dataset(&id("A@m")).unwrap().temporal, days(5, Some(9)));
    assert_eq!(db.get_dataset(&id("B@m")).unwrap().temporal, days(7, Some(9)));

    let before = db.get_dataset(&id("A@m")).unwrap();
    assert!(matches!(
        db.shift(&id("A@m"), Granularity::absolute(1, TimeUnit::Days)),
        Err(TgisError::Parse { .. })
    ));
    assert_eq!(db.get_dataset(&id("A@m")).unwrap(), before);
}

#[test]
fn shifting_absolute_members_follows_the_calendar() {
    let mut db = TemporalDatabase::new(PersistenceMode::InMemory).expect("db");
    let monthly = id("monthly@m");
    db.create_dataset(&monthly, DatasetKind::Strds, TemporalType::Absolute, None, "", "")
        .unwrap();
    let maps: Vec<Map> = (1..=3)
        .map(|i| Map::new(id(&format!("prec_{}@m", i)), MemberKind::Raster))
        .collect();
    let assignment = TimeAssignment::absolute("2001-01-01", "1 month", true).unwrap();
    db.register_maps(&monthly, &maps, Some(&assignment)).unwrap();

    db.shift(&monthly, Granularity::absolute(1, TimeUnit::Months)).unwrap();
    assert_eq!(
        db.get_dataset(&monthly).unwrap().temporal,
        Some(TemporalValue::parse_absolute("2001-02-01", Some("2001-05-01")).unwrap())
    );
    db.shift(&monthly, Granularity::absolute(-2, TimeUnit::Days)).unwrap();
    assert_eq!(
        db.get_map(&id("prec_1@m")).unwrap().temporal,
        Some(TemporalValue::parse_absolute("2001-01-30", Some("2001-02-27")).unwrap())
    );
}

#[test]
fn a_shift_that_overflows_changes_nothing() {
    let mut db = database(&["A@m"]);
    db.register(&map("early@m", 0, None), &id("A@m")).unwrap();
    db.register(&map("late@m", i64::MAX - 1, None), &id("A@m")).unwrap();
    let before = db.get_dataset(&id("A@m")).unwrap();

    assert!(db.shift(&id("A@m"), Granularity::Relative(5)).is_err());
    assert_eq!(db.get_map(&id("early@m")).unwrap().temporal, days(0, None));
    assert_eq!(db.get_dataset(&id("A@m")).unwrap(), before);
}

#[test]
fn snapping_closes_the_gaps_between_points() {
    let mut db = database(&["A@m"]);
    let a = id("A@m");
    for m in [map("p1@m", 0, None), map("p2@m", 2, None), map("p3@m", 6, None)] {
        db.register(&m, &a).unwrap();
    }
    assert_eq!(db.get_dataset(&a).unwrap().map_time, Some(MapTime::Point));

    // the last point takes the inferred granularity of two days
    assert_eq!(db.snap(&a).unwrap(), 3);
    assert_eq!(db.get_map(&id("p1@m")).unwrap().temporal, days(0, Some(2)));
    assert_eq!(db.get_map(&id("p2@m")).unwrap().temporal, days(2, Some(6)));
    assert_eq!(db.get_map(&id("p3@m")).unwrap().temporal, days(6, Some(8)));
    let stds = db.get_dataset(&a).unwrap();
    assert_eq!(stds.temporal, days(0, Some(8)));
    assert_eq!(stds.map_time, Some(MapTime::Interval));
    assert!(db.check_temporal_topology(&a).unwrap());

    // nothing left to snap
    assert_eq!(db.snap(&a).unwrap(), 0);
}

#[test]
fn snapping_leaves_members_sharing_a_start() {
    let mut db = TemporalDatabase::new(PersistenceMode::InMemory).expect("db");
    let q = id("Q@m");
    db.create_dataset(
        &q,
        DatasetKind::Strds,
        TemporalType::Relative(TimeUnit::Days),
        Some(Granularity::Relative(1)),
        "",
        "",
    )
    .unwrap();
    for m in [map("q1@m", 0, None), map("q2@m", 0, None), map("q3@m", 4, None)] {
        db.register(&m, &q).unwrap();
    }
    assert_eq!(db.snap(&q).unwrap(), 2);
    assert_eq!(db.get_map(&id("q1@m")).unwrap().temporal, days(0, None));
    assert_eq!(db.get_map(&id("q2@m")).unwrap().temporal, days(0, Some(4)));
    assert_eq!(db.get_map(&id("q3@m")).unwrap().temporal, days(4, Some(5)));
    assert_eq!(db.get_dataset(&q).unwrap().temporal, days(0, Some(5)));

    let mut db = database(&["E@m"]);
    assert_eq!(db.snap(&id("E@m")).unwrap(), 0);
}

#[test]
fn renaming_keeps_members_and_derived_state() {
    let mut db = database(&["A@m", "B@m", "E@m"]);
    // before anything was ever registered
    db.rename_dataset(&id("E@m"), &id("F@m")).unwrap();

    db.register(&map("m1@m", 0, Some(2)), &id("A@m")).unwrap();
    db.register(&map("m2@m", 3, None), &id("A@m")).unwrap();
    let before = db.get_dataset(&id("A@m")).unwrap();

    let renamed = db.rename_dataset(&id("A@m"), &id("Z@m")).unwrap();
    assert_eq!(renamed.id, id("Z@m"));
    assert_eq!(renamed.temporal, before.temporal);
    assert_eq!(renamed.metadata, before.metadata);
    assert!(matches!(db.get_dataset(&id("A@m")), Err(TgisError::UnknownDataset(_))));
    assert_eq!(db.get_registered_datasets(&id("m1@m")).unwrap(), vec![id("Z@m")]);
    assert!(db.is_registered(&id("m2@m"), &id("Z@m")).unwrap());

    assert!(matches!(
        db.rename_dataset(&id("Z@m"), &id("B@m")),
        Err(TgisError::DatasetExists(_))
    ));
    assert!(matches!(
        db.rename_dataset(&id("Z@m"), &id("Z@other")),
        Err(TgisError::InvalidOperation(_))
    ));
    assert!(matches!(
        db.rename_dataset(&id("A@m"), &id("Y@m")),
        Err(TgisError::UnknownDataset(_))
    ));
}

#[test]
fn sampling_by_the_timeline_of_another_dataset() {
    let mut db = database(&["D@m", "S@m", "P@m"]);
    let (d, s) = (id("D@m"), id("S@m"));
    for m in [map("s1@m", 0, Some(4)), map("s2@m", 6, Some(8))] {
        db.register(&m, &s).unwrap();
    }
    for m in [map("a@m", 1, Some(2)), map("b@m", 3, Some(7)), map("c@m", 5, None)] {
        db.register(&m, &d).unwrap();
    }

    let granules = db.sample_by_dataset(&d, &s, &[TemporalRelation::Contains]).unwrap();
    assert_eq!(granules.len(), 3);
    assert_eq!(granules[0].source, Some(id("s1@m")));
    assert_eq!(names(&granules[0].maps), ["a"]);
    assert_eq!(granules[1].source, None);
    assert_eq!(granules[1].temporal, TemporalValue::relative(4, Some(6), TimeUnit::Days));
    assert_eq!(names(&granules[1].maps), ["c"]);
    assert!(granules[2].is_empty());

    let wide = [TemporalRelation::Contains, TemporalRelation::Overlapped, TemporalRelation::Overlaps];
    let granules = db.sample_by_dataset(&d, &s, &wide).unwrap();
    assert_eq!(names(&granules[0].maps), ["a", "b"]);
    assert_eq!(names(&granules[2].maps), ["b"]);

    // a sampler made of points has no granules to offer
    db.register(&map("p@m", 1, None), &id("P@m")).unwrap();
    assert!(matches!(
        db.sample_by_dataset(&d, &id("P@m"), &wide),
        Err(TgisError::InvalidOperation(_))
    ));
    db.create_dataset(&id("T@m"), DatasetKind::Strds, TemporalType::Absolute, None, "", "")
        .unwrap();
    assert!(matches!(
        db.sample_by_dataset(&id("T@m"), &s, &wide),
        Err(TgisError::InvalidOperation(_))
    ));
}

#[test]
fn members_by_granularity() {
    let mut db = database(&["G@m", "P@m"]);
    let g = id("G@m");
    db.register(&map("map1@m", 2, Some(6)), &g).unwrap();
    db.register(&map("map2@m", 7, Some(13)), &g).unwrap();

    assert!(matches!(
        db.get_registered_maps_by_granularity(&g, None),
        Err(TgisError::InvalidOperation(_))
    ));
    let granules = db.get_registered_maps_by_granularity(&g, Some(Granularity::Relative(2))).unwrap();
    let filled: Vec<Vec<&str>> = granules.iter().map(|granule| names(&granule.maps)).collect();
    assert_eq!(filled, [["map1"], ["map1"], ["map2"], ["map2"], ["map2"], ["map2"]]);
    assert_eq!(granules[0].temporal, TemporalValue::relative(2, Some(4), TimeUnit::Days));

    // the inferred granularity of one day leaves a gap between the maps
    db.infer_granularity(&g).unwrap();
    let granules = db.get_registered_maps_by_granularity(&g, None).unwrap();
    assert_eq!(granules.len(), 11);
    assert!(granules[4].is_empty());
    assert!(matches!(
        db.get_registered_maps_by_granularity(&g, Some(Granularity::absolute(1, TimeUnit::Days))),
        Err(TgisError::Parse { .. })
    ));

    // a point at the end of the extent still gets its granule
    let p = id("P@m");
    db.register(&map("p0@m", 0, None), &p).unwrap();
    db.register(&map("p3@m", 3, None), &p).unwrap();
    let granules = db.get_registered_maps_by_granularity(&p, Some(Granularity::Relative(3))).unwrap();
    let filled: Vec<Vec<&str>> = granules.iter().map(|granule| names(&granule.maps)).collect();
    assert_eq!(filled, [["p0"], ["p3"]]);
}
