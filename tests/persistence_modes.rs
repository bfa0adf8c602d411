use tgis::config::Settings;
use tgis::construct::{DatasetKind, Identity, Map, MapTime, MemberKind};
use tgis::database::TemporalDatabase;
use tgis::datatype::{TemporalType, TemporalValue, TimeUnit};
use tgis::persist::{PersistenceGateway, PersistenceMode};

fn id(s: &str) -> Identity {
    s.parse().expect("identity")
}

#[test]
fn in_memory_mode_allows_basic_operations() {
    let mut db = TemporalDatabase::new(PersistenceMode::InMemory).expect("db");
    let stds = id("A@PERMANENT");
    db.create_dataset(&stds, DatasetKind::Stvds, TemporalType::Relative(TimeUnit::Months), None, "", "")
        .expect("dataset");
    // the registration table is only created on first use
    assert!(!db.gateway_mut().table_exists("Registration").unwrap());
    let map = Map::new(id("roads@PERMANENT"), MemberKind::Vector)
        .with_time(TemporalValue::relative(0, Some(3), TimeUnit::Months));
    assert!(db.register(&map, &stds).expect("register"));
    assert!(db.gateway_mut().table_exists("Registration").unwrap());
    assert!(db.is_registered(&map.id, &stds).unwrap());
}

#[test]
fn file_mode_persists_across_reopening() {
    let path = "test_tgis_temp.db".to_string();
    // Ensure clean start
    let _ = std::fs::remove_file(&path);
    let stds = id("A@PERMANENT");
    {
        let mut db = TemporalDatabase::new(PersistenceMode::File(path.clone())).expect("db");
        db.create_dataset(&stds, DatasetKind::Strds, TemporalType::Absolute, None, "audit", "")
            .expect("dataset");
        let map = Map::new(id("a1@PERMANENT"), MemberKind::Raster)
            .with_time(TemporalValue::parse_absolute("2001-01-01 06:30:00", Some("2001-01-02")).unwrap());
        db.register(&map, &stds).expect("register");
    }
    let mut db = TemporalDatabase::new(PersistenceMode::File(path.clone())).expect("reopen");
    let reopened = db.get_dataset(&stds).expect("dataset survives");
    assert_eq!(reopened.title, "audit");
    assert_eq!(reopened.map_time, Some(MapTime::Interval));
    assert_eq!(
        reopened.temporal,
        Some(TemporalValue::parse_absolute("2001-01-01 06:30:00", Some("2001-01-02")).unwrap())
    );
    assert_eq!(db.get_registered_datasets(&id("a1@PERMANENT")).unwrap(), vec![stds]);
    drop(db);
    // Clean up
    let _ = std::fs::remove_file(&path);
}

#[test]
fn settings_choose_the_backend() {
    let path = "test_tgis_settings.db".to_string();
    let _ = std::fs::remove_file(&path);
    let stds = id("A@PERMANENT");

    let mut memory = TemporalDatabase::from_settings(&Settings::default()).expect("in memory");
    memory
        .create_dataset(&stds, DatasetKind::Strds, TemporalType::Absolute, None, "", "")
        .expect("dataset");
    drop(memory);
    let mut memory = TemporalDatabase::from_settings(&Settings::default()).expect("in memory");
    assert!(memory.get_dataset(&stds).is_err());

    let settings = Settings {
        database: Some(path.clone()),
        ..Settings::default()
    };
    {
        let mut db = TemporalDatabase::from_settings(&settings).expect("file");
        db.create_dataset(&stds, DatasetKind::Strds, TemporalType::Absolute, None, "kept", "")
            .expect("dataset");
    }
    let mut db = TemporalDatabase::from_settings(&settings).expect("reopen");
    assert_eq!(db.get_dataset(&stds).unwrap().title, "kept");
    drop(db);
    let _ = std::fs::remove_file(&path);
}
