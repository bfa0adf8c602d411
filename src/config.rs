// config lets you read a separate config file
use ::config::{Config, Environment, File};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::construct::Identity;
use crate::error::{Result, TgisError};
use crate::persist::PersistenceMode;

pub const DEFAULT_MAPSET: &str = "PERMANENT";
pub const DEFAULT_LOG_FILTER: &str = "tgis=info";

/// Settings are read from defaults, then an optional TOML file, then
/// `TGIS_*` environment variables, later sources overriding earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// path of the SQLite database, in memory when absent
    pub database: Option<String>,
    /// the mapset that unqualified names belong to
    pub mapset: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            mapset: DEFAULT_MAPSET.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("mapset", DEFAULT_MAPSET)?
            .set_default("log_filter", DEFAULT_LOG_FILTER)?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("TGIS"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
    pub fn persistence_mode(&self) -> PersistenceMode {
        match &self.database {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        }
    }
    /// Qualifies a bare name with the configured mapset, `name@mapset`
    /// identities are taken as they are.
    pub fn identity(&self, name: &str) -> Result<Identity> {
        if name.contains('@') {
            name.parse()
        } else {
            Identity::new(name, &self.mapset)
        }
    }
}

/// Installs a formatting subscriber. `RUST_LOG` takes precedence over the
/// configured filter.
pub fn init_tracing(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .map_err(|e| TgisError::Config(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| TgisError::Config(e.to_string()))
}
