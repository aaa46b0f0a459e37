//! Settings for the `vivero` binary.
//!
//! Read from an optional TOML file (`vivero.toml` by default) and then from
//! `VIVERO_*` environment variables, nested keys separated by `__`
//! (`VIVERO_APP__LEVEL=debug`, `VIVERO_DATABASE__SQLITE=./till.db`).
use config::{Config, ConfigError, Environment, File};
use engine::Viewport;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "vivero.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("./vivero.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Till {
    pub viewport: Viewport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub till: Till,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("VIVERO").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
