//! Configuration loading and validation.
//!
//! Configuration is layered with [`figment`], later layers overriding
//! earlier ones:
//! 1. built-in defaults,
//! 2. a TOML, YAML or JSON file (by extension), either given explicitly or
//!    found in the platform configuration directory,
//! 3. `RECON_`-prefixed environment variables, with `__` separating nested
//!    keys (`RECON_AREAS__PEOPLE__DRY_RUN=true`).
//!
//! ```toml
//! database = "/var/lib/recon/cache.sqlite"
//! log_level = "debug"
//!
//! [areas.people]
//! key = "id"
//! store = "sqlite"
//! format = "csv"
//! normalize = true
//! fields = [
//!     { name = "id", kind = "text", source = "Entry #" },
//!     { name = "joined", kind = "datetime", source = "Date Joined", managed = "datetime" },
//! ]
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use recon_mapper::managed_attribute;
use recon_model::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "RECON_";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "recon")
}

/// Default configuration file location, if the platform has one.
pub fn default_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn default_database() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("cache.sqlite"))
        .unwrap_or_else(|| PathBuf::from("recon.sqlite"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    Sqlite,
    Kv,
}

/// File format of an area's source path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// One JSON object per line, `*.jsonl` within directories.
    #[default]
    Jsonl,
    /// Comma separated values under a header row, `*.csv` within directories.
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database shared by every `sqlite` area.
    pub database: PathBuf,
    pub log_level: LogLevel,
    pub areas: BTreeMap<String, AreaConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            log_level: LogLevel::default(),
            areas: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    /// Name of the identity attribute on source items.
    pub key: String,
    #[serde(default)]
    pub store: StoreKind,
    #[serde(default)]
    pub format: SourceFormat,
    /// Cached item layout. When empty, every attribute of the first source
    /// item is cached as-is.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    /// Attributes compared when deciding whether an item changed.
    #[serde(default)]
    pub checked: Option<Vec<String>>,
    /// Normalize source attribute names (lower-case, without spaces,
    /// dashes, parentheses and question marks).
    #[serde(default)]
    pub normalize: bool,
    /// Report what would change without writing anything.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub kv: Option<KvConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// Defaults to the kind the managed transform produces, or `raw`.
    #[serde(default)]
    pub kind: Option<FieldKind>,
    /// Source attribute to read; defaults to the field name.
    #[serde(default)]
    pub source: Option<String>,
    /// Managed attribute transform applied to the raw value.
    #[serde(default)]
    pub managed: Option<String>,
}

impl FieldConfig {
    pub fn kind(&self) -> FieldKind {
        self.kind
            .or_else(|| self.managed.as_deref().and_then(managed_attribute).map(|managed| managed.kind()))
            .unwrap_or(FieldKind::Raw)
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvConfig {
    pub base_url: String,
    /// Remote collection name; defaults to the area name.
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default = "KvConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl KvConfig {
    fn default_timeout() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// The layered configuration sources, without extracting them.
    ///
    /// An explicitly given file must exist; the default file is only used
    /// when present.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_path().filter(|path| path.exists()),
        };
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Loading configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(&file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&file)),
                Some("json") => figment.merge(Json::file_exact(&file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn area(&self, name: &str) -> Result<&AreaConfig> {
        match self.areas.get(name) {
            Some(area) => Ok(area),
            None => exn::bail!(ErrorKind::UnknownArea(name.to_string())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, area) in &self.areas {
            if let Err(reason) = area.check() {
                exn::bail!(ErrorKind::InvalidArea(name.clone(), reason));
            }
        }
        Ok(())
    }
}

impl AreaConfig {
    fn check(&self) -> std::result::Result<(), String> {
        if self.key.is_empty() {
            return Err("key must not be empty".to_string());
        }
        if self.store == StoreKind::Kv && self.kv.is_none() {
            return Err("kv store requires [kv] connection settings".to_string());
        }
        if self.fields.is_empty() {
            if self.checked.is_some() {
                return Err("checked attributes require explicit fields".to_string());
            }
            return Ok(());
        }
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(format!("duplicate field {}", field.name));
            }
            if let Some(managed) = &field.managed {
                let Some(transform) = managed_attribute(managed) else {
                    return Err(format!("unknown managed attribute {managed} on field {}", field.name));
                };
                if field.kind() != transform.kind() {
                    return Err(format!("managed attribute {managed} does not fit the kind of field {}", field.name));
                }
            }
        }
        if !names.contains(self.key.as_str()) {
            return Err(format!("key {} is not a declared field", self.key));
        }
        if let Some(unknown) = self.checked.iter().flatten().find(|name| !names.contains(name.as_str())) {
            return Err(format!("checked attribute {unknown} is not a declared field"));
        }
        Ok(())
    }
}
