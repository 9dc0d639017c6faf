//! Profile-keyed settings, read from a TOML file with one table per host.
//!
//! ```toml
//! ["dendra.science"]
//! auth_token = "..."
//! catalogue_url = "https://dendra.science/api/stac/v1"
//! data_dir = "/data/dendra"
//! redownload = false
//! add_to_active_map = false
//! ```
use crate::error::ConfigError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

const AUTH_TOKEN: &str = "auth_token";
const CATALOGUE_URL: &str = "catalogue_url";
const DATA_DIR: &str = "data_dir";
const REDOWNLOAD: &str = "redownload";
const ADD_TO_ACTIVE_MAP: &str = "add_to_active_map";
const CACHE_DURATION_MINS: &str = "cache_duration_mins";

/// Number of token characters left visible by `show-settings`.
const VISIBLE_TOKEN_CHARS: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    auth_token: String,
    catalogue_url: String,
    data_dir: PathBuf,
    redownload: bool,
    add_to_active_map: bool,
    cache_duration_mins: Option<u64>,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P, host: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, host)
    }

    /// Resolves the `host` profile and creates its data directory if needed.
    pub fn parse(content: &str, host: &str) -> Result<Self, ConfigError> {
        let table: Table = content.parse()?;
        let section = table
            .get(host)
            .and_then(Value::as_table)
            .ok_or_else(|| ConfigError::ProfileNotFound(host.to_string()))?;

        let settings = Self {
            auth_token: auth_token(section)?,
            catalogue_url: catalogue_url(section)?,
            data_dir: data_dir(section)?,
            redownload: flag(section, REDOWNLOAD)?,
            add_to_active_map: flag(section, ADD_TO_ACTIVE_MAP)?,
            cache_duration_mins: cache_duration_mins(section)?,
        };

        fs::create_dir_all(&settings.data_dir).map_err(|source| ConfigError::DataDir {
            path: settings.data_dir.clone(),
            source,
        })?;

        Ok(settings)
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn catalogue_url(&self) -> &str {
        &self.catalogue_url
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn redownload(&self) -> bool {
        self.redownload
    }

    pub fn add_to_active_map(&self) -> bool {
        self.add_to_active_map
    }

    pub fn cache_duration_mins(&self) -> Option<u64> {
        self.cache_duration_mins
    }

    fn masked_token(&self) -> String {
        let visible: String = self.auth_token.chars().take(VISIBLE_TOKEN_CHARS).collect();
        format!("{visible}*")
    }
}

/// One `key: value` line per setting, sorted by key, with the token masked.
impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{ADD_TO_ACTIVE_MAP}: {}", self.add_to_active_map)?;
        writeln!(f, "{AUTH_TOKEN}: {}", self.masked_token())?;
        if let Some(mins) = self.cache_duration_mins {
            writeln!(f, "{CACHE_DURATION_MINS}: {mins}")?;
        }
        writeln!(f, "{CATALOGUE_URL}: {}", self.catalogue_url)?;
        writeln!(f, "{DATA_DIR}: {}", self.data_dir.display())?;
        writeln!(f, "{REDOWNLOAD}: {}", self.redownload)
    }
}

fn auth_token(section: &Table) -> Result<String, ConfigError> {
    string(section, AUTH_TOKEN)?.ok_or(ConfigError::MissingAuthToken)
}

fn catalogue_url(section: &Table) -> Result<String, ConfigError> {
    let url = string(section, CATALOGUE_URL)?.ok_or(ConfigError::MissingCatalogueUrl)?;
    Ok(url.trim_end_matches('/').to_string())
}

fn data_dir(section: &Table) -> Result<PathBuf, ConfigError> {
    string(section, DATA_DIR)?
        .map(PathBuf::from)
        .ok_or(ConfigError::MissingDataDir)
}

fn cache_duration_mins(section: &Table) -> Result<Option<u64>, ConfigError> {
    match section.get(CACHE_DURATION_MINS) {
        None => Ok(None),
        Some(Value::Integer(mins)) if *mins >= 0 => Ok(Some(*mins as u64)),
        Some(_) => Err(ConfigError::InvalidValue {
            key: CACHE_DURATION_MINS,
            expected: "a non-negative integer",
        }),
    }
}

/// Empty strings count as absent.
fn string(section: &Table, key: &'static str) -> Result<Option<String>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(ConfigError::InvalidValue {
            key,
            expected: "a string",
        }),
    }
}

fn flag(section: &Table, key: &'static str) -> Result<bool, ConfigError> {
    match section.get(key) {
        None => Ok(false),
        Some(Value::Boolean(b)) => Ok(*b),
        Some(_) => Err(ConfigError::InvalidValue {
            key,
            expected: "true or false",
        }),
    }
}
