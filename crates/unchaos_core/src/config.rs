//! TOML application configuration.
//!
//! # Responsibility
//! - Parse the config file into typed sections.
//! - Resolve relative paths against the config file's directory.
//!
//! # Invariants
//! - `database.path` is required and non-blank.
//! - Every other key has a default.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A required key is absent or blank.
    MissingKey(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "cannot parse config `{}`: {source}", path.display())
            }
            Self::MissingKey(key) => write!(f, "missing required config key `{key}`"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::MissingKey(_) => None,
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Absolute (or caller-relative) database file path.
    pub database_path: PathBuf,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    /// Root specs bulk-loaded by `graph init`.
    pub location_roots: Vec<String>,
}

/// Language-model collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Model used for location suggestions.
    pub model_basic: String,
    /// Model used for metadata assignment.
    pub model_reason: String,
    pub model_embed: String,
    /// Request timeout; absent means no timeout.
    pub timeout_secs: Option<u64>,
}

impl LlmConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model_basic: DEFAULT_CHAT_MODEL.to_string(),
            model_reason: DEFAULT_CHAT_MODEL.to_string(),
            model_embed: DEFAULT_EMBED_MODEL.to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`; `None` uses the build default.
    pub level: Option<String>,
    /// Log directory; `None` means `<database dir>/logs`.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    database: RawDatabase,
    llm: LlmConfig,
    logging: LoggingConfig,
    locations: RawLocations,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDatabase {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLocations {
    roots: Vec<String>,
}

impl AppConfig {
    /// Reads and resolves a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml_str(&contents, base_dir).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parses TOML text, resolving relative paths against `base_dir`.
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;

        let database_path = raw
            .database
            .path
            .filter(|path| !path.as_os_str().to_string_lossy().trim().is_empty())
            .ok_or(ConfigError::MissingKey("database.path"))?;

        let mut logging = raw.logging;
        logging.dir = logging.dir.map(|dir| resolve(base_dir, dir));

        Ok(Self {
            database_path: resolve(base_dir, database_path),
            llm: raw.llm,
            logging,
            location_roots: raw.locations.roots,
        })
    }

    /// Log directory, defaulting next to the database file.
    pub fn log_dir(&self) -> PathBuf {
        match &self.logging.dir {
            Some(dir) => dir.clone(),
            None => self
                .database_path
                .parent()
                .map(|parent| parent.join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs")),
        }
    }
}

/// `~/.unchaos/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".unchaos").join("config.toml"))
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
