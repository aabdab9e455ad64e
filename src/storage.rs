//! Persisted shortcut settings.
//!
//! The settings store is a flat key/value surface over TOML values; the
//! shortcut engine addresses it through two keys. [`ShortcutSettings`] is the
//! validated schema at that boundary: non-string, empty, or missing entries
//! fall back to documented defaults instead of being coerced.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::shortcut;

/// Settings key holding the user's chosen shortcut.
pub const SELECTED_KEY: &str = "transcription.shortcut.selected";
/// Settings key holding the shortcut registered with the OS, if any.
/// An absent or empty value means nothing is registered.
pub const REGISTERED_KEY: &str = "transcription.shortcut.registered";
/// Settings key enabling log output to a file instead of stdout.
pub const LOG_TO_FILE_KEY: &str = "logging.to_file";
/// Settings key holding the log file path.
pub const LOG_PATH_KEY: &str = "logging.path";

/// Default log file location; `~` is expanded by the telemetry layer.
pub const DEFAULT_LOG_PATH: &str = "~/.ptt-hotkey/ptt-hotkey.log";

/// Errors from the persisted settings store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// HOME is required to locate the settings file.
    #[error("HOME environment variable not set")]
    HomeNotSet,
    /// Filesystem access failed.
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid TOML.
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Settings could not be encoded as TOML.
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Persisted key-value store with explicit flush semantics.
///
/// `set` mutates the in-memory view; nothing reaches disk until `save`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Reads one value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<toml::Value>, PersistenceError>;
    /// Writes one value into the in-memory view.
    async fn set(&self, key: &str, value: toml::Value) -> Result<(), PersistenceError>;
    /// Flushes the in-memory view to storage.
    async fn save(&self) -> Result<(), PersistenceError>;
}

/// Validated shortcut settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutSettings {
    /// The user's chosen shortcut; falls back to the platform default.
    pub selected: String,
    /// The OS-registered shortcut; falls back to `None`.
    pub registered: Option<String>,
}

impl ShortcutSettings {
    /// Reads and validates both settings keys.
    ///
    /// # Errors
    /// Returns an error only when the store itself fails; invalid values
    /// never error, they fall back to defaults.
    pub async fn read(store: &dyn SettingsStore) -> Result<Self, PersistenceError> {
        let selected = match store.get(SELECTED_KEY).await? {
            Some(toml::Value::String(value)) if !value.trim().is_empty() => value,
            _ => shortcut::default_shortcut().to_owned(),
        };

        let registered = match store.get(REGISTERED_KEY).await? {
            Some(toml::Value::String(value)) if !value.trim().is_empty() => Some(value),
            _ => None,
        };

        Ok(Self {
            selected,
            registered,
        })
    }

    /// Writes both settings keys and flushes.
    ///
    /// `registered: None` is persisted as an empty string, which reads back
    /// as `None`.
    ///
    /// # Errors
    /// Returns an error when any store write or the flush fails.
    pub async fn write(&self, store: &dyn SettingsStore) -> Result<(), PersistenceError> {
        store
            .set(SELECTED_KEY, toml::Value::String(self.selected.clone()))
            .await?;

        let registered = self.registered.clone().unwrap_or_default();
        store
            .set(REGISTERED_KEY, toml::Value::String(registered))
            .await?;

        store.save().await
    }
}

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Whether log output goes to a file; defaults to stdout.
    pub to_file: bool,
    /// Log file path; falls back to [`DEFAULT_LOG_PATH`].
    pub path: String,
}

impl LoggingSettings {
    /// Reads and validates both logging keys.
    ///
    /// # Errors
    /// Returns an error only when the store itself fails; invalid values
    /// fall back to stdout logging at the default path.
    pub async fn read(store: &dyn SettingsStore) -> Result<Self, PersistenceError> {
        let to_file = match store.get(LOG_TO_FILE_KEY).await? {
            Some(toml::Value::Boolean(value)) => value,
            _ => false,
        };

        let path = match store.get(LOG_PATH_KEY).await? {
            Some(toml::Value::String(value)) if !value.trim().is_empty() => value,
            _ => DEFAULT_LOG_PATH.to_owned(),
        };

        Ok(Self { to_file, path })
    }
}

/// File-backed settings store (`~/.ptt-hotkey/settings.toml`).
///
/// Reads the whole file once at construction; `save` rewrites it.
#[derive(Debug)]
pub struct TomlSettings {
    path: PathBuf,
    values: Mutex<toml::Table>,
}

impl TomlSettings {
    /// Opens the settings file, creating it with defaults on first run.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, created, or parsed.
    pub fn load(path: PathBuf) -> Result<Self, PersistenceError> {
        if !path.exists() {
            let values = Self::create_default(&path)?;
            info!(path = %path.display(), "created default settings file");
            return Ok(Self {
                path,
                values: Mutex::new(values),
            });
        }

        let contents = fs::read_to_string(&path)?;
        let values: toml::Table = toml::from_str(&contents)?;

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Opens the settings file at its default location under HOME.
    ///
    /// # Errors
    /// Returns an error if HOME is unset or the file cannot be opened.
    pub fn load_default() -> Result<Self, PersistenceError> {
        Self::load(Self::default_path()?)
    }

    fn default_path() -> Result<PathBuf, PersistenceError> {
        let home = std::env::var("HOME").map_err(|_| PersistenceError::HomeNotSet)?;
        Ok(PathBuf::from(home).join(".ptt-hotkey").join("settings.toml"))
    }

    fn create_default(path: &Path) -> Result<toml::Table, PersistenceError> {
        let mut values = toml::Table::new();
        values.insert(
            SELECTED_KEY.to_owned(),
            toml::Value::String(shortcut::default_shortcut().to_owned()),
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(&values)?)?;

        Ok(values)
    }
}

#[async_trait]
impl SettingsStore for TomlSettings {
    async fn get(&self, key: &str) -> Result<Option<toml::Value>, PersistenceError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: toml::Value) -> Result<(), PersistenceError> {
        self.values.lock().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn save(&self) -> Result<(), PersistenceError> {
        let contents = toml::to_string_pretty(&*self.values.lock().await)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}
