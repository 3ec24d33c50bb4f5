use crate::error::{BarnError, BarnResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding [`GoogleBooksConfig::api_key`].
pub const API_KEY_ENV: &str = "BARN_GOOGLE_BOOKS_API_KEY";

const APP_DIR: &str = "barn";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub google_books: GoogleBooksConfig,
    pub store: StoreConfig,
}

/// Tuning for the keystroke-driven search cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Quiet period after the last keystroke before a lookup is issued.
    pub debounce_ms: u64,
    /// Age after which a cached result is ignored.
    pub ttl_secs: u64,
    /// How often the background sweep evicts expired results.
    pub sweep_interval_secs: u64,
    /// Normalized queries shorter than this are never sent.
    pub min_query_len: usize,
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            ttl_secs: 300,
            sweep_interval_secs: 60,
            min_query_len: 2,
            max_results: 20,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleBooksConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for GoogleBooksConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/books/v1/volumes".to_owned(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: Option<PathBuf>,
}

impl StoreConfig {
    /// The configured database path, or `<data_dir>/barn/barn.db`.
    ///
    /// # Errors
    /// Returns [`BarnError::Config`] when no path is configured and the
    /// platform data directory cannot be determined.
    pub fn resolve_database_path(&self) -> BarnResult<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let data = dirs::data_dir()
            .ok_or_else(|| BarnError::Config("data directory not found".into()))?;
        Ok(data.join(APP_DIR).join("barn.db"))
    }
}

impl Config {
    /// Reads a JSON config file, applies environment overrides and validates it.
    ///
    /// Missing fields take their defaults.
    pub fn load(path: &Path) -> BarnResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&raw)?;
        debug!("loaded config from {}", path.display());

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Loads `<config_dir>/barn/config.json` if it exists, defaults otherwise.
    pub fn load_default() -> BarnResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                info!("no config file found, using defaults");
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            self.google_books.api_key = Some(key);
        }
    }

    /// Rejects settings that would make the search cache misbehave.
    pub fn validate(&self) -> BarnResult<()> {
        let search = &self.search;
        if search.debounce_ms == 0 {
            return Err(BarnError::Config("search.debounce_ms must be positive".into()));
        }
        if search.ttl_secs == 0 {
            return Err(BarnError::Config("search.ttl_secs must be positive".into()));
        }
        if search.sweep_interval_secs == 0 {
            return Err(BarnError::Config(
                "search.sweep_interval_secs must be positive".into(),
            ));
        }
        if search.min_query_len == 0 {
            return Err(BarnError::Config("search.min_query_len must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_file_keeps_defaults() -> BarnResult<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{ "search": {{ "debounce_ms": 150 }} }}"#)?;

        let config = Config::load(file.path())?;
        assert_eq!(config.search.debounce_ms, 150);
        assert_eq!(config.search.ttl_secs, 300);
        assert_eq!(config.search.min_query_len, 2);
        assert_eq!(config.google_books, GoogleBooksConfig {
            api_key: config.google_books.api_key.clone(),
            ..GoogleBooksConfig::default()
        });
        Ok(())
    }

    #[test]
    fn zero_ttl_is_rejected() -> BarnResult<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{ "search": {{ "ttl_secs": 0 }} }}"#)?;

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, BarnError::Config(_)));
        Ok(())
    }

    #[test]
    fn malformed_json_is_a_config_error() -> BarnResult<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "not json")?;

        assert!(matches!(Config::load(file.path()), Err(BarnError::Config(_))));
        Ok(())
    }

    #[test]
    fn explicit_database_path_wins() -> BarnResult<()> {
        let store = StoreConfig {
            database_path: Some(PathBuf::from("/tmp/shelves.db")),
        };
        assert_eq!(store.resolve_database_path()?, PathBuf::from("/tmp/shelves.db"));
        Ok(())
    }
}
