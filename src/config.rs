use std::path::{Path, PathBuf};
use std::time::Duration;

use hls_stream::FetcherConfig;
use platform_dirs::AppDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_NAME: &str = "kawaii-player";
const CONFIG_FILE: &str = "Conf.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine the user config directory")]
    NoConfigDir,
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_playlist_dir")]
    pub playlist_dir: PathBuf,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds allowed for a single fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Playlist that `playlist add` and friends use when none is named
    #[serde(default = "default_active_playlist")]
    pub active_playlist: String,
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn app_dirs() -> Option<AppDirs> {
    AppDirs::new(Some(APP_NAME), false)
}

fn app_dir_or_local(select: fn(AppDirs) -> PathBuf, sub: &str) -> PathBuf {
    app_dirs()
        .map(select)
        .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
        .join(sub)
}

fn default_playlist_dir() -> PathBuf {
    app_dir_or_local(|dirs| dirs.config_dir, "playlists")
}

fn default_download_dir() -> PathBuf {
    app_dir_or_local(|dirs| dirs.data_dir, "downloads")
}

fn default_log_dir() -> PathBuf {
    app_dir_or_local(|dirs| dirs.state_dir, "logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("Kawaii-Player/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_retries() -> u32 {
    3
}

fn default_active_playlist() -> String {
    playlist_store::DEFAULT_COLLECTION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playlist_dir: default_playlist_dir(),
            download_dir: default_download_dir(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            fetch_timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
            active_playlist: default_active_playlist(),
            config_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = app_dirs().ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir.join(CONFIG_FILE))
    }

    /// Loads `path`, or the platform config file when `None`. A missing file
    /// is created with defaults; a broken one is reported and left alone.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                let mut config: Config =
                    toml::from_str(&content).map_err(|source| ConfigError::Parse {
                        path: config_path.display().to_string(),
                        source,
                    })?;
                config.config_path = config_path;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Config {
                    config_path,
                    ..Default::default()
                };
                config.save()?;
                Ok(config)
            }
            Err(source) => Err(ConfigError::Read {
                path: config_path.display().to_string(),
                source,
            }),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string(&self)?;
        let write_failed = |source| ConfigError::Write {
            path: self.config_path.display().to_string(),
            source,
        };
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_failed)?;
        }
        std::fs::write(&self.config_path, content).map_err(write_failed)?;
        Ok(())
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.fetch_timeout.max(1)),
            user_agent: self.user_agent.clone(),
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("Conf.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.fetch_timeout, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.user_agent, "Kawaii-Player/6.0.0");
        assert_eq!(config.active_playlist, "default");

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Conf.toml");
        std::fs::write(&path, "log_level = \"debug\"\nplaylist_dir = \"/tmp/lists\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Debug);
        assert_eq!(config.playlist_dir, PathBuf::from("/tmp/lists"));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn test_broken_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Conf.toml");
        std::fs::write(&path, "log_level = [").unwrap();

        let result = Config::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "log_level = [");
    }

    #[test]
    fn test_fetcher_config() {
        let config = Config {
            fetch_timeout: 0,
            max_retries: 5,
            log_level: "nonsense".to_string(),
            ..Default::default()
        };
        let fetcher = config.fetcher_config();
        assert_eq!(fetcher.timeout, Duration::from_secs(1));
        assert_eq!(fetcher.max_retries, 5);
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
    }
}
