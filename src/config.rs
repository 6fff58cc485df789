use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory the downloader writes per-handle folders into.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Downloader program invoked once per handle.
    #[serde(default = "default_fetch_program")]
    pub program: String,

    /// Extra arguments placed before the handle.
    #[serde(default)]
    pub args: Vec<String>,

    /// stderr substrings that identify a missing profile, matched
    /// case-insensitively.
    #[serde(default = "default_not_found_markers")]
    pub not_found_markers: Vec<String>,
}

fn default_fetch_program() -> String {
    "instaloader".to_string()
}

fn default_not_found_markers() -> Vec<String> {
    vec!["does not exist".to_string()]
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            program: default_fetch_program(),
            args: Vec::new(),
            not_found_markers: default_not_found_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Shared folder filed images end up in.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// CSV the per-image metadata rows are appended to.
    #[serde(default = "default_metadata_csv")]
    pub metadata_csv: PathBuf,
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_metadata_csv() -> PathBuf {
    PathBuf::from("meta_data.csv")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            metadata_csv: default_metadata_csv(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Delay between iterations, a politeness control for the remote service.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_delay_secs() -> u64 {
    300
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { delay_secs: default_delay_secs() }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedstash")
        .join("accounts.db")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            staging_dir: default_staging_dir(),
            fetch: FetchConfig::default(),
            media: MediaConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedstash")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FEEDSTASH_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.fetch.program, "instaloader");
        assert_eq!(config.worker.delay_secs, 300);
        assert_eq!(config.media.images_dir, PathBuf::from("images"));
    }

    #[test]
    fn test_partial_config_overrides() {
        let config: Config = toml::from_str(
            r#"
            staging_dir = "/tmp/stash"

            [worker]
            delay_secs = 10

            [fetch]
            program = "gallery-dl"
            "#,
        )
        .unwrap();
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/stash"));
        assert_eq!(config.worker.delay_secs, 10);
        assert_eq!(config.fetch.program, "gallery-dl");
        // Untouched sections keep their defaults.
        assert_eq!(config.media.metadata_csv, PathBuf::from("meta_data.csv"));
    }
}
