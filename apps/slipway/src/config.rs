//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/slipway/slipway.toml`
//! - Windows: `%APPDATA%/slipway/slipway.toml`
//!
//! Environment variables override the file:
//! `SLIPWAY_BUCKET`, `SLIPWAY_STORAGE_ENDPOINT`, `SLIPWAY_STORAGE_TOKEN`,
//! `SLIPWAY_ARCHIVE_DIR`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use slipway_build::BuildConfig;
use slipway_pipeline::PipelineConfig;
use slipway_publish::StorageConfig;

/// slipway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding archived run logs.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

fn default_archive_dir() -> PathBuf {
    data_base_dir().join("slipway").join("runs")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            storage: StorageConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_path()?,
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            config
        } else {
            let config = Config::default();
            config.save(&path)?;
            config
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.archive_dir = expand_home(&config.archive_dir);
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix; the file may hold a storage token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies `SLIPWAY_*` overrides looked up through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = lookup("SLIPWAY_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Some(endpoint) = lookup("SLIPWAY_STORAGE_ENDPOINT") {
            self.storage.endpoint = endpoint;
        }
        if let Some(token) = lookup("SLIPWAY_STORAGE_TOKEN") {
            self.storage.access_token = Some(token);
        }
        if let Some(dir) = lookup("SLIPWAY_ARCHIVE_DIR") {
            self.archive_dir = PathBuf::from(dir);
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            build: self.build.clone(),
            storage: self.storage.clone(),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("slipway").join("slipway.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Ok(home_dir().join(".config").join("slipway").join("slipway.toml"))
    }
}

fn data_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from(
            std::env::var("LOCALAPPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into()),
        )
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join(".local").join("share")
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into()))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
