use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

static SETTINGS_FILE_NAME: &str = "settings.json";

/// Default port of the local OAuth callback listener
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

pub struct ProjectConfig {
    pub settings: Settings,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub settings_path: PathBuf,
    /// The settings file did not exist and was written with defaults
    pub settings_created: bool,
}

impl ProjectConfig {
    /// Resolve the platform directories and load `settings.json` from them
    pub fn new() -> Result<Self, ConfigError> {
        let proj_dirs =
            ProjectDirs::from("com", "drive-sync", "drive-sync").ok_or(ConfigError::NoProjectDirs)?;
        Self::from_dirs(
            proj_dirs.config_dir().to_path_buf(),
            proj_dirs.data_dir().to_path_buf(),
        )
    }

    /// Load settings from an explicit file, keeping platform data directory
    pub fn with_settings_file(settings_file: &Path) -> Result<Self, ConfigError> {
        let proj_dirs =
            ProjectDirs::from("com", "drive-sync", "drive-sync").ok_or(ConfigError::NoProjectDirs)?;
        let config_dir = settings_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let data_dir = proj_dirs.data_dir().to_path_buf();
        create_dir(&data_dir)?;

        let settings_created = !settings_file.exists();
        let settings = Settings::load_or_create(settings_file)?;
        Ok(Self {
            settings,
            config_dir,
            data_dir,
            settings_path: settings_file.to_path_buf(),
            settings_created,
        })
    }

    pub fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Result<Self, ConfigError> {
        for dir in [&config_dir, &data_dir] {
            create_dir(dir)?;
        }

        let settings_path = config_dir.join(SETTINGS_FILE_NAME);
        let settings_created = !settings_path.exists();
        let settings = Settings::load_or_create(&settings_path)?;
        Ok(Self {
            settings,
            config_dir,
            data_dir,
            settings_path,
            settings_created,
        })
    }

    /// Location of the Google OAuth client secret file
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve(&self.settings.client_secret_path)
    }

    /// Location of the persisted credential
    pub fn token_path(&self) -> PathBuf {
        self.resolve(&self.settings.token_path)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

fn create_dir(dir: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Google OAuth client secret JSON, relative paths resolve against the config dir
    pub client_secret_path: PathBuf,
    /// Persisted credential, relative paths resolve against the config dir
    pub token_path: PathBuf,
    pub callback_port: u16,
    /// Local directory uploaded on every pass
    pub sync_root: Option<PathBuf>,
    pub sync_config: SyncConfig,
    /// Try to open the authorization URL in a browser
    pub open_browser: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_secret_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            callback_port: DEFAULT_CALLBACK_PORT,
            sync_root: None,
            sync_config: SyncConfig::default(),
            open_browser: true,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub sync_interval: Duration,
    /// Wall clock budget for a single pass
    pub run_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            run_timeout: None,
        }
    }
}

impl Settings {
    /// Load settings, writing the defaults when no file exists yet
    pub fn load_or_create(config_file_path: &Path) -> Result<Self, ConfigError> {
        if !config_file_path.exists() {
            debug!(
                "Settings file {} not found - creating default config",
                config_file_path.display()
            );
            let default = Self::default();
            default.save_to_file(config_file_path)?;
            return Ok(default);
        }
        Self::load_settings_from_file(config_file_path)
    }

    pub fn load_settings_from_file(config_file_path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(config_file_path).map_err(|source| ConfigError::Io {
            path: config_file_path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: config_file_path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_file(&self, config_file_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir(parent)?;
        }

        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: config_file_path.to_path_buf(),
            source,
        })?;
        fs::write(config_file_path, data).map_err(|source| ConfigError::Io {
            path: config_file_path.to_path_buf(),
            source,
        })
    }
}
