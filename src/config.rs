use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    sound::{DirectoryCatalog, Sound, DEFAULT_SOUND},
    timer::DEFAULT_MAX_PENDING,
};

const APP_NAME: &str = "tocsin";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't find a home directory for {APP_NAME}")]
    NoProjectDirs,
    #[error("couldn't access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// played when an alarm's own sound can't be found
    pub default_sound: String,
    /// sounds that live outside the sounds directory
    pub sounds: HashMap<String, Sound>,
    /// where `<name>.mp3` files are looked up, the data dir's `sounds` if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sounds_dir: Option<PathBuf>,
    pub tick_millis: u64,
    pub max_pending: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_sound: DEFAULT_SOUND.to_string(),
            sounds: HashMap::new(),
            sounds_dir: None,
            tick_millis: 500,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// if the file can't be read or isn't a valid config
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&config)?)
    }

    /// the config at `path`, or the defaults if there is no file yet
    ///
    /// # Errors
    /// if the file exists but can't be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// # Errors
    /// if the config dir can't be created or the file can't be written
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, config).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// # Errors
    /// if no sounds dir is configured and there's no data dir to fall back on
    pub fn catalog(&self) -> Result<DirectoryCatalog, ConfigError> {
        let dir = match &self.sounds_dir {
            Some(dir) => dir.clone(),
            None => Self::sounds_path()?,
        };
        Ok(DirectoryCatalog::new(dir, self.sounds.clone()))
    }

    fn project_dirs() -> Result<ProjectDirs, ConfigError> {
        ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoProjectDirs)
    }

    /// # Errors
    /// if there's no home directory
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// # Errors
    /// if there's no home directory
    pub fn sounds_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.data_dir().join("sounds"))
    }

    /// # Errors
    /// if there's no home directory
    pub fn alarms_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.data_dir().join("alarms.toml"))
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use super::*;
    use crate::sound::SoundCatalog;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("tocsin-config-{}", Uuid::new_v4()))
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("tick_millis = 250").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.default_sound, "india");
        assert_eq!(config.max_pending, 64);
        assert!(config.sounds.is_empty());
    }

    #[test]
    fn it_survives_a_save() {
        let dir = scratch();
        let path = dir.join("config.toml");
        let mut config = Config::new();
        config.default_sound = "clock".to_string();
        config.sounds.insert(
            "rooster".to_string(),
            Sound::new("rooster".to_string(), dir.join("rooster.mp3")),
        );
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn no_file_means_defaults_but_bad_files_are_errors() {
        let dir = scratch();
        let path = dir.join("config.toml");
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());

        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "tick_millis = \"soon\"").unwrap();
        assert!(matches!(
            Config::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn the_catalog_uses_the_configured_dir() {
        let dir = scratch();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("clock.mp3"), b"").unwrap();
        let config = Config {
            sounds_dir: Some(dir.clone()),
            ..Config::default()
        };
        let catalog = config.catalog().unwrap();
        assert!(catalog.exists("clock"));
        assert!(!catalog.exists("india"));
        fs::remove_dir_all(dir).unwrap();
    }
}
