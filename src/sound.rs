use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// sound used when an alarm's own sound can't be found
pub const DEFAULT_SOUND: &str = "india";

/// file extension looked up in the sounds directory
pub const SOUND_EXTENSION: &str = "mp3";

/// a playable sound, the handle the catalog hands out
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sound {
    pub name: String,
    pub path: PathBuf,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.name,
            self.path
                .file_name()
                .map_or_else(|| self.path.to_string_lossy(), |name| name.to_string_lossy())
        )
    }
}

impl Sound {
    #[must_use]
    pub const fn new(name: String, path: PathBuf) -> Self {
        Self { name, path }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("no sound named {0}")]
    NotFound(String),
}

pub trait SoundCatalog: Send + Sync {
    fn exists(&self, name: &str) -> bool;
    fn open(&self, name: &str) -> Result<Sound, CatalogError>;
}

/// sounds from explicit config entries first, then `<dir>/<name>.mp3`
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    dir: PathBuf,
    sounds: HashMap<String, Sound>,
}

impl DirectoryCatalog {
    #[must_use]
    pub fn new(dir: PathBuf, sounds: HashMap<String, Sound>) -> Self {
        Self { dir, sounds }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.sounds.get(name).map_or_else(
            || self.dir.join(format!("{name}.{SOUND_EXTENSION}")),
            |sound| sound.path.clone(),
        )
    }
}

impl SoundCatalog for DirectoryCatalog {
    fn exists(&self, name: &str) -> bool {
        // a name like "../x" must not escape the sounds directory
        !name.is_empty() && !name.contains(['/', '\\']) && self.path_for(name).is_file()
    }

    fn open(&self, name: &str) -> Result<Sound, CatalogError> {
        if self.exists(name) {
            Ok(Sound::new(name.to_string(), self.path_for(name)))
        } else {
            Err(CatalogError::NotFound(name.to_string()))
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoundError {
    #[error("neither {requested} nor the default sound {default} are available")]
    AssetMissing { requested: String, default: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// picks the sound to ring with, falling back to the default sound exactly once
#[derive(Clone)]
pub struct SoundResolver {
    catalog: Arc<dyn SoundCatalog>,
    default: String,
}

impl fmt::Debug for SoundResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundResolver")
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl SoundResolver {
    #[must_use]
    pub fn new(catalog: Arc<dyn SoundCatalog>, default: impl Into<String>) -> Self {
        Self {
            catalog,
            default: default.into(),
        }
    }

    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// # Errors
    /// [`SoundError::AssetMissing`] when neither the requested nor the default sound exist
    pub fn resolve(&self, requested: &str) -> Result<Sound, SoundError> {
        if self.catalog.exists(requested) {
            return Ok(self.catalog.open(requested)?);
        }
        if requested != self.default {
            warn!("sound {requested} not found, falling back to {}", self.default);
            if self.catalog.exists(&self.default) {
                return Ok(self.catalog.open(&self.default)?);
            }
        }
        debug!("default sound {} not found", self.default);
        Err(SoundError::AssetMissing {
            requested: requested.to_string(),
            default: self.default.clone(),
        })
    }
}
