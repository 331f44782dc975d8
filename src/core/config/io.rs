use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::core::config::data::{path_display, Config};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine the chatdesk config directory")]
    NoProjectDirs,

    #[error("Failed to read config at {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config at {}: {source}", path_display(.path))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("org", "chatdesk", "chatdesk").ok_or(ConfigError::NoProjectDirs)
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_path(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(&Self::config_path()?)
    }

    /// A missing file is the default config.
    pub(crate) fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path_display(path), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes through a temp file in the target directory so a crash never
    /// leaves a half-written config behind.
    pub(crate) fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(write_error)?;

        let mut temp_file = NamedTempFile::new_in(dir).map_err(write_error)?;
        temp_file.write_all(contents.as_bytes()).map_err(write_error)?;
        temp_file.as_file_mut().sync_all().map_err(write_error)?;
        temp_file
            .persist(path)
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    /// Directory holding the conversation store and attachment blobs.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }
}
