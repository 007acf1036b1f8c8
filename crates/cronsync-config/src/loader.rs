//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "CRONSYNC";

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the first default location that exists
    ///
    /// Fails with [`ConfigError::MissingRequired`] when none does; an empty
    /// task list is never assumed.
    pub fn load_default() -> ConfigResult<Config> {
        Self::load_first(&Self::get_default_config_paths())
    }

    /// Load configuration from the first of `candidates` that exists
    pub fn load_first<P: AsRef<Path>>(candidates: &[P]) -> ConfigResult<Config> {
        match first_existing(candidates) {
            Some(path) => Self::load_from_file(path),
            None => Err(ConfigError::missing_required("config file")),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Load from an explicit file when given, default locations otherwise
    pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                toml::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to TOML: {}", e),
                })?
            }
            Some("json") => {
                serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to JSON: {}", e),
                })?
            }
            _ => serde_yaml::to_string(config).map_err(|e| ConfigError::Serialization {
                message: format!("Failed to serialize to YAML: {}", e),
            })?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        Self::save_to_file(&Config::default(), path)
    }

    /// Get default configuration file paths in order of preference
    fn get_default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("cronsync.yaml"),
            PathBuf::from("cronsync.yml"),
            PathBuf::from("cronsync.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let cronsync_dir = config_dir.join("cronsync");
            paths.push(cronsync_dir.join("config.yaml"));
            paths.push(cronsync_dir.join("config.yml"));
            paths.push(cronsync_dir.join("config.toml"));
        }

        #[cfg(unix)]
        {
            paths.push(PathBuf::from("/etc/cronsync/config.yaml"));
            paths.push(PathBuf::from("/etc/cronsync/config.yml"));
            paths.push(PathBuf::from("/etc/cronsync/config.toml"));
        }

        paths
    }
}

fn first_existing<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(AsRef::as_ref)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
}

mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
            })
        }
        #[cfg(not(target_os = "macos"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|home| PathBuf::from(home).join(".config"))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskEntry;
    use cronsync_types::ExecutionMode;
    use rstest::rstest;
    use tempfile::TempDir;

    fn sample_config() -> Config {
        let mut config = Config {
            tasks: vec![
                TaskEntry::new("/srv/photos", "/mnt/backup"),
                TaskEntry::new("/srv/mail", "/mnt/offsite"),
            ],
            ..Config::default()
        };
        config.execution.mode = ExecutionMode::Sequential;
        config.execution.concurrency = 2;
        config
    }

    #[rstest]
    #[case("cronsync.yaml")]
    #[case("cronsync.toml")]
    #[case("cronsync.json")]
    fn test_save_and_load(#[case] file_name: &str) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(file_name);

        ConfigLoader::save_to_file(&sample_config(), &config_path).unwrap();
        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.tasks, sample_config().tasks);
        assert_eq!(loaded.execution.mode, ExecutionMode::Sequential);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = ConfigLoader::load_from_file("/nonexistent/cronsync.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_no_config_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let candidates = [
            temp_dir.path().join("cronsync.yaml"),
            temp_dir.path().join("cronsync.toml"),
        ];

        let result = ConfigLoader::load_first(&candidates);

        match result {
            Err(ConfigError::MissingRequired { key }) => assert_eq!(key, "config file"),
            other => panic!("expected a missing config file, got {other:?}"),
        }
    }

    #[test]
    fn test_load_first_existing_candidate() {
        let temp_dir = TempDir::new().unwrap();
        let fallback = temp_dir.path().join("cronsync.toml");
        ConfigLoader::save_to_file(&sample_config(), &fallback).unwrap();

        let config =
            ConfigLoader::load_first(&[temp_dir.path().join("cronsync.yaml"), fallback]).unwrap();

        assert_eq!(config.tasks, sample_config().tasks);
    }

    #[test]
    fn test_generate_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("default.yaml");

        ConfigLoader::generate_default_config(&config_path).unwrap();
        assert!(config_path.exists());

        let config = ConfigLoader::load_from_file(&config_path).unwrap();
        assert!(config.tasks.is_empty());
        assert_eq!(config.rsync.options, "-a --delete");
    }
}
