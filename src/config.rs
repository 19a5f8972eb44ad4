use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "WASHDESK_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub washdesk: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const WASHDESK_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            washdesk: Self::WASHDESK_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.washdesk.clone();
        self.washdesk = self.washdesk.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.washdesk.as_str()) {
            eprintln!(
                "Config error: washdesk log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::WASHDESK_LEVEL
            );
            self.washdesk = Self::WASHDESK_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub backup_dir: PathBuf,
}

impl DatabaseConfig {
    const DB_FILE: &str = "washdesk.db";
    const BACKUP_DIR: &str = "backups";

    fn default_in(data_dir: &Path) -> Self {
        DatabaseConfig {
            path: data_dir.join(Self::DB_FILE),
            backup_dir: data_dir.join(Self::BACKUP_DIR),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MigrationConfig {
    /// Migration script to run. The bundled script is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Loads the configuration from a TOML file located in the app's local data directory,
    /// with `WASHDESK_`-prefixed environment variables layered on top (`__` separates
    /// sections, e.g. `WASHDESK_DATABASE__BACKUP_DIR`).
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        Self::load_from(project_dirs.data_local_dir())
    }

    fn load_from(data_dir: &Path) -> Self {
        let config_path = data_dir.join(CONFIG_FILE);

        let default_config = Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default_in(data_dir),
            migration: MigrationConfig::default(),
        };

        if !config_path.exists() {
            Self::write_default(&config_path, &default_config);
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn write_default(config_path: &Path, default_config: &Config) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(default_config) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(_) => eprintln!("Failed to serialize default config."),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
    }
}
