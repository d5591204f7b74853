use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const APP_DIR_NAME: &str = "phrasefind";
const CONFIG_FILE_NAME: &str = "config.toml";
const DIALOG_SUBCOMMAND: &str = "dialog";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lock_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub search_debounce_ms: u64,
    pub dialog_program: String,
    pub dialog_args: Vec<String>,
    pub log_level: String,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1000,
            request_timeout_ms: 5000,
            search_debounce_ms: 50,
            dialog_program: String::new(),
            dialog_args: vec![DIALOG_SUBCOMMAND.to_string()],
            log_level: "info".to_string(),
            config_path: stable_app_data_dir().join(CONFIG_FILE_NAME),
        }
    }
}

impl Config {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn dialog_command(&self) -> Result<(PathBuf, Vec<String>), ConfigError> {
        let program = if self.dialog_program.trim().is_empty() {
            std::env::current_exe()?
        } else {
            PathBuf::from(self.dialog_program.trim())
        };
        Ok((program, self.dialog_args.clone()))
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

pub fn validate(cfg: &Config) -> Result<(), String> {
    if !(50..=10_000).contains(&cfg.lock_timeout_ms) {
        return Err("lock_timeout_ms out of range (50..=10000)".into());
    }

    if !(100..=60_000).contains(&cfg.request_timeout_ms) {
        return Err("request_timeout_ms out of range (100..=60000)".into());
    }

    if cfg.search_debounce_ms > 1000 {
        return Err("search_debounce_ms out of range (0..=1000)".into());
    }

    if cfg.log_level.trim().is_empty() {
        return Err("log_level is required".into());
    }

    if cfg.config_path.as_os_str().is_empty() {
        return Err("config_path is required".into());
    }

    Ok(())
}

pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Config::default().config_path);

    let mut cfg = match std::fs::read_to_string(&config_path) {
        Ok(text) => toml::from_str::<Config>(&text)?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(error) => return Err(error.into()),
    };
    cfg.config_path = config_path;

    validate(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    validate(cfg).map_err(ConfigError::Invalid)?;
    if let Some(parent) = cfg.config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(cfg)?;
    std::fs::write(&cfg.config_path, text)?;
    Ok(())
}
