use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_top_processes")]
    pub top_processes: usize,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_simulate_gpu_activity")]
    pub simulate_gpu_activity: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9108".to_string(),
            interval_ms: default_interval_ms(),
            top_processes: default_top_processes(),
            query_timeout_ms: default_query_timeout_ms(),
            simulate_gpu_activity: default_simulate_gpu_activity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

pub const MIN_INTERVAL_MS: u64 = 100;
pub const MAX_TOP_PROCESSES: usize = 100;

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "interval_ms должно быть >= {MIN_INTERVAL_MS}"
            )));
        }
        if self.top_processes == 0 || self.top_processes > MAX_TOP_PROCESSES {
            return Err(ConfigError::Validation(format!(
                "top_processes должно быть в диапазоне 1..{MAX_TOP_PROCESSES}"
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "query_timeout_ms должно быть > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

const fn default_interval_ms() -> u64 {
    1000
}

const fn default_top_processes() -> usize {
    10
}

const fn default_query_timeout_ms() -> u64 {
    2000
}

const fn default_simulate_gpu_activity() -> bool {
    true
}
