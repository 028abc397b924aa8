use anyhow::{Context, Result};
use catalog::{GraphSnapshotPayload, InitializeOptions};
use clap::Parser;
use common::parse_flag;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4000;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "catalog-server")]
#[command(about = "HTTP service that stores the module catalog graph snapshot")]
pub struct CliArgs {
    /// Адрес для прослушивания
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Путь к файлу базы
    #[arg(long)]
    pub db_path: Option<PathBuf>,
    /// Не засевать пустую базу начальными данными
    #[arg(long)]
    pub no_seed: bool,
    /// JSON файл с начальным снапшотом вместо встроенного каталога
    #[arg(long)]
    pub seed_file: Option<PathBuf>,
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port value in {variable}: '{value}'")]
    InvalidPort { variable: &'static str, value: String },
}

/// Нераспознанное значение, вместо которого взят default
///
/// Конфигурация читается до установки subscriber, поэтому предупреждения
/// копятся здесь и пишутся в лог через [`ServerConfig::log_warnings`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub variable: &'static str,
    pub value: String,
    pub default: bool,
}

/// Итоговая конфигурация сервера: .env -> окружение -> флаги CLI
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: Option<PathBuf>,
    pub seed_on_first_boot: bool,
    pub seed_file: Option<PathBuf>,
    pub log_json: bool,
    pub warnings: Vec<ConfigWarning>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_path: None,
            seed_on_first_boot: true,
            seed_file: None,
            log_json: false,
            warnings: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Прочитать конфигурацию из окружения (и `.env`, если есть)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// То же, что `from_env`, но с произвольным источником переменных
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match (non_empty("CATALOG_PORT"), non_empty("PORT")) {
            (Some(raw), _) => parse_port("CATALOG_PORT", &raw)?,
            (None, Some(raw)) => parse_port("PORT", &raw)?,
            (None, None) => defaults.port,
        };

        let mut warnings = Vec::new();
        let mut flag = |variable: &'static str, default: bool| match non_empty(variable) {
            Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warnings.push(ConfigWarning {
                    variable,
                    value: raw,
                    default,
                });
                default
            }),
            None => default,
        };
        let seed_on_first_boot = flag("CATALOG_SEED", defaults.seed_on_first_boot);
        let log_json = flag("CATALOG_LOG_JSON", defaults.log_json);

        Ok(Self {
            host: non_empty("CATALOG_HOST").unwrap_or(defaults.host),
            port,
            database_path: non_empty("CATALOG_DB_PATH").map(PathBuf::from),
            seed_on_first_boot,
            seed_file: non_empty("CATALOG_SEED_FILE").map(PathBuf::from),
            log_json,
            warnings,
        })
    }

    /// Записать накопленные предупреждения; вызывать после установки логгера
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!(
                variable = warning.variable,
                value = %warning.value,
                default = warning.default,
                "Unrecognized boolean value, using default"
            );
        }
    }

    /// Флаги командной строки перекрывают окружение
    pub fn apply_cli(mut self, args: &CliArgs) -> Self {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(path) = &args.db_path {
            self.database_path = Some(path.clone());
        }
        if args.no_seed {
            self.seed_on_first_boot = false;
        }
        if let Some(seed_file) = &args.seed_file {
            self.seed_file = Some(seed_file.clone());
        }
        if args.log_json {
            self.log_json = true;
        }
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Параметры хранилища; seed-файл читается только если засев включён
    pub fn initialize_options(&self) -> Result<InitializeOptions> {
        let initial_data = match (&self.seed_file, self.seed_on_first_boot) {
            (Some(path), true) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read seed file {}", path.display()))?;
                let snapshot: GraphSnapshotPayload = serde_json::from_str(&raw)
                    .with_context(|| format!("Seed file {} is not a graph snapshot", path.display()))?;
                Some(snapshot)
            }
            _ => None,
        };

        Ok(InitializeOptions {
            database_path: self.database_path.clone(),
            seed_with_initial_data: self.seed_on_first_boot,
            initial_data,
        })
    }
}

fn parse_port(variable: &'static str, raw: &str) -> Result<u16, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidPort {
        variable,
        value: raw.to_string(),
    })
}
