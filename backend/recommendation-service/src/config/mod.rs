use db_pool::{parse_env_required, parse_env_with_default, DbConfig};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const SERVICE_NAME: &str = "recommendation-service";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing or invalid environment variable: {0}")]
    Env(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub experiment: ExperimentConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    /// Rows per page when bulk-loading feature tables
    pub page_size: usize,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_path: String,
    /// Deployment-mode flag (`IS_LMS=1`): models live under `lms_path`
    pub is_lms: bool,
    pub lms_path: String,
}

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub salt: String,
    pub control_percentage: u8,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            control_percentage: default_control_percentage(),
        }
    }
}

impl ModelConfig {
    /// Directory holding `model_control/` and `model_test/`
    pub fn resolved_base_path(&self) -> PathBuf {
        if self.is_lms {
            PathBuf::from(&self.lms_path)
        } else {
            PathBuf::from(&self.base_path)
        }
    }
}

impl DatabaseConfig {
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig {
            service_name: SERVICE_NAME.to_string(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            max_connections: self.max_connections,
            ..DbConfig::default()
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let control_percentage: u8 = std::env::var("EXPERIMENT_CONTROL_PERCENTAGE")
            .ok()
            .map(|v| {
                v.parse().map_err(|_| ConfigError::Invalid {
                    key: "EXPERIMENT_CONTROL_PERCENTAGE",
                    reason: format!("{:?} is not an integer in 0..=100", v),
                })
            })
            .transpose()?
            .unwrap_or_else(default_control_percentage);
        if control_percentage > 100 {
            return Err(ConfigError::Invalid {
                key: "EXPERIMENT_CONTROL_PERCENTAGE",
                reason: format!("{} exceeds 100", control_percentage),
            });
        }

        let port: u16 = std::env::var("APP_PORT")
            .ok()
            .map(|v| {
                v.parse().map_err(|_| ConfigError::Invalid {
                    key: "APP_PORT",
                    reason: format!("{:?} is not a valid port", v),
                })
            })
            .transpose()?
            .unwrap_or(8000);

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port,
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                host: parse_env_required("POSTGRES_HOST").map_err(ConfigError::Env)?,
                port: parse_env_with_default("POSTGRES_PORT", 5432),
                user: parse_env_required("POSTGRES_USER").map_err(ConfigError::Env)?,
                password: parse_env_required("POSTGRES_PASSWORD").map_err(ConfigError::Env)?,
                database: parse_env_required("POSTGRES_DATABASE").map_err(ConfigError::Env)?,
                max_connections: parse_env_with_default("DB_MAX_CONNECTIONS", 8),
                page_size: parse_env_with_default("FEATURE_PAGE_SIZE", default_page_size())
                    .max(1),
            },
            model: ModelConfig {
                base_path: std::env::var("MODEL_BASE_PATH")
                    .unwrap_or_else(|_| "./models".to_string()),
                is_lms: std::env::var("IS_LMS").map(|v| v == "1").unwrap_or(false),
                lms_path: std::env::var("LMS_MODEL_PATH").unwrap_or_else(|_| default_lms_path()),
            },
            experiment: ExperimentConfig {
                salt: std::env::var("EXPERIMENT_SALT").unwrap_or_else(|_| default_salt()),
                control_percentage,
            },
        })
    }
}

fn default_page_size() -> usize {
    200_000
}

fn default_lms_path() -> String {
    "/workdir/user_input/".to_string()
}

fn default_salt() -> String {
    "my_salt".to_string()
}

fn default_control_percentage() -> u8 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 12] = [
        "POSTGRES_USER",
        "POSTGRES_PASSWORD",
        "POSTGRES_HOST",
        "POSTGRES_PORT",
        "POSTGRES_DATABASE",
        "IS_LMS",
        "MODEL_BASE_PATH",
        "LMS_MODEL_PATH",
        "EXPERIMENT_SALT",
        "EXPERIMENT_CONTROL_PERCENTAGE",
        "APP_PORT",
        "LOG_LEVEL",
    ];

    fn reset_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("POSTGRES_USER", "robot");
        std::env::set_var("POSTGRES_PASSWORD", "s3cret");
        std::env::set_var("POSTGRES_HOST", "localhost");
        std::env::set_var("POSTGRES_DATABASE", "startml");
    }

    #[test]
    #[serial_test::serial]
    fn test_defaults() {
        reset_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.app.port, 8000);
        assert_eq!(config.app.log_level, "info");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.page_size, 200_000);
        assert_eq!(config.experiment.salt, "my_salt");
        assert_eq!(config.experiment.control_percentage, 50);
        assert_eq!(config.model.resolved_base_path(), PathBuf::from("./models"));
    }

    #[test]
    #[serial_test::serial]
    fn test_log_level_from_env() {
        reset_env();
        std::env::set_var("LOG_LEVEL", "debug");

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.log_level, "debug");

        std::env::remove_var("LOG_LEVEL");
    }

    #[test]
    #[serial_test::serial]
    fn test_lms_flag_switches_model_path() {
        reset_env();
        std::env::set_var("MODEL_BASE_PATH", "/opt/models");
        std::env::set_var("IS_LMS", "1");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.model.resolved_base_path(),
            PathBuf::from("/workdir/user_input/")
        );

        std::env::set_var("IS_LMS", "0");
        let config = Config::from_env().unwrap();
        assert_eq!(config.model.resolved_base_path(), PathBuf::from("/opt/models"));
    }

    #[test]
    #[serial_test::serial]
    fn test_missing_database_user_is_an_error() {
        reset_env();
        std::env::remove_var("POSTGRES_USER");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("POSTGRES_USER"));
    }

    #[test]
    #[serial_test::serial]
    fn test_control_percentage_over_100_rejected() {
        reset_env();
        std::env::set_var("EXPERIMENT_CONTROL_PERCENTAGE", "150");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                key: "EXPERIMENT_CONTROL_PERCENTAGE",
                ..
            })
        ));
    }

    #[test]
    #[serial_test::serial]
    fn test_database_config_debug_redacts_password() {
        reset_env();
        let config = Config::from_env().unwrap();
        let rendered = format!("{:?}", config.database);
        assert!(!rendered.contains("s3cret"));
    }
}
