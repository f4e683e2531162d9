//! Service configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the config file (`config.toml` unless
//! told otherwise), `ATTENDANCE__`-prefixed environment variables (`ATTENDANCE__SERVER__BIND`),
//! and finally `DATABASE_URL`, which may come from a `.env` file.

use crate::pipeline::ExportOptions;
use config::{Config, Environment};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Shortest accepted HMAC secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes long")]
    WeakSecret,

    #[error("auth.export_roles must name at least one role")]
    NoExportRoles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub export: ExportSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub issuer: String,
    pub token_minutes: i64,
    pub export_roles: Vec<String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("token_minutes", &self.token_minutes)
            .field("export_roles", &self.export_roles)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    pub page_size: usize,
    pub chunk_size: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ExportSettings {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            page_size: self.page_size,
            chunk_size: self.chunk_size,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

impl Settings {
    /// Loads settings using `config_name` as the config file (extension optional, file optional).
    pub fn load(config_name: &str) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let settings: Settings = Config::builder()
            .set_default("server.bind", "0.0.0.0:8080")?
            .set_default("database.url", "attendance.db")?
            .set_default("database.pool_size", 8)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.issuer", "campus")?
            .set_default("auth.token_minutes", 60)?
            .set_default("auth.export_roles", vec!["admin", "faculty"])?
            .set_default("export.page_size", 200)?
            .set_default("export.chunk_size", 8192)?
            .set_default("log.level", "info")?
            .add_source(config::File::with_name(config_name).required(false))
            .add_source(
                Environment::with_prefix("ATTENDANCE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.export_roles")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.auth.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(SettingsError::WeakSecret);
        }
        if self.auth.export_roles.is_empty() {
            return Err(SettingsError::NoExportRoles);
        }
        Ok(())
    }
}
