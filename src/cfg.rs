use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tokio::task::spawn_blocking;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub max_connections: u32,
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceSettings {
    pub close_full_events_every_secs: u64,
    pub session_cleanup_every_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub maintenance: MaintenanceSettings,
    pub uploads: UploadSettings,
    pub auth: AuthSettings,
    pub timezone_id: String,
    pub date_time_format: String,
}

impl Settings {
    pub async fn new() -> Result<Self, ConfigError> {
        let builder = Self::builder_with_defaults()?;

        spawn_blocking(move || {
            builder
                .add_source(File::from(PathBuf::from("config.toml")).required(false))
                .add_source(Environment::with_prefix("CAMPUS").separator("__"))
                .build()
                .and_then(Config::try_deserialize)
        })
        .await
        .expect("unable to join spawn_blocking thread")
    }

    /// Settings made only of the built-in defaults, without reading any file or the environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder_with_defaults()?
            .build()
            .and_then(Config::try_deserialize)
    }

    fn builder_with_defaults(
    ) -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.bind_address", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 5)?
            .set_default("database.lock_timeout_secs", 5)?
            .set_default("maintenance.close_full_events_every_secs", 3600)?
            .set_default("maintenance.session_cleanup_every_secs", 600)?
            .set_default("uploads.directory", "uploads")?
            .set_default("uploads.max_bytes", 10 * 1024 * 1024)?
            .set_default("auth.bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
            .set_default("timezone_id", "Asia/Bangkok")?
            .set_default("date_time_format", "%Y-%m-%d %H:%M:%S")
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.database.lock_timeout_secs)
    }
}
