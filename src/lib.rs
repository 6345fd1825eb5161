use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;
#[cfg(test)]
mod testing;

#[derive(Clone, Debug, Deserialize)]
pub struct CanchaConfig {
    pub api: Api,
    pub firebase: Firebase,
    pub storage: Storage,
    pub schedule: Schedule,
    pub auth: Auth,
    pub logger: Logger,
}

impl CanchaConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("cancha.toml")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("api.base_url", "http://localhost:8000")?
            .set_default("api.timeout_ms", 10_000)?
            .set_default("firebase.api_key", "")?
            .set_default(
                "firebase.endpoint",
                "https://identitytoolkit.googleapis.com/v1",
            )?
            .set_default("firebase.request_uri", "http://localhost")?
            .set_default("storage.path", "cancha_session.json")?
            .set_default("schedule.open_hour", 8)?
            .set_default("schedule.close_hour", 22)?
            .set_default("auth.poll_interval_ms", 500)?
            .set_default("logger.level", "INFO")?
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("CANCHA").separator("__"))
            .build()?
            .try_deserialize::<CanchaConfig>()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Firebase {
    pub api_key: String,
    pub endpoint: String,
    pub request_uri: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
    pub path: String,
}

/// 営業時間（予約可能な開始時刻の範囲）
#[derive(Clone, Debug, Deserialize)]
pub struct Schedule {
    pub open_hour: u32,
    pub close_hour: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    pub poll_interval_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}
