use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ApiConfig {
    pub enable_swagger: bool,
}

/// Session lifecycle settings.
///
/// `lifetime_hours` is an absolute cap: activity never extends it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub lifetime_hours: i64,
    pub secure_cookie: bool,
    pub validation_timeout_ms: u64,
    pub poll_interval_seconds: u64,
    pub login_path: String,
    pub purge_interval_seconds: u64,
    pub purge_retention_hours: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    pub require_approval: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/sessionkeeper".to_string(),
            max_connections: 16,
            min_connections: 4,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_hours: 24,
            secure_cookie: true,
            validation_timeout_ms: 2000,
            poll_interval_seconds: 30,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            purge_interval_seconds: 3600,
            purge_retention_hours: 24 * 7,
        }
    }
}

impl SessionConfig {
    pub fn lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lifetime_hours.max(1))
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms.max(1))
    }

    pub fn purge_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.purge_retention_hours.max(0))
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Compiled defaults
    /// 2. Sessionkeeper.toml (base configuration file)
    /// 3. Environment variables (prefixed with SESSIONKEEPER_, `__` separates sections)
    /// 4. DATABASE_URL environment variable
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("Sessionkeeper.toml").nested())
            .merge(Env::prefixed("SESSIONKEEPER_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }
}
