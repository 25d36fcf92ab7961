//! Runtime configuration from environment variables.

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub broker: BrokerConfig,
}

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Connection string for the external broker. The in-process queue is
    /// used when unset.
    pub connection: Option<String>,
    /// Per-topic buffer size for the in-process queue.
    pub queue_capacity: usize,
    /// Whether the background consumer task runs.
    pub consumer_enabled: bool,
}

impl AppConfig {
    /// Read configuration from the environment. DATABASE_URL is required;
    /// everything else has a development default.
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::BadRequest("DATABASE_URL is required".into()))?;
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "development-secret".into());
        let broker = BrokerConfig {
            connection: std::env::var("BROKER_URL").ok().filter(|s| !s.is_empty()),
            queue_capacity: std::env::var("BROKER_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),
            consumer_enabled: std::env::var("BROKER_CONSUMER_ENABLED")
                .map(|s| s != "0" && !s.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        };
        Ok(AppConfig {
            database_url,
            bind_addr,
            jwt_secret,
            broker,
        })
    }
}
