use std::env;

use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use serde::Deserialize;

use crate::domain::booking::RefundPolicy;

/// Setting `database.url` to this value selects the in-memory store
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub super_admin: SuperAdminConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path every route is nested under, empty or `/` for none
    pub prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuperAdminConfig {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// Cancellations earlier than this before the class start are refunded
    pub refund_window_minutes: u32,
}

impl BookingConfig {
    pub fn refund_policy(&self) -> RefundPolicy {
        RefundPolicy::from_minutes(self.refund_window_minutes)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::defaults()?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BOOKING__AUTH__JWT_SECRET=...` sets `auth.jwt_secret`
            .add_source(config::Environment::with_prefix("BOOKING").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Builder holding a value for every key
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.prefix", "/api")?
            .set_default("database.url", "sqlite://data/bookings.db")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.jwt_secret", "change-me")?
            .set_default("auth.jwt_expiration_seconds", 86_400)?
            .set_default("super_admin.email", "admin@example.com")?
            .set_default("super_admin.password", "Adm1n!change-me")?
            .set_default("super_admin.name", "Super Admin")?
            .set_default("booking.refund_window_minutes", 120)
    }
}
