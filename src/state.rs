use anyhow::Context;
use std::{sync::Arc, time::Duration};

use crate::{
    db::Database,
    message::MessageService,
    websocket::{ConnectionManager, EventPublisher},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub connections: ConnectionManager,
    pub message_service: MessageService,
}

impl AppState {
    pub fn new(db: Database, config: Arc<Config>, nats: Option<async_nats::Client>) -> Self {
        let connections = ConnectionManager::new();
        let events = EventPublisher::new(connections.clone(), nats);
        let message_service = MessageService::new(db.clone(), events, config.request_timeout);

        Self {
            db,
            config,
            connections,
            message_service,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://chat.db"),
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            host: var_or("HOST", "127.0.0.1"),
            port: var_or("PORT", "3000")
                .parse()
                .context("PORT must be a port number")?,
            request_timeout: Duration::from_millis(
                var_or("REQUEST_TIMEOUT_MS", "5000")
                    .parse()
                    .context("REQUEST_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", "10")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a number")?,
            nats_url: std::env::var("NATS_URL").ok().filter(|url| !url.is_empty()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|origins| parse_origins(&origins))
                .unwrap_or_default(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
