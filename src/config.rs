use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::domain::ticket::DEFAULT_TTL_MINUTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("LOG_FORMAT must be 'text' or 'json', got '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub qr_ticket_ttl_minutes: i64,
    pub allow_direct_completion: bool,
    pub log_request_body: bool,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            database_url: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .context("DATABASE_URL must be set")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            qr_ticket_ttl_minutes: parse_or(&lookup, "QR_TICKET_TTL_MINUTES", DEFAULT_TTL_MINUTES)?,
            allow_direct_completion: parse_or(&lookup, "LEDGER_ALLOW_DIRECT_COMPLETION", false)?,
            log_request_body: parse_or(&lookup, "LOG_REQUEST_BODY", false)?,
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?,
        };

        if config.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        if config.qr_ticket_ttl_minutes <= 0 {
            anyhow::bail!("QR_TICKET_TTL_MINUTES must be a positive number of minutes");
        }

        Ok(config)
    }

    pub fn ticket_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.qr_ticket_ttl_minutes)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value '{}' for {}: {}", raw, key, e)),
        None => Ok(default),
    }
}
