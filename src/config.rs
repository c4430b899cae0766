use std::{str::FromStr, time::Duration};

use anyhow::Context;

/// Runtime settings, read from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// sqlite url for the counters; counters stay in memory without it
    pub database_url: Option<String>,
    pub log_level: String,
    pub engine: EngineConfig,
}

/// The part of the configuration the room engine itself consumes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub verified_names: Vec<String>,
    pub stranger_pool: String,
    pub default_max_users: u32,
    pub presence_interval: Duration,
    /// events a session may have waiting before new ones are dropped
    pub outbound_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verified_names: vec!["Aaron".to_owned(), "Developer".to_owned()],
            stranger_pool: "random".to_owned(),
            default_max_users: 10,
            presence_interval: Duration::from_secs(1),
            outbound_queue: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let _ = dotenv::dotenv();
        let defaults = EngineConfig::default();

        let verified_names = match dotenv::var("VERIFIED_NAMES") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
            Err(_) => defaults.verified_names,
        };

        let engine = EngineConfig {
            verified_names,
            stranger_pool: dotenv::var("STRANGER_POOL").unwrap_or(defaults.stranger_pool),
            default_max_users: parse_var("DEFAULT_MAX_USERS", defaults.default_max_users)?,
            presence_interval: Duration::from_millis(parse_var(
                "PRESENCE_INTERVAL_MS",
                defaults.presence_interval.as_millis() as u64,
            )?),
            outbound_queue: parse_var("OUTBOUND_QUEUE", defaults.outbound_queue)?,
        };

        if engine.default_max_users == 0 {
            anyhow::bail!("DEFAULT_MAX_USERS must be at least 1");
        }
        if engine.outbound_queue == 0 {
            anyhow::bail!("OUTBOUND_QUEUE must be at least 1");
        }

        Ok(Config {
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or("0.0.0.0:8080".to_owned()),
            database_url: dotenv::var("DATABASE_URL").ok(),
            log_level: dotenv::var("LOG_LEVEL").unwrap_or("info".to_owned()),
            engine,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key}={raw:?} is not valid")),
        Err(_) => Ok(default),
    }
}
