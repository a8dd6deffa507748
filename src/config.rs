use std::collections::HashSet;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::Duration;
use dotenvy::dotenv;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_POOL_SIZE: u32 = 16;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("SESSION_SECRET value is too weak; provide at least 32 random characters")]
    WeakSessionSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl: Duration,
    pub secure_cookie: bool,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>, ttl: Duration, secure_cookie: bool) -> Result<Self, ConfigError> {
        let secret = secret.into();
        ensure_secret_strength(&secret)?;
        Ok(Self {
            secret,
            ttl,
            secure_cookie,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub session: SessionConfig,
    pub log_format: LogFormat,
    /// Reverse proxies allowed to report the client address.
    pub trusted_proxies: Vec<IpAddr>,
}

impl AppConfig {
    /// Reads the configuration from the process environment, loading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or("BIND_ADDR", lookup("BIND_ADDR"), || {
            DEFAULT_BIND_ADDR.parse::<SocketAddr>().map_err(|err| err.to_string())
        })?;

        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                pool_size: parse_or("DATABASE_POOL_SIZE", lookup("DATABASE_POOL_SIZE"), || {
                    Ok(DEFAULT_POOL_SIZE)
                })?,
            }),
            None => None,
        };

        let secret = lookup("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        let ttl_hours: i64 = parse_or("SESSION_TTL_HOURS", lookup("SESSION_TTL_HOURS"), || {
            Ok(DEFAULT_SESSION_TTL_HOURS)
        })?;
        if ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "SESSION_TTL_HOURS",
                reason: "must be positive".to_string(),
            });
        }
        let secure_cookie = parse_or(
            "SESSION_COOKIE_SECURE",
            lookup("SESSION_COOKIE_SECURE"),
            || Ok(true),
        )?;

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected `pretty` or `json`, got `{other}`"),
                });
            }
        };

        let trusted_proxies = lookup("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry.parse::<IpAddr>().map_err(|err| ConfigError::Invalid {
                    name: "TRUSTED_PROXIES",
                    reason: format!("`{entry}`: {err}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bind_addr,
            database,
            session: SessionConfig::new(secret, Duration::hours(ttl_hours), secure_cookie)?,
            log_format,
            trusted_proxies,
        })
    }
}

fn parse_or<T>(
    name: &'static str,
    raw: Option<String>,
    default: impl FnOnce() -> Result<T, String>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let result = match raw.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value.parse::<T>().map_err(|err| err.to_string()),
        _ => default(),
    };
    result.map_err(|reason| ConfigError::Invalid { name, reason })
}

fn ensure_secret_strength(secret: &str) -> Result<(), ConfigError> {
    let trimmed = secret.trim();
    if trimmed.len() < 32 {
        return Err(ConfigError::WeakSessionSecret);
    }

    let unique_chars = trimmed.chars().collect::<HashSet<_>>();
    if unique_chars.len() < 8 {
        return Err(ConfigError::WeakSessionSecret);
    }

    Ok(())
}
