//! Configuration management.
//!
//! The exporter is configured entirely through environment variables so it can
//! run unchanged in a container. Lists are comma-separated and positional:
//! the n-th username and password belong to the n-th server.

use crate::error::{ExporterError, Result};
use serde::Serialize;
use std::time::Duration;

/// Default Prometheus exporter port for AdGuard.
pub const DEFAULT_PORT: u16 = 9618;

/// Default tick interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-request timeout against an appliance.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of query log entries fetched per cycle.
pub const DEFAULT_QUERY_LOG_LIMIT: u32 = 1000;

/// Full exporter configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub appliances: Vec<ApplianceConfig>,
}

/// Settings for the exporter process itself.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub debug: bool,
}

/// Connection settings for one AdGuard Home instance.
#[derive(Clone, Serialize)]
pub struct ApplianceConfig {
    /// Base URL, without trailing slash. Doubles as the appliance identity.
    pub url: String,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub query_log_limit: u32,
}

impl std::fmt::Debug for ApplianceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplianceConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("query_log_limit", &self.query_log_limit)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, interval: DEFAULT_INTERVAL, debug: false }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let servers = split_list(var("ADGUARD_SERVERS").as_deref());
        if servers.is_empty() {
            return Err(ExporterError::invalid_config("ADGUARD_SERVERS must name at least one server"));
        }
        let usernames = split_list(var("ADGUARD_USERNAMES").as_deref());
        let passwords = split_list(var("ADGUARD_PASSWORDS").as_deref());
        for (name, list) in [("ADGUARD_USERNAMES", &usernames), ("ADGUARD_PASSWORDS", &passwords)] {
            if !list.is_empty() && list.len() != servers.len() {
                return Err(ExporterError::invalid_config(format!(
                    "{} has {} entries but ADGUARD_SERVERS has {}",
                    name,
                    list.len(),
                    servers.len()
                )));
            }
        }

        let interval = match var("INTERVAL") {
            Some(raw) => parse_duration(&raw)
                .map_err(|reason| ExporterError::invalid_config(format!("INTERVAL: {}", reason)))?,
            None => DEFAULT_INTERVAL,
        };
        let timeout = match var("REQUEST_TIMEOUT") {
            Some(raw) => parse_duration(&raw).map_err(|reason| {
                ExporterError::invalid_config(format!("REQUEST_TIMEOUT: {}", reason))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        let port = match var("SERVER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                ExporterError::invalid_config(format!("SERVER_PORT {:?}: {}", raw, e))
            })?,
            None => DEFAULT_PORT,
        };
        let query_log_limit = match var("QUERY_LOG_LIMIT") {
            Some(raw) => raw.parse::<u32>().map_err(|e| {
                ExporterError::invalid_config(format!("QUERY_LOG_LIMIT {:?}: {}", raw, e))
            })?,
            None => DEFAULT_QUERY_LOG_LIMIT,
        };
        let debug = var("DEBUG").map(|v| parse_bool(&v)).unwrap_or(false);

        let mut appliances = Vec::with_capacity(servers.len());
        for (i, raw_url) in servers.iter().enumerate() {
            let url = raw_url.trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ExporterError::invalid_config(format!(
                    "server {:?} must start with http:// or https://",
                    raw_url
                )));
            }
            appliances.push(ApplianceConfig {
                url,
                username: usernames.get(i).cloned().filter(|u| !u.is_empty()),
                password: passwords.get(i).cloned().filter(|p| !p.is_empty()),
                timeout,
                query_log_limit,
            });
        }

        Ok(Self { server: ServerConfig { port, interval, debug }, appliances })
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
        None => Vec::new(),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parse a duration such as `30s`, `1m`, `500ms`, `1h` or a bare number of seconds.
///
/// Zero durations are rejected.
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 =
        number.parse().map_err(|_| format!("invalid duration {:?}", raw))?;
    let secs = match unit {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit {:?} in {:?}", other, raw)),
    };
    if secs <= 0.0 {
        return Err(format!("duration {:?} must be positive", raw));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("duration {:?} is out of range", raw))
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
