//! Environment-driven configuration for the relay server and the dashboard.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::controller::DashboardConfig;
use crate::relay::RelayConfig;
use crate::stats::Timeframe;

pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayServerConfig {
    pub bind_addr: SocketAddr,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardClientConfig {
    pub api_url: String,
    pub fetch_timeout_ms: u64,
    pub export_dir: PathBuf,
    pub dashboard: DashboardConfig,
}

pub fn relay_server_config_from_env() -> Result<RelayServerConfig, ConfigError> {
    let raw_addr = non_empty_var("STATDASH_RELAY_ADDR")
        .unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string());
    let bind_addr = raw_addr.parse().map_err(|_| ConfigError::Invalid {
        key: "STATDASH_RELAY_ADDR",
        value: raw_addr.clone(),
    })?;

    let upstream = non_empty_var("STATDASH_UPSTREAM_URL")
        .ok_or(ConfigError::Missing("STATDASH_UPSTREAM_URL"))?;

    let mut relay = RelayConfig::new(upstream);
    if let Some(mount) = non_empty_var("STATDASH_RELAY_MOUNT") {
        relay.mount_prefix = mount;
    }
    if let Some(secs) = parsed_var::<u64>("STATDASH_RELAY_CACHE_SECS") {
        relay.cache_ttl = Duration::from_secs(secs);
    }
    if let Some(ms) = parsed_var::<u64>("STATDASH_RELAY_TIMEOUT_MS").filter(|ms| *ms > 0) {
        relay.upstream_timeout_ms = ms;
    }

    Ok(RelayServerConfig { bind_addr, relay })
}

pub fn dashboard_client_config_from_env() -> DashboardClientConfig {
    let mut dashboard = DashboardConfig::default();
    if let Some(secs) = parsed_var::<u64>("STATDASH_REFRESH_SECS").filter(|secs| *secs > 0) {
        dashboard.refresh_interval = Duration::from_secs(secs);
    }
    if let Some(timeframe) = parsed_var::<Timeframe>("STATDASH_TIMEFRAME") {
        dashboard.initial_timeframe = timeframe;
    }

    DashboardClientConfig {
        api_url: non_empty_var("STATDASH_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        fetch_timeout_ms: parsed_var::<u64>("STATDASH_FETCH_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .unwrap_or(10_000),
        export_dir: non_empty_var("STATDASH_EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
        dashboard,
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub(crate) fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_var(key).and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    pub(crate) fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), env::var(key).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let output = f();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        output
    }
}
