//! Configuration Module
//!
//! Process-level settings loaded from environment variables. The caching
//! policy itself lives in `policy`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Origin the agent fronts; relative request paths resolve against it
    pub upstream_origin: String,
    /// Directory for the disk backend, in-memory stores when unset
    pub cache_dir: Option<PathBuf>,
    /// Per-fetch timeout, also the default network-first timeout
    pub network_timeout_secs: u64,
    /// Interval between expiration sweeps
    pub sweep_interval_secs: u64,
    /// Clients unseen for this long are released by the sweep
    pub client_idle_secs: u64,
    /// JSON policy file, built-in site policy when unset
    pub policy_file: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_ORIGIN` - Origin to proxy (default: http://localhost:8080)
    /// - `CACHE_DIR` - Disk store directory (default: in-memory)
    /// - `NETWORK_TIMEOUT_SECS` - Fetch timeout in seconds (default: 10)
    /// - `SWEEP_INTERVAL_SECS` - Expiration sweep interval (default: 60)
    /// - `CLIENT_IDLE_SECS` - Idle client release threshold (default: 1800)
    /// - `POLICY_FILE` - Policy JSON path (default: built-in policy)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            upstream_origin: env::var("UPSTREAM_ORIGIN")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upstream_origin),
            cache_dir: path_var("CACHE_DIR"),
            network_timeout_secs: parse_var("NETWORK_TIMEOUT_SECS")
                .filter(|&v| v > 0)
                .unwrap_or(defaults.network_timeout_secs),
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS")
                .filter(|&v| v > 0)
                .unwrap_or(defaults.sweep_interval_secs),
            client_idle_secs: parse_var("CLIENT_IDLE_SECS")
                .filter(|&v| v > 0)
                .unwrap_or(defaults.client_idle_secs),
            policy_file: path_var("POLICY_FILE"),
        }
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn path_var(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            upstream_origin: "http://localhost:8080".to_string(),
            cache_dir: None,
            network_timeout_secs: 10,
            sweep_interval_secs: 60,
            client_idle_secs: 1800,
            policy_file: None,
        }
    }
}
