//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use deaddrop_shared::auth::ProofPolicy;
use deaddrop_shared::constants::{
    DEFAULT_MESSAGE_MAX_AGE_SECS, DEFAULT_POW_DIFFICULTY, DEFAULT_PROOF_WINDOW_SECS,
};
use deaddrop_store::StoreBackend;

/// How an upstream registry joins the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamMode {
    /// Local registry first, upstream only on NotFound.
    #[default]
    Fallback,
    /// Both concurrently; upstream is authoritative, mismatches are logged.
    DualRead,
}

impl FromStr for UpstreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(UpstreamMode::Fallback),
            "dual-read" | "dual_read" | "dualread" => Ok(UpstreamMode::DualRead),
            other => Err(format!("unknown upstream mode '{other}'")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Mailbox backend.
    /// Env: `STORE_BACKEND` (memory/file/sqlite)
    /// Default: `file`
    pub store_backend: StoreBackend,

    /// Directory (file backend) or database file (sqlite backend).
    /// Env: `STORE_PATH`
    /// Default: `./mailboxes`
    pub store_path: PathBuf,

    /// Key registry database.
    /// Env: `REGISTRY_DB_PATH`
    /// Default: `./registry.db`
    pub registry_db_path: PathBuf,

    /// Mailbox entries older than this are dropped on read.
    /// Env: `MESSAGE_MAX_AGE_SECS`
    /// Default: 7 days
    pub message_max_age: Duration,

    /// Leading zero bits demanded on registry mutations.
    /// Env: `POW_DIFFICULTY`
    /// Default: `10`
    pub pow_difficulty: u32,

    /// Env: `PROOF_WINDOW_SECS`, default `120`.
    pub proof_window_secs: u64,

    /// Extra staleness tolerated for identity proofs, logged when used.
    /// Env: `PROOF_STALE_GRACE_SECS`, default `0` (disabled).
    pub proof_stale_grace_secs: u64,

    /// Base URL of another relay whose registry is consulted as a second tier.
    /// Env: `UPSTREAM_LOOKUP_URL`
    /// Default: unset.
    pub upstream_lookup_url: Option<String>,

    /// Env: `UPSTREAM_MODE` (fallback/dual-read), default `fallback`.
    pub upstream_mode: UpstreamMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            store_backend: StoreBackend::File,
            store_path: PathBuf::from("./mailboxes"),
            registry_db_path: PathBuf::from("./registry.db"),
            message_max_age: Duration::from_secs(DEFAULT_MESSAGE_MAX_AGE_SECS),
            pow_difficulty: DEFAULT_POW_DIFFICULTY,
            proof_window_secs: DEFAULT_PROOF_WINDOW_SECS,
            proof_stale_grace_secs: 0,
            upstream_lookup_url: None,
            upstream_mode: UpstreamMode::Fallback,
        }
    }
}

/// Parse `raw` into `slot`, keeping the current value and warning on failure.
fn parse_into<T>(var: &str, raw: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => tracing::warn!(var, value = %raw, error = %e, "Invalid setting, using default"),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = get("HTTP_ADDR") {
            parse_into("HTTP_ADDR", &addr, &mut config.http_addr);
        }

        if let Some(backend) = get("STORE_BACKEND") {
            parse_into("STORE_BACKEND", &backend, &mut config.store_backend);
        }

        if let Some(path) = get("STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }

        if let Some(path) = get("REGISTRY_DB_PATH") {
            config.registry_db_path = PathBuf::from(path);
        }

        if let Some(val) = get("MESSAGE_MAX_AGE_SECS") {
            let mut secs = config.message_max_age.as_secs();
            parse_into("MESSAGE_MAX_AGE_SECS", &val, &mut secs);
            config.message_max_age = Duration::from_secs(secs);
        }

        if let Some(val) = get("POW_DIFFICULTY") {
            parse_into("POW_DIFFICULTY", &val, &mut config.pow_difficulty);
            if config.pow_difficulty > 256 {
                tracing::warn!(value = config.pow_difficulty, "POW_DIFFICULTY above 256 is unsatisfiable, using default");
                config.pow_difficulty = DEFAULT_POW_DIFFICULTY;
            }
        }

        if let Some(val) = get("PROOF_WINDOW_SECS") {
            parse_into("PROOF_WINDOW_SECS", &val, &mut config.proof_window_secs);
        }

        if let Some(val) = get("PROOF_STALE_GRACE_SECS") {
            parse_into("PROOF_STALE_GRACE_SECS", &val, &mut config.proof_stale_grace_secs);
        }

        if let Some(url) = get("UPSTREAM_LOOKUP_URL") {
            if !url.trim().is_empty() {
                config.upstream_lookup_url = Some(url.trim().to_string());
            }
        }

        if let Some(mode) = get("UPSTREAM_MODE") {
            parse_into("UPSTREAM_MODE", &mode, &mut config.upstream_mode);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn proof_policy(&self) -> ProofPolicy {
        ProofPolicy::new(self.proof_window_secs, self.proof_stale_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_vars(|name| map.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.store_backend, StoreBackend::File);
        assert_eq!(config.pow_difficulty, 10);
        assert_eq!(config.message_max_age, Duration::from_secs(604_800));
        assert_eq!(config.upstream_lookup_url, None);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("STORE_BACKEND", "sqlite"),
            ("STORE_PATH", "/var/lib/deaddrop/mail.db"),
            ("MESSAGE_MAX_AGE_SECS", "60"),
            ("POW_DIFFICULTY", "16"),
            ("PROOF_WINDOW_SECS", "300"),
            ("PROOF_STALE_GRACE_SECS", "900"),
            ("UPSTREAM_LOOKUP_URL", "http://legacy.example"),
            ("UPSTREAM_MODE", "dual-read"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.store_path, PathBuf::from("/var/lib/deaddrop/mail.db"));
        assert_eq!(config.message_max_age, Duration::from_secs(60));
        assert_eq!(config.pow_difficulty, 16);
        assert_eq!(config.proof_policy(), ProofPolicy::new(300, 900));
        assert_eq!(config.upstream_lookup_url.as_deref(), Some("http://legacy.example"));
        assert_eq!(config.upstream_mode, UpstreamMode::DualRead);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_map(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("STORE_BACKEND", "redis"),
            ("POW_DIFFICULTY", "999"),
            ("MESSAGE_MAX_AGE_SECS", "-1"),
            ("UPSTREAM_MODE", "round-robin"),
            ("UPSTREAM_LOOKUP_URL", "  "),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.store_backend, defaults.store_backend);
        assert_eq!(config.pow_difficulty, defaults.pow_difficulty);
        assert_eq!(config.message_max_age, defaults.message_max_age);
        assert_eq!(config.upstream_mode, UpstreamMode::Fallback);
        assert_eq!(config.upstream_lookup_url, None);
    }
}
