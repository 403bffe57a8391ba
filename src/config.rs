//! Runtime configuration, read from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `RELAY_TENANTS` | required, comma-separated |
//! | `RELAY_PENDING_URL` | required |
//! | `RELAY_UPDATE_URL` | required |
//! | `RELAY_CONNECTOR_URL` | `http://127.0.0.1:3001` |
//! | `RELAY_BIND` | `0.0.0.0:3000` |
//! | `RELAY_DATA_DIR` | `./data` |
//! | `RELAY_SESSION_DIR` / `RELAY_BACKUP_DIR` | unset (no session backup) |
//! | `RELAY_POLL_INTERVAL_SECS` | 60 |
//! | `RELAY_PACE_MIN_SECS` / `RELAY_PACE_MAX_SECS` | 1 / 8 |
//! | `RELAY_HTTP_TIMEOUT_SECS` | 30 |
//! | `RELAY_CONTACT_SUFFIX` | `@c.us` |
//! | `RELAY_DRAIN_TIMEOUT_SECS` | 10, raised to at least HTTP timeout + 5 |
//! | `RELAY_EXIT_GRACE_MILLIS` | 500 |
//!
//! Unparseable numbers fall back to their default with a warning.
//!
//! The drain timeout must outlast one in-flight send plus the report grace
//! of the loop, so it never drops below the HTTP timeout plus
//! [`DRAIN_MARGIN_SECS`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::connector::DEFAULT_CONTACT_SUFFIX;
use crate::persistence::{DEDUP_FILE_NAME, MARKER_FILE_NAME};
use crate::relay::PacingConfig;
use crate::types::TenantId;

const DEFAULT_CONNECTOR_URL: &str = "http://127.0.0.1:3001";
const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;
/// Headroom the drain timeout keeps above the HTTP timeout.
pub const DRAIN_MARGIN_SECS: u64 = 5;
const DEFAULT_EXIT_GRACE_MILLIS: u64 = 500;

/// Errors that make the configuration unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("{0} lists no tenants")]
    NoTenants(&'static str),

    #[error("invalid listen address {value:?}: {reason}")]
    InvalidBind { value: String, reason: String },
}

/// Everything the relay needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Tenants processed on every tick, in this order.
    pub tenants: Vec<TenantId>,
    pub pending_url: String,
    pub update_url: String,
    pub connector_url: String,
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// Connector session directory to back up at shutdown.
    pub session_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub pacing: PacingConfig,
    /// Upper bound for every fetch, report and send call.
    pub http_timeout: Duration,
    pub contact_suffix: String,
    /// How long shutdown waits for the HTTP server and loop to drain.
    pub drain_timeout: Duration,
    /// Pause between the end of shutdown and process exit.
    pub exit_grace: Duration,
}

impl RelayConfig {
    /// Builds a configuration with defaults for everything but the required values.
    pub fn new(
        tenants: Vec<TenantId>,
        pending_url: impl Into<String>,
        update_url: impl Into<String>,
    ) -> Self {
        RelayConfig {
            tenants,
            pending_url: pending_url.into(),
            update_url: update_url.into(),
            connector_url: DEFAULT_CONNECTOR_URL.to_string(),
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            session_dir: None,
            backup_dir: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            pacing: PacingConfig::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            contact_suffix: DEFAULT_CONTACT_SUFFIX.to_string(),
            drain_timeout: Duration::from_secs(
                DEFAULT_DRAIN_TIMEOUT_SECS.max(DEFAULT_HTTP_TIMEOUT_SECS + DRAIN_MARGIN_SECS),
            ),
            exit_grace: Duration::from_millis(DEFAULT_EXIT_GRACE_MILLIS),
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let tenants = parse_tenants(&required("RELAY_TENANTS")?);
        if tenants.is_empty() {
            return Err(ConfigError::NoTenants("RELAY_TENANTS"));
        }

        let mut config = RelayConfig::new(
            tenants,
            required("RELAY_PENDING_URL")?,
            required("RELAY_UPDATE_URL")?,
        );

        if let Some(url) = lookup("RELAY_CONNECTOR_URL") {
            config.connector_url = url;
        }

        let bind = lookup("RELAY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        config.bind = bind.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidBind {
                value: bind.clone(),
                reason: e.to_string(),
            }
        })?;

        if let Some(dir) = lookup("RELAY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.session_dir = lookup("RELAY_SESSION_DIR").map(PathBuf::from);
        config.backup_dir = lookup("RELAY_BACKUP_DIR").map(PathBuf::from);

        config.poll_interval = Duration::from_secs(parse_or(
            &lookup,
            "RELAY_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        ));
        config.pacing = PacingConfig::new(
            Duration::from_secs(parse_or(&lookup, "RELAY_PACE_MIN_SECS", 1)),
            Duration::from_secs(parse_or(&lookup, "RELAY_PACE_MAX_SECS", 8)),
        );
        config.http_timeout = Duration::from_secs(parse_or(
            &lookup,
            "RELAY_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        ));
        if let Some(suffix) = lookup("RELAY_CONTACT_SUFFIX") {
            config.contact_suffix = suffix;
        }
        let drain_floor = config.http_timeout + Duration::from_secs(DRAIN_MARGIN_SECS);
        let drain_set = lookup("RELAY_DRAIN_TIMEOUT_SECS").is_some();
        let drain = Duration::from_secs(parse_or(
            &lookup,
            "RELAY_DRAIN_TIMEOUT_SECS",
            DEFAULT_DRAIN_TIMEOUT_SECS,
        ));
        if drain < drain_floor && drain_set {
            warn!(
                drain_secs = drain.as_secs(),
                floor_secs = drain_floor.as_secs(),
                "Drain timeout shorter than HTTP timeout plus margin, raising it"
            );
        }
        config.drain_timeout = drain.max(drain_floor);
        config.exit_grace = Duration::from_millis(parse_or(
            &lookup,
            "RELAY_EXIT_GRACE_MILLIS",
            DEFAULT_EXIT_GRACE_MILLIS,
        ));

        Ok(config)
    }

    /// Path of the dedup store file.
    pub fn dedup_path(&self) -> PathBuf {
        self.data_dir.join(DEDUP_FILE_NAME)
    }

    /// Path of the liveness marker.
    pub fn marker_path(&self) -> PathBuf {
        self.data_dir.join(MARKER_FILE_NAME)
    }
}

/// Splits a comma-separated tenant list, dropping blanks and repeats while
/// keeping first-seen order.
pub fn parse_tenants(raw: &str) -> Vec<TenantId> {
    let mut tenants: Vec<TenantId> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let tenant = TenantId::new(part);
        if !tenants.contains(&tenant) {
            tenants.push(tenant);
        }
    }
    tenants
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = key, value = %raw, default = %default, "Invalid number, using default");
                default
            }
        },
    }
}
