use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime settings, read from `AGORA_*` environment variables (a `.env`
/// file is loaded first if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_ttl: chrono::Duration,
    pub sweep_every: Duration,
    /// Mounts `GET /debug/sessions`.
    pub debug_sessions: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let host = var("AGORA_HOST", "0.0.0.0");
        let port = var("AGORA_PORT", "3000");
        let ttl_hours = var("AGORA_SESSION_TTL_HOURS", "24");
        let sweep_secs = var("AGORA_SESSION_SWEEP_SECS", "300");
        let debug_sessions = var("AGORA_DEBUG_SESSIONS", "false");

        let ttl_hours: i64 = ttl_hours
            .parse()
            .with_context(|| format!("AGORA_SESSION_TTL_HOURS is not a number: {}", ttl_hours))?;
        anyhow::ensure!(ttl_hours > 0, "AGORA_SESSION_TTL_HOURS must be positive");

        let sweep_secs: u64 = sweep_secs
            .parse()
            .with_context(|| format!("AGORA_SESSION_SWEEP_SECS is not a number: {}", sweep_secs))?;
        anyhow::ensure!(sweep_secs > 0, "AGORA_SESSION_SWEEP_SECS must be positive");

        Ok(Self {
            host: host
                .parse()
                .with_context(|| format!("AGORA_HOST is not an IP address: {}", host))?,
            port: port
                .parse()
                .with_context(|| format!("AGORA_PORT is not a port: {}", port))?,
            db_path: PathBuf::from(var("AGORA_DB_PATH", "agora.db")),
            session_ttl: chrono::Duration::hours(ttl_hours),
            sweep_every: Duration::from_secs(sweep_secs),
            debug_sessions: matches!(debug_sessions.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
