//! Layered server settings: compiled defaults, then an optional JSON
//! file, then `GRIDFALL_*` environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Top-level settings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Matchmaking settings.
    pub matchmaking: MatchmakingSettings,
    /// Per-session settings.
    pub session: SessionSettings,
}

/// Where the server listens.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Bind address.
    pub bind_addr: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Matchmaking tunables.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchmakingSettings {
    /// Admission queue depth.
    pub admission_capacity: usize,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            admission_capacity: 100,
        }
    }
}

/// Per-session tunables.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    /// Outbound queue depth per connection.
    pub outbound_capacity: usize,
    /// Deadline for one transport write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Delay between the two fan-out deliveries, in milliseconds.
    pub pacing_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 8,
            write_timeout_ms: 1_000,
            pacing_ms: 100,
        }
    }
}

impl Settings {
    /// The `addr:port` string the listener binds.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_addr, self.server.port)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.session.write_timeout_ms)
    }

    /// Fan-out pacing as a [`Duration`].
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.session.pacing_ms)
    }
}

/// Settings-layer failures, fatal at startup.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for [`Settings`].
    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
    /// An environment override did not parse.
    #[error("invalid value {value:?} for {var}")]
    Env {
        /// The offending variable.
        var: &'static str,
        /// Its raw value.
        value: String,
    },
}

/// Load settings: defaults, overlaid by `path` when given, overlaid by
/// the process environment.
pub fn load(path: Option<&Path>) -> Result<Settings, SettingsError> {
    let mut settings = match path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Settings::default(),
    };
    apply_env(&mut settings, |var| std::env::var(var).ok())?;
    Ok(settings)
}

/// Apply `GRIDFALL_*` overrides read through `get`. Injected so tests
/// never have to mutate the process environment.
fn apply_env(
    settings: &mut Settings,
    get: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    if let Some(value) = get("GRIDFALL_BIND_ADDR") {
        settings.server.bind_addr = value;
    }
    if let Some(value) = get("GRIDFALL_PORT") {
        settings.server.port = parse_var("GRIDFALL_PORT", value)?;
    }
    if let Some(value) = get("GRIDFALL_ADMISSION_CAPACITY") {
        settings.matchmaking.admission_capacity = parse_var("GRIDFALL_ADMISSION_CAPACITY", value)?;
    }
    if let Some(value) = get("GRIDFALL_OUTBOUND_CAPACITY") {
        settings.session.outbound_capacity = parse_var("GRIDFALL_OUTBOUND_CAPACITY", value)?;
    }
    if let Some(value) = get("GRIDFALL_WRITE_TIMEOUT_MS") {
        settings.session.write_timeout_ms = parse_var("GRIDFALL_WRITE_TIMEOUT_MS", value)?;
    }
    if let Some(value) = get("GRIDFALL_PACING_MS") {
        settings.session.pacing_ms = parse_var("GRIDFALL_PACING_MS", value)?;
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, SettingsError> {
    value
        .parse()
        .map_err(|_| SettingsError::Env { var, value })
}
