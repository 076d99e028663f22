//! Configuration: a TOML file with optional sections, merged under CLI-flag
//! overrides by the binary. A missing file means defaults; an unparsable one
//! is a warning, not a startup failure.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

/// Config file structure. Every section is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub child: ChildSection,
    pub server: ServerSection,
    pub idle: IdleSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChildSection {
    /// Subprocess command line, run under `sh -c`.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Path clients connect to for the SSE stream.
    pub sse_path: String,
    /// Path clients POST inbound messages to.
    pub message_path: String,
    /// Paths that respond 200 "ok".
    pub health_endpoints: Vec<String>,
    /// Allowed CORS origins; `*` allows any. Empty disables CORS handling.
    pub cors_origins: Vec<String>,
    /// Static response headers applied to every endpoint. Opaque to the
    /// bridge; merely threaded through to the HTTP layer.
    pub headers: HashMap<String, String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            health_endpoints: Vec::new(),
            cors_origins: Vec::new(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IdleSection {
    /// Shut the bridge down after this many seconds with zero sessions.
    /// 0 disables idle shutdown.
    pub timeout_secs: u64,
}

impl ConfigFile {
    /// Load from `path`. Missing file or parse failure falls back to
    /// defaults with a log line.
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config {:?}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }
}

/// Effective configuration after CLI overrides are applied.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub command: String,
    pub bind: String,
    pub port: u16,
    pub sse_path: String,
    pub message_path: String,
    pub health_endpoints: Vec<String>,
    pub cors_origins: Vec<String>,
    pub headers: HashMap<String, String>,
    /// `None` disables idle shutdown.
    pub idle_timeout: Option<Duration>,
}

/// Split a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
