//! Persisted user settings and command-line level configuration helpers

use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use shared::{SharedError, SharedResult};
use uuid::Uuid;

/// Lowest port the proxy may listen on (below this needs privileges)
pub const MIN_PROXY_PORT: u16 = 1024;

const SETTINGS_FILE_NAME: &str = ".vexar.json";

/// User preferences persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Connect automatically whenever the internet becomes reachable
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Pick the lowest-latency DNS server before each connect
    #[serde(default = "default_true")]
    pub auto_dns: bool,

    /// Catalog id used when `auto_dns` is off
    #[serde(default)]
    pub selected_dns_server: Option<String>,

    /// The user explicitly disconnected; suppresses auto-connect across restarts
    #[serde(default)]
    pub user_initiated_disconnect: bool,

    #[serde(default = "default_true")]
    pub analytics_enabled: bool,

    #[serde(default)]
    pub anonymous_user_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            auto_dns: true,
            selected_dns_server: None,
            user_initiated_disconnect: false,
            analytics_enabled: true,
            anonymous_user_id: None,
        }
    }
}

impl Settings {
    /// Assign an anonymous id if none exists yet. Returns true when one was generated.
    pub fn ensure_anonymous_id(&mut self) -> bool {
        if self.anonymous_user_id.is_some() {
            return false;
        }
        self.anonymous_user_id = Some(Uuid::new_v4().to_string());
        true
    }
}

/// `$HOME/.vexar.json`, falling back to the working directory
pub fn default_settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_FILE_NAME)
}

/// Parse `"8080-8090"` (or a single `"8080"`) into an inclusive port range
pub fn parse_port_range(value: &str) -> SharedResult<RangeInclusive<u16>> {
    let invalid = || SharedError::invalid_config("ports", value);

    let (start, end) = match value.trim().split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (value.trim(), value.trim()),
    };
    let start: u16 = start.parse().map_err(|_| invalid())?;
    let end: u16 = end.parse().map_err(|_| invalid())?;

    if start < MIN_PROXY_PORT || start > end {
        return Err(invalid());
    }
    Ok(start..=end)
}
