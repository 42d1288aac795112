//! Core types shared by the supervisor, the orchestrator and the front end

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical component emitting a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// Front end / composition root
    App,
    /// Connection state machine
    Orchestrator,
    /// Proxy process supervisor
    Supervisor,
    /// Output captured from the proxy binary itself
    Proxy,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::App => write!(f, "app"),
            Component::Orchestrator => write!(f, "orchestrator"),
            Component::Supervisor => write!(f, "supervisor"),
            Component::Proxy => write!(f, "proxy"),
        }
    }
}

/// Severity inferred from the text of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSeverity {
    Error,
    Warning,
    Success,
}

impl LogSeverity {
    const ERROR_MARKERS: &'static [&'static str] = &["error", "fail", "❌"];
    const WARNING_MARKERS: &'static [&'static str] = &["warn", "⚠️"];
    const SUCCESS_MARKERS: &'static [&'static str] = &["success", "connected", "✅"];

    /// Infer a severity from textual markers, case-insensitively.
    ///
    /// Error markers win over warning markers, which win over success markers.
    /// "disconnected" never counts as a success.
    pub fn infer(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if has(Self::ERROR_MARKERS) {
            Some(LogSeverity::Error)
        } else if has(Self::WARNING_MARKERS) {
            Some(LogSeverity::Warning)
        } else if !lower.contains("disconnected") && has(Self::SUCCESS_MARKERS) {
            Some(LogSeverity::Success)
        } else {
            None
        }
    }
}

/// One captured output line or lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub severity: Option<LogSeverity>,
}

impl LogEntry {
    /// Create an entry stamped with the current local time
    pub fn new(message: impl Into<String>) -> Self {
        Self::at(Local::now(), message)
    }

    pub fn at(timestamp: DateTime<Local>, message: impl Into<String>) -> Self {
        let message = message.into();
        let severity = LogSeverity::infer(&message);
        Self {
            timestamp,
            message,
            severity,
        }
    }

    /// Timestamp rendered at second resolution
    pub fn clock(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.clock(), self.message)
    }
}

/// Which pipe of the proxy a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Host-level internet reachability as reported by the network monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reachability {
    Satisfied,
    Unsatisfied,
}

impl Reachability {
    pub fn is_available(self) -> bool {
        self == Reachability::Satisfied
    }
}

/// User-facing connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// The value the rest of the application observes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProjection {
    pub connected: bool,
    pub connecting: bool,
}

impl ConnectionProjection {
    pub fn status(&self) -> ConnectionStatus {
        if self.connected {
            ConnectionStatus::Connected
        } else if self.connecting {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

/// A DNS server the proxy can be pointed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsServer {
    pub id: String,
    pub name: String,
    pub address: String,
    pub description: String,
}

impl DnsServer {
    pub fn new(id: &str, name: &str, address: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            description: description.to_string(),
        }
    }
}
