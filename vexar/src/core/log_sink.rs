//! Bounded, timestamped log shared by the supervisor and the orchestrator
//!
//! Every writer (stdout pump, stderr pump, supervisor lifecycle, orchestrator
//! events) goes through the same mutex, so appends are serialized. Entries are
//! also mirrored into `tracing` and broadcast to live subscribers.

use std::sync::{Arc, Mutex, MutexGuard};

use shared::{Component, LogEntry, LogSeverity, OutputStream};
use tokio::sync::broadcast;

/// Hard capacity of the sink
pub const LOG_CAPACITY: usize = 300;

/// Number of most recent entries kept when the capacity is exceeded
pub const LOG_RETAINED: usize = 200;

const LIVE_TAIL_BUFFER: usize = 64;

#[derive(Clone)]
pub struct LogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    live: broadcast::Sender<LogEntry>,
    capacity: usize,
    retained: usize,
    /// Component that lifecycle messages are attributed to in tracing
    component: Component,
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_limits(LOG_CAPACITY, LOG_RETAINED)
    }

    /// Custom limits; `retained` is clamped to `capacity`
    pub fn with_limits(capacity: usize, retained: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_TAIL_BUFFER);
        Self {
            entries: Arc::new(Mutex::new(Vec::with_capacity(capacity + 1))),
            live,
            capacity,
            retained: retained.min(capacity),
            component: Component::Supervisor,
        }
    }

    /// Handle on the same entries whose messages are attributed to `component`
    pub fn for_component(&self, component: Component) -> Self {
        Self {
            component,
            ..self.clone()
        }
    }

    pub fn component(&self) -> Component {
        self.component
    }

    /// Append a lifecycle message
    pub fn append(&self, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(message);
        mirror_to_tracing(self.component, &entry);
        self.push(entry)
    }

    /// Append a line captured from one of the proxy's pipes
    pub fn append_output(&self, stream: OutputStream, line: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(line);
        shared::component_debug!(Component::Proxy, stream = ?stream, "{}", entry.message);
        self.push(entry)
    }

    fn push(&self, entry: LogEntry) -> LogEntry {
        {
            let mut entries = self.lock();
            entries.push(entry.clone());
            // Trim in bulk rather than shifting on every append
            if entries.len() > self.capacity {
                let excess = entries.len() - self.retained;
                entries.drain(..excess);
            }
        }
        // No subscribers is fine
        let _ = self.live.send(entry.clone());
        entry
    }

    /// Snapshot of the remaining entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Receive entries as they are appended
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

fn mirror_to_tracing(component: Component, entry: &LogEntry) {
    match entry.severity {
        Some(LogSeverity::Error) => {
            shared::component_error!(component, "{}", entry.message);
        }
        Some(LogSeverity::Warning) => {
            shared::component_warn!(component, "{}", entry.message);
        }
        _ => {
            shared::component_info!(component, "{}", entry.message);
        }
    }
}
