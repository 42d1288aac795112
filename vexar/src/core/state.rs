//! Supervisor and connection state
//!
//! Plain data owned by the supervisor and orchestrator tasks, plus the
//! serializable snapshots handed out to observers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::ConnectionProjection;
use tokio::time::Instant;

use super::recovery::CrashTracker;

/// Lifecycle of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorPhase {
    /// Never started
    Idle,
    /// Cleaning up strays and spawning
    Starting,
    Running,
    /// Stopped by request, clean exit, start failure or exhausted restarts
    Stopped,
    /// Crashed with a restart pending
    Crashed,
}

#[derive(Debug, Clone)]
pub struct SupervisorState {
    pub phase: SupervisorPhase,
    pub is_running: bool,
    pub current_port: Option<u16>,
    pub crash: CrashTracker,
    /// Set by `stop`, cleared by `start`; suppresses crash recovery
    pub user_initiated_stop: bool,
}

impl SupervisorState {
    pub fn new(crash: CrashTracker) -> Self {
        Self {
            phase: SupervisorPhase::Idle,
            is_running: false,
            current_port: None,
            crash,
            user_initiated_stop: false,
        }
    }

    /// Mark the process as gone without touching crash bookkeeping
    pub fn mark_not_running(&mut self, phase: SupervisorPhase) {
        self.is_running = false;
        self.current_port = None;
        self.phase = phase;
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new(CrashTracker::default())
    }
}

/// Point-in-time view of the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSnapshot {
    pub phase: SupervisorPhase,
    pub is_running: bool,
    pub current_port: Option<u16>,
    pub pid: Option<u32>,
    pub crash_count: u32,
    /// Time since the last counted crash
    pub since_last_crash: Option<Duration>,
}

impl SupervisorSnapshot {
    pub fn capture(state: &SupervisorState, pid: Option<u32>) -> Self {
        Self {
            phase: state.phase,
            is_running: state.is_running,
            current_port: state.current_port,
            pid,
            crash_count: state.crash.count(),
            since_last_crash: state.crash.last_crash().map(|at| Instant::now().saturating_duration_since(at)),
        }
    }
}

/// Orchestrator-side connection flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    /// Starts false until the monitor reports otherwise
    pub is_internet_available: bool,
    pub user_initiated_disconnect: bool,
}

impl ConnectionState {
    pub fn projection(&self) -> ConnectionProjection {
        ConnectionProjection {
            connected: self.is_connected,
            connecting: self.is_connecting,
        }
    }
}

/// Point-in-time view of the whole orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub projection: ConnectionProjection,
    pub is_internet_available: bool,
    pub user_initiated_disconnect: bool,
    pub supervisor: SupervisorSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_supervisor_state() {
        let state = SupervisorState::default();
        assert_eq!(state.phase, SupervisorPhase::Idle);
        assert!(!state.is_running);
        assert_eq!(state.current_port, None);
        assert!(!state.user_initiated_stop);
    }

    #[test]
    fn test_mark_not_running_clears_port() {
        let mut state = SupervisorState::default();
        state.is_running = true;
        state.current_port = Some(8080);
        state.mark_not_running(SupervisorPhase::Stopped);

        assert!(!state.is_running);
        assert_eq!(state.current_port, None);
        assert_eq!(state.phase, SupervisorPhase::Stopped);
    }

    #[test]
    fn test_connection_projection() {
        let state = ConnectionState {
            is_connecting: true,
            ..Default::default()
        };
        assert_eq!(
            state.projection(),
            ConnectionProjection {
                connected: false,
                connecting: true
            }
        );
        assert!(!state.is_internet_available);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = SupervisorSnapshot::capture(&SupervisorState::default(), None);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"phase\":\"Idle\""));
    }
}
