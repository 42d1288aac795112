//! Supervisor library for the spoofdpi local proxy
//!
//! Launches the proxy on a free port, captures its output, restarts it after
//! crashes within a bounded budget, and reconciles all of that with user
//! intent and network reachability into one connected/connecting projection.

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod supervisor;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Settings;
pub use core::{BinaryLocator, LogSink, OrchestratorSnapshot, PortAllocator, SupervisorPhase, SupervisorSnapshot};
pub use error::{SupervisorError, VexarError, VexarResult};
pub use orchestrator::{ConnectionOrchestrator, OrchestratorHandle, OrchestratorOptions};
pub use supervisor::{ProcessSupervisor, SupervisorConfig, SupervisorEvent};
pub use traits::{
    DnsProvider, Installer, LaunchSpec, PortProbe, ProxyLauncher, ProxyProcess, SettingsStore, StrayProcessReaper,
    Telemetry,
};
