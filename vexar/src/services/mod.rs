//! Service implementations
//!
//! Real implementations of the collaborator traits. These are the ones that
//! touch processes, sockets and the filesystem.

pub mod dns;
pub mod installer;
pub mod process_launcher;
pub mod process_reaper;
pub mod reachability;
pub mod settings_store;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use dns::DnsCatalog;
pub use installer::HomebrewInstaller;
pub use process_launcher::TokioProxyLauncher;
pub use process_reaper::SystemReaper;
pub use reachability::TcpReachabilityMonitor;
pub use settings_store::JsonSettingsStore;
pub use telemetry::TracingTelemetry;
