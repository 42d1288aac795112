//! Trait definitions with mockall annotations for testing
//!
//! Every collaborator the supervisor and the orchestrator talk to sits behind
//! one of these traits so the state machines can be driven deterministically
//! in tests.

use std::collections::HashMap;
use std::path::PathBuf;

use shared::DnsServer;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;

use crate::config::Settings;
use crate::error::VexarResult;

/// One of the proxy's output pipes
pub type OutputReader = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to spawn the proxy once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// A live proxy process as seen by the supervisor.
///
/// `exit` resolves exactly once with the exit code (the signal number when the
/// process was killed by a signal). Sending on, or dropping, `terminate` asks
/// the process to exit gracefully.
pub struct ProxyProcess {
    pub pid: Option<u32>,
    pub stdout: Option<OutputReader>,
    pub stderr: Option<OutputReader>,
    pub exit: oneshot::Receiver<i32>,
    pub terminate: oneshot::Sender<()>,
}

/// Spawns the proxy binary
#[mockall::automock]
pub trait ProxyLauncher: Send + Sync {
    /// Spawn the program described by `spec`
    ///
    /// # Returns
    /// The running process, or the OS error that prevented spawning it
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ProxyProcess>;
}

/// Terminates leftover proxy instances from earlier runs
#[mockall::automock]
#[async_trait::async_trait]
pub trait StrayProcessReaper: Send + Sync {
    /// Ask every process named `binary_name` (other than ourselves) to exit
    ///
    /// # Returns
    /// How many processes were signalled
    async fn terminate_strays(&self, binary_name: &str) -> VexarResult<usize>;
}

/// Checks whether a TCP port can currently be bound on all interfaces
#[mockall::automock]
pub trait PortProbe: Send + Sync {
    fn is_available(&self, port: u16) -> bool;
}

/// DNS server catalog with latency measurement
#[mockall::automock]
#[async_trait::async_trait]
pub trait DnsProvider: Send + Sync {
    /// Probe every server and replace the latency table
    async fn measure_all_latencies(&self);

    /// Last measured latency per server id, in milliseconds
    fn latencies(&self) -> HashMap<String, u64>;

    /// Lowest-latency server from the last measurement
    fn best_server(&self) -> Option<DnsServer>;

    fn servers(&self) -> Vec<DnsServer>;
}

/// Fire-and-forget product analytics
#[mockall::automock]
pub trait Telemetry: Send + Sync {
    fn send_event(&self, event_name: &str, parameters: HashMap<String, String>);
}

/// Persistence for [`Settings`]
#[mockall::automock]
pub trait SettingsStore: Send + Sync {
    /// Load settings, returning defaults when nothing has been saved yet
    fn load(&self) -> VexarResult<Settings>;

    fn save(&self, settings: &Settings) -> VexarResult<()>;
}

/// Installs the proxy binary through the system package manager
#[mockall::automock]
#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    fn is_installed(&self) -> bool;

    async fn install(&self) -> VexarResult<()>;
}
