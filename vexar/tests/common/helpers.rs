//! Test helpers and builder patterns for supervisor and orchestrator tests

use std::collections::HashMap;
use std::io;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::{LogEntry, Reachability};
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use vexar::config::Settings;
use vexar::traits::{
    LaunchSpec, MockDnsProvider, MockPortProbe, MockSettingsStore, MockStrayProcessReaper, MockTelemetry,
    ProxyLauncher, ProxyProcess,
};
use vexar::{
    BinaryLocator, ConnectionOrchestrator, LogSink, OrchestratorHandle, OrchestratorOptions, PortAllocator,
    ProcessSupervisor, SupervisorConfig,
};

use super::fixtures::TestFixtures;

pub type TestSupervisor = ProcessSupervisor<FakeLauncher, MockStrayProcessReaper>;
pub type TestOrchestrator =
    ConnectionOrchestrator<FakeLauncher, MockStrayProcessReaper, MockDnsProvider, MockTelemetry, MockSettingsStore>;

/// Ceiling for waiting on a supervisor event; virtual time under `start_paused`
const EVENT_TIMEOUT: Duration = Duration::from_secs(600);

/// One process handed out by [`FakeLauncher`]
#[derive(Clone)]
pub struct FakeProcess {
    pub spec: LaunchSpec,
    exit: Arc<Mutex<Option<oneshot::Sender<i32>>>>,
    stdout: Arc<tokio::sync::Mutex<DuplexStream>>,
    termination_requested: Arc<AtomicBool>,
}

impl FakeProcess {
    /// Make the process exit. Returns false if it had already exited.
    pub fn exit_with(&self, code: i32) -> bool {
        match self.exit.lock().unwrap().take() {
            Some(sender) => sender.send(code).is_ok(),
            None => false,
        }
    }

    pub async fn write_stdout(&self, text: &str) {
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(text.as_bytes()).await.unwrap();
        stdout.flush().await.unwrap();
    }

    /// The supervisor asked this process to stop while it was alive
    pub fn termination_requested(&self) -> bool {
        self.termination_requested.load(Ordering::SeqCst)
    }

    pub fn has_arg_pair(&self, flag: &str, value: &str) -> bool {
        self.spec.args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }
}

#[derive(Default)]
struct LauncherState {
    processes: Vec<FakeProcess>,
    fail_with: Option<io::ErrorKind>,
    ignore_termination: bool,
}

/// Scriptable stand-in for the real process launcher
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent launch fails with this error kind
    pub fn fail_launches(&self, kind: io::ErrorKind) {
        self.state.lock().unwrap().fail_with = Some(kind);
    }

    /// Processes launched from now on do not exit when asked to
    pub fn ignore_termination(&self) {
        self.state.lock().unwrap().ignore_termination = true;
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().unwrap().processes.len()
    }

    pub fn process(&self, index: usize) -> FakeProcess {
        self.state.lock().unwrap().processes[index].clone()
    }

    pub fn last_process(&self) -> FakeProcess {
        let state = self.state.lock().unwrap();
        state.processes.last().cloned().expect("nothing was launched")
    }
}

impl ProxyLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<ProxyProcess> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.fail_with {
            return Err(io::Error::new(kind, "fake launch failure"));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let (terminate_tx, terminate_rx) = oneshot::channel::<()>();
        let (writer, reader) = tokio::io::duplex(4096);

        let process = FakeProcess {
            spec: spec.clone(),
            exit: Arc::new(Mutex::new(Some(exit_tx))),
            stdout: Arc::new(tokio::sync::Mutex::new(writer)),
            termination_requested: Arc::new(AtomicBool::new(false)),
        };

        // Behave like a proxy that exits on SIGTERM
        if !state.ignore_termination {
            let on_terminate = process.clone();
            tokio::spawn(async move {
                let _ = terminate_rx.await;
                if on_terminate.exit_with(TestFixtures::SIGTERM_EXIT_CODE) {
                    on_terminate.termination_requested.store(true, Ordering::SeqCst);
                }
            });
        } else {
            let on_terminate = process.clone();
            tokio::spawn(async move {
                if terminate_rx.await.is_ok() {
                    on_terminate.termination_requested.store(true, Ordering::SeqCst);
                }
            });
        }

        let pid = 4000 + state.processes.len() as u32;
        state.processes.push(process);
        Ok(ProxyProcess {
            pid: Some(pid),
            stdout: Some(Box::new(reader)),
            stderr: None,
            exit: exit_rx,
            terminate: terminate_tx,
        })
    }
}

pub struct TestHelpers;

impl TestHelpers {
    pub fn reaper() -> MockStrayProcessReaper {
        let mut reaper = MockStrayProcessReaper::new();
        reaper.expect_terminate_strays().returning(|_| Ok(0)).times(0..);
        reaper
    }

    /// Port probe reporting every port in `occupied` as taken
    pub fn port_allocator(occupied: Vec<u16>) -> PortAllocator {
        Self::port_allocator_for(8080..=8090, occupied)
    }

    pub fn port_allocator_for(range: RangeInclusive<u16>, occupied: Vec<u16>) -> PortAllocator {
        let mut probe = MockPortProbe::new();
        probe
            .expect_is_available()
            .returning(move |port| !occupied.contains(&port));
        PortAllocator::with_probe(range, probe)
    }

    pub fn supervisor_with(
        launcher: FakeLauncher,
        binary: PathBuf,
        config: SupervisorConfig,
        ports: PortAllocator,
    ) -> TestSupervisor {
        ProcessSupervisor::with_port_allocator(
            launcher,
            Self::reaper(),
            BinaryLocator::new(vec![binary]),
            ports,
            config,
            LogSink::new(),
        )
    }

    /// Supervisor with an installed binary, free ports and default timings
    pub fn supervisor() -> (TempDir, TestSupervisor, FakeLauncher) {
        Self::supervisor_with_config(SupervisorConfig::default())
    }

    pub fn supervisor_with_config(config: SupervisorConfig) -> (TempDir, TestSupervisor, FakeLauncher) {
        let (dir, binary) = TestFixtures::installed_binary();
        let launcher = FakeLauncher::new();
        let supervisor = Self::supervisor_with(launcher.clone(), binary, config, Self::port_allocator(vec![]));
        (dir, supervisor, launcher)
    }

    /// Handle supervisor events until `done` holds
    pub async fn drive_until(supervisor: &mut TestSupervisor, mut done: impl FnMut(&TestSupervisor) -> bool) {
        while !done(supervisor) {
            let event = timeout(EVENT_TIMEOUT, supervisor.next_event())
                .await
                .expect("supervisor went quiet")
                .expect("event channel closed");
            supervisor.handle_event(event).await;
        }
    }

    /// Handle whatever events arrive within `window`
    pub async fn drain_for(supervisor: &mut TestSupervisor, window: Duration) {
        while let Ok(Some(event)) = timeout(window, supervisor.next_event()).await {
            supervisor.handle_event(event).await;
        }
    }

    /// Same as [`TestHelpers::drive_until`] for an orchestrator driven by hand
    pub async fn drive_orchestrator_until(
        orchestrator: &mut TestOrchestrator,
        mut done: impl FnMut(&TestOrchestrator) -> bool,
    ) {
        while !done(orchestrator) {
            let event = timeout(EVENT_TIMEOUT, orchestrator.next_supervisor_event())
                .await
                .expect("supervisor went quiet")
                .expect("event channel closed");
            orchestrator.apply_supervisor_event(event).await;
        }
    }

    pub fn messages(logs: &LogSink) -> Vec<String> {
        logs.entries().into_iter().map(|entry: LogEntry| entry.message).collect()
    }

    pub fn count_containing(logs: &LogSink, needle: &str) -> usize {
        logs.entries()
            .iter()
            .filter(|entry| entry.message.contains(needle))
            .count()
    }
}

/// Builder for orchestrators wired to mocks and a [`FakeLauncher`]
pub struct OrchestratorBuilder {
    settings: Settings,
    dns: Option<MockDnsProvider>,
    telemetry: Option<MockTelemetry>,
    store: Option<MockSettingsStore>,
    binary_installed: bool,
    reachability: Option<mpsc::Receiver<Reachability>>,
    ports: RangeInclusive<u16>,
    health_interval: Option<Duration>,
    launcher: FakeLauncher,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            dns: None,
            telemetry: None,
            store: None,
            binary_installed: true,
            reachability: None,
            ports: 8080..=8090,
            health_interval: None,
            launcher: FakeLauncher::new(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_dns(mut self, dns: MockDnsProvider) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn with_telemetry(mut self, telemetry: MockTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_store(mut self, store: MockSettingsStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_reachability(mut self, reachability: mpsc::Receiver<Reachability>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Candidate ports; the fake probe reports all of them free
    pub fn with_ports(mut self, ports: RangeInclusive<u16>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = Some(interval);
        self
    }

    pub fn without_binary(mut self) -> Self {
        self.binary_installed = false;
        self
    }

    pub fn launcher(&self) -> FakeLauncher {
        self.launcher.clone()
    }

    /// DNS mock answering with the fixture catalog, Cloudflare fastest
    pub fn default_dns() -> MockDnsProvider {
        let mut dns = MockDnsProvider::new();
        dns.expect_measure_all_latencies().returning(|| ()).times(0..);
        dns.expect_best_server()
            .returning(|| Some(TestFixtures::fastest_dns()))
            .times(0..);
        dns.expect_servers().returning(TestFixtures::dns_servers).times(0..);
        dns.expect_latencies().returning(HashMap::new).times(0..);
        dns
    }

    pub fn quiet_telemetry() -> MockTelemetry {
        let mut telemetry = MockTelemetry::new();
        telemetry.expect_send_event().returning(|_, _| ()).times(0..);
        telemetry
    }

    pub fn accepting_store() -> MockSettingsStore {
        let mut store = MockSettingsStore::new();
        store.expect_save().returning(|_| Ok(())).times(0..);
        store.expect_load().returning(|| Ok(Settings::default())).times(0..);
        store
    }

    pub fn build(self) -> (TempDir, TestOrchestrator, OrchestratorHandle) {
        let (dir, binary) = TestFixtures::installed_binary();
        let binary = if self.binary_installed {
            binary
        } else {
            TestFixtures::missing_binary()
        };

        let supervisor = TestHelpers::supervisor_with(
            self.launcher,
            binary,
            SupervisorConfig::default(),
            TestHelpers::port_allocator_for(self.ports, vec![]),
        );
        let (orchestrator, handle) = ConnectionOrchestrator::new(
            supervisor,
            self.dns.unwrap_or_else(Self::default_dns),
            self.telemetry.unwrap_or_else(Self::quiet_telemetry),
            self.store.unwrap_or_else(Self::accepting_store),
            self.settings,
            self.reachability,
            OrchestratorOptions {
                health_interval: self.health_interval,
            },
        );
        (dir, orchestrator, handle)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
