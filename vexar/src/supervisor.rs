//! Proxy process supervisor
//!
//! Owns at most one proxy process at a time. Output pumps, exit watchers and
//! timers run as small tasks that only ever send a [`SupervisorEvent`] back
//! to the supervisor's own channel; all state changes happen on whichever
//! task drives [`ProcessSupervisor::next_event`] and
//! [`ProcessSupervisor::handle_event`]. Events carry the generation of the
//! process they belong to, so anything arriving from a replaced process is
//! recognised as stale.

use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;

use shared::{Component, OutputStream, component_debug, component_info, component_warn};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::core::{
    BINARY_NAME, BinaryLocator, CRASH_DECAY, CrashTracker, CrashVerdict, DEFAULT_PORT_RANGE, LogSink,
    MAX_CRASH_COUNT, PortAllocator, SupervisorPhase, SupervisorSnapshot, SupervisorState,
};
use crate::error::SupervisorError;
use crate::traits::{LaunchSpec, OutputReader, ProxyLauncher, ProxyProcess, StrayProcessReaper};

/// Settle time after signalling strays before probing ports
pub const STRAY_CLEANUP_DELAY: Duration = Duration::from_millis(500);

/// Delay between an unexpected exit and the restart attempt
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Uptime after which the crash counter is cleared
pub const STABILITY_WINDOW: Duration = Duration::from_secs(5);

/// Upper bound on how long `stop_blocking` waits for the process to exit
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest read from one output pipe
const OUTPUT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary_name: String,
    /// Forwarded to the proxy as `--log-level`
    pub log_level: String,
    /// Pass `--system-proxy` so the proxy installs itself as the system proxy
    pub system_proxy: bool,
    pub port_range: RangeInclusive<u16>,
    pub stray_cleanup_delay: Duration,
    pub restart_delay: Duration,
    pub stability_window: Duration,
    pub crash_decay: Duration,
    pub stop_timeout: Duration,
    pub max_crash_count: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            binary_name: BINARY_NAME.to_string(),
            log_level: "info".to_string(),
            system_proxy: true,
            port_range: DEFAULT_PORT_RANGE,
            stray_cleanup_delay: STRAY_CLEANUP_DELAY,
            restart_delay: RESTART_DELAY,
            stability_window: STABILITY_WINDOW,
            crash_decay: CRASH_DECAY,
            stop_timeout: STOP_TIMEOUT,
            max_crash_count: MAX_CRASH_COUNT,
        }
    }
}

impl SupervisorConfig {
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range = range;
        self
    }
}

/// Something that happened to (or on behalf of) a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Output {
        generation: u64,
        stream: OutputStream,
        line: String,
    },
    Exited {
        generation: u64,
        code: i32,
    },
    StabilityElapsed {
        generation: u64,
    },
    /// Restart delay after the crash of process `generation` has passed
    RestartDue {
        generation: u64,
    },
}

struct ProcessHandle {
    generation: u64,
    pid: Option<u32>,
    terminate: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    fn request_termination(&mut self) {
        if let Some(terminate) = self.terminate.take() {
            // The waiter may already have observed the exit
            let _ = terminate.send(());
        }
    }
}

pub struct ProcessSupervisor<L, R>
where
    L: ProxyLauncher,
    R: StrayProcessReaper,
{
    launcher: L,
    reaper: R,
    locator: BinaryLocator,
    ports: PortAllocator,
    config: SupervisorConfig,
    state: SupervisorState,
    handle: Option<ProcessHandle>,
    logs: LogSink,
    /// DNS address of the last `start`, reused by automatic restarts
    dns_address: Option<String>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
}

impl<L, R> ProcessSupervisor<L, R>
where
    L: ProxyLauncher,
    R: StrayProcessReaper,
{
    pub fn new(
        launcher: L,
        reaper: R,
        locator: BinaryLocator,
        config: SupervisorConfig,
        logs: LogSink,
    ) -> Self {
        let ports = PortAllocator::new(config.port_range.clone());
        Self::with_port_allocator(launcher, reaper, locator, ports, config, logs)
    }

    pub fn with_port_allocator(
        launcher: L,
        reaper: R,
        locator: BinaryLocator,
        ports: PortAllocator,
        config: SupervisorConfig,
        logs: LogSink,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let crash = CrashTracker::new(config.max_crash_count, config.crash_decay);
        Self {
            launcher,
            reaper,
            locator,
            ports,
            config,
            state: SupervisorState::new(crash),
            handle: None,
            logs,
            dns_address: None,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    /// Start the proxy, replacing any process this supervisor already owns.
    ///
    /// Failures are returned to the caller and not logged here.
    ///
    /// # Returns
    /// The port the proxy was told to listen on
    pub async fn start(&mut self, dns_address: Option<String>) -> Result<u16, SupervisorError> {
        self.state.user_initiated_stop = false;
        self.state.phase = SupervisorPhase::Starting;
        self.dns_address = dns_address;

        if let Some(mut previous) = self.handle.take() {
            component_debug!(Component::Supervisor, "Replacing running proxy (pid {:?})", previous.pid);
            previous.request_termination();
            self.state.is_running = false;
        }

        self.ensure_exclusive_instance().await;
        tokio::time::sleep(self.config.stray_cleanup_delay).await;

        match self.launch() {
            Ok(port) => Ok(port),
            Err(err) => {
                self.state.mark_not_running(SupervisorPhase::Stopped);
                Err(err)
            }
        }
    }

    /// Terminate the process without waiting for it to exit
    pub fn stop(&mut self) {
        self.state.user_initiated_stop = true;
        if let Some(mut handle) = self.handle.take() {
            component_info!(Component::Supervisor, "🛑 Stopping proxy (pid {:?})", handle.pid);
            handle.request_termination();
        }
        self.settle_after_stop();
    }

    /// Terminate the process and wait up to the stop timeout for it to exit.
    ///
    /// Meant for application shutdown. Output that arrives while waiting is
    /// still logged; pending timers are discarded.
    pub async fn stop_blocking(&mut self) {
        self.state.user_initiated_stop = true;
        let Some(mut handle) = self.handle.take() else {
            self.settle_after_stop();
            return;
        };

        let generation = handle.generation;
        handle.request_termination();
        self.settle_after_stop();

        let ceiling = self.config.stop_timeout;
        match tokio::time::timeout(ceiling, self.wait_for_exit(generation)).await {
            Ok(Some(code)) => {
                component_debug!(Component::Supervisor, "Proxy exited with code {} during shutdown", code);
            }
            Ok(None) => {}
            Err(_) => {
                component_warn!(
                    Component::Supervisor,
                    "⚠️ Proxy did not exit within {:?}, abandoning it",
                    ceiling
                );
            }
        }
    }

    /// Wait for the next event from the current or a previous process
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.events_rx.recv().await
    }

    pub async fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Output { stream, line, .. } => {
                self.logs.append_output(stream, line);
            }
            SupervisorEvent::Exited { generation, code } => self.handle_termination(generation, code),
            SupervisorEvent::StabilityElapsed { generation } => {
                if self.is_current(generation) && self.state.crash.count() > 0 {
                    component_debug!(Component::Supervisor, "Proxy stable, clearing crash count");
                    self.state.crash.reset();
                }
            }
            SupervisorEvent::RestartDue { generation } => self.restart(generation).await,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn current_port(&self) -> Option<u16> {
        self.state.current_port
    }

    pub fn crash_count(&self) -> u32 {
        self.state.crash.count()
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.state.phase
    }

    /// Loopback address the proxy should be accepting connections on
    pub fn listening_address(&self) -> Option<SocketAddr> {
        self.state
            .current_port
            .filter(|_| self.state.is_running)
            .map(|port| SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot::capture(&self.state, self.handle.as_ref().and_then(|h| h.pid))
    }

    /// Arguments passed to the proxy binary
    pub fn launch_arguments(&self, port: u16) -> Vec<String> {
        let mut args = vec![
            "--listen-port".to_string(),
            port.to_string(),
            "--log-level".to_string(),
            self.config.log_level.clone(),
        ];
        if self.config.system_proxy {
            args.push("--system-proxy".to_string());
        }
        if let Some(dns) = &self.dns_address {
            args.push("--dns-addr".to_string());
            args.push(dns.clone());
        }
        args
    }

    async fn ensure_exclusive_instance(&self) {
        match self.reaper.terminate_strays(&self.config.binary_name).await {
            Ok(0) => {}
            Ok(count) => {
                component_info!(
                    Component::Supervisor,
                    "🧹 Signalled {} stray {} process(es)",
                    count,
                    self.config.binary_name
                );
            }
            Err(e) => {
                component_warn!(Component::Supervisor, "Stray process cleanup failed: {}", e);
            }
        }
    }

    fn launch(&mut self) -> Result<u16, SupervisorError> {
        let program = self.locator.find_binary().ok_or(SupervisorError::BinaryNotFound)?;
        let port = self.ports.find_available_port()?;
        let spec = LaunchSpec {
            program,
            args: self.launch_arguments(port),
        };

        component_debug!(Component::Supervisor, "Launching {:?} {:?}", spec.program, spec.args);
        let process = self
            .launcher
            .launch(&spec)
            .map_err(|e| SupervisorError::StartFailed { reason: e.to_string() })?;

        self.adopt(process, port);
        Ok(port)
    }

    fn adopt(&mut self, process: ProxyProcess, port: u16) {
        self.generation += 1;
        let generation = self.generation;
        let ProxyProcess {
            pid,
            stdout,
            stderr,
            exit,
            terminate,
        } = process;

        if let Some(reader) = stdout {
            self.spawn_output_pump(generation, OutputStream::Stdout, reader);
        }
        if let Some(reader) = stderr {
            self.spawn_output_pump(generation, OutputStream::Stderr, reader);
        }
        self.spawn_exit_watch(generation, exit);

        self.handle = Some(ProcessHandle {
            generation,
            pid,
            terminate: Some(terminate),
        });
        self.state.is_running = true;
        self.state.current_port = Some(port);
        self.state.phase = SupervisorPhase::Running;

        self.logs
            .append(format!("✅ Started {} on port {}", self.config.binary_name, port));
        self.schedule(
            self.config.stability_window,
            SupervisorEvent::StabilityElapsed { generation },
        );
    }

    fn handle_termination(&mut self, generation: u64, code: i32) {
        self.logs
            .append(format!("🔴 Process terminated (Exit code: {code})"));

        if !self.is_current(generation) {
            // Already stopped or replaced
            return;
        }
        self.handle = None;

        if self.state.user_initiated_stop || code == 0 {
            self.state.mark_not_running(SupervisorPhase::Stopped);
            return;
        }

        self.state.mark_not_running(SupervisorPhase::Crashed);
        match self.state.crash.record_crash(Instant::now()) {
            CrashVerdict::Restart { attempt } => {
                self.logs.append(format!(
                    "⚠️ Unexpected termination. Attempting restart ({}/{})...",
                    attempt,
                    self.state.crash.max_count()
                ));
                self.schedule(self.config.restart_delay, SupervisorEvent::RestartDue { generation });
            }
            CrashVerdict::GiveUp => {
                self.logs
                    .append("❌ Maximum restart attempts reached. Please check logs.");
                self.state.phase = SupervisorPhase::Stopped;
            }
        }
    }

    /// Restart after the crash of process `crashed`, unless the user stopped
    /// the supervisor or a newer process has been adopted since
    async fn restart(&mut self, crashed: u64) {
        if self.state.user_initiated_stop || self.handle.is_some() || crashed != self.generation {
            component_debug!(Component::Supervisor, "Skipping scheduled restart");
            return;
        }

        let dns_address = self.dns_address.clone();
        if let Err(e) = self.start(dns_address).await {
            self.logs.append(format!("❌ Restart failed: {e}"));
        }
    }

    async fn wait_for_exit(&mut self, generation: u64) -> Option<i32> {
        while let Some(event) = self.events_rx.recv().await {
            match event {
                SupervisorEvent::Exited { generation: exited, code } => {
                    self.logs
                        .append(format!("🔴 Process terminated (Exit code: {code})"));
                    if exited == generation {
                        return Some(code);
                    }
                }
                SupervisorEvent::Output { stream, line, .. } => {
                    self.logs.append_output(stream, line);
                }
                SupervisorEvent::StabilityElapsed { .. } | SupervisorEvent::RestartDue { .. } => {}
            }
        }
        None
    }

    fn settle_after_stop(&mut self) {
        let phase = match self.state.phase {
            SupervisorPhase::Idle => SupervisorPhase::Idle,
            _ => SupervisorPhase::Stopped,
        };
        self.state.mark_not_running(phase);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handle.as_ref().map(|h| h.generation) == Some(generation)
    }

    /// Forward output as it arrives. Each chunk is split on line boundaries;
    /// a chunk without a trailing newline is logged as it stands.
    fn spawn_output_pump(&self, generation: u64, stream: OutputStream, mut reader: OutputReader) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let mut chunk = vec![0u8; OUTPUT_CHUNK_SIZE];
            let mut pending = Vec::new();
            loop {
                let read = match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(read) => read,
                    Err(e) => {
                        component_debug!(Component::Supervisor, "{:?} pump closed: {}", stream, e);
                        break;
                    }
                };
                pending.extend_from_slice(&chunk[..read]);
                let text = take_decoded(&mut pending);
                for line in output_lines(&text) {
                    let event = SupervisorEvent::Output {
                        generation,
                        stream,
                        line: line.to_string(),
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
        });
    }

    fn spawn_exit_watch(&self, generation: u64, exit: oneshot::Receiver<i32>) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            // A launcher that drops the sender has lost track of the child
            let code = exit.await.unwrap_or(-1);
            let _ = events.send(SupervisorEvent::Exited { generation, code });
        });
    }

    fn schedule(&self, delay: Duration, event: SupervisorEvent) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        });
    }
}

/// Decode `bytes`, leaving a multi-byte character cut off by the chunk
/// boundary behind for the next read
fn take_decoded(bytes: &mut Vec<u8>) -> String {
    let complete = match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => bytes.len(),
    };
    let incomplete = bytes.split_off(complete);
    let text = String::from_utf8_lossy(bytes).into_owned();
    *bytes = incomplete;
    text
}

/// Non-empty lines of one output chunk
fn output_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
}
