//! Connection orchestrator
//!
//! A single task owns the [`ProcessSupervisor`] and the connection flags and
//! processes user commands, reachability changes, supervisor events and
//! health ticks one at a time. Front ends talk to it through a cloneable
//! [`OrchestratorHandle`] and observe the connection through a watch channel.
//!
//! Because commands are handled serially, a disconnect issued while a connect
//! is still starting the proxy is applied as soon as that start resolves.

use std::collections::HashMap;
use std::time::Duration;

use shared::{
    Component, ConnectionProjection, Reachability, component_debug, component_info, component_warn,
    logging,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior, interval, timeout};

use crate::config::Settings;
use crate::core::{ConnectionState, LogSink, OrchestratorSnapshot};
use crate::error::{VexarError, VexarResult};
use crate::supervisor::{ProcessSupervisor, SupervisorEvent};
use crate::traits::{DnsProvider, ProxyLauncher, SettingsStore, StrayProcessReaper, Telemetry};

/// Default period of the proxy health check
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const COMMAND_BUFFER: usize = 32;

/// Analytics event sent on each not-connected to connected transition
pub const CONNECTION_SUCCESS_EVENT: &str = "connection_success";

#[derive(Debug)]
pub enum OrchestratorCommand {
    Connect { done: oneshot::Sender<()> },
    Disconnect { done: oneshot::Sender<()> },
    ClearLogs,
    Snapshot { reply: oneshot::Sender<OrchestratorSnapshot> },
    Shutdown { done: oneshot::Sender<()> },
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// `None` disables the proxy health check
    pub health_interval: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            health_interval: Some(HEALTH_CHECK_INTERVAL),
        }
    }
}

/// Cloneable front-end access to a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<OrchestratorCommand>,
    projection: watch::Receiver<ConnectionProjection>,
    logs: LogSink,
}

impl OrchestratorHandle {
    /// Request a connection; resolves once the attempt has been handled
    pub async fn connect(&self) -> VexarResult<()> {
        let (done, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Connect { done }).await?;
        rx.await.map_err(|_| VexarError::OrchestratorGone)
    }

    pub async fn disconnect(&self) -> VexarResult<()> {
        let (done, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Disconnect { done }).await?;
        rx.await.map_err(|_| VexarError::OrchestratorGone)
    }

    pub async fn clear_logs(&self) -> VexarResult<()> {
        self.send(OrchestratorCommand::ClearLogs).await
    }

    pub async fn snapshot(&self) -> VexarResult<OrchestratorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| VexarError::OrchestratorGone)
    }

    /// Stop the proxy (waiting briefly for it to exit) and end the orchestrator task
    pub async fn shutdown(&self) -> VexarResult<()> {
        let (done, rx) = oneshot::channel();
        self.send(OrchestratorCommand::Shutdown { done }).await?;
        rx.await.map_err(|_| VexarError::OrchestratorGone)
    }

    /// Current connected/connecting projection
    pub fn projection(&self) -> ConnectionProjection {
        *self.projection.borrow()
    }

    pub fn watch_projection(&self) -> watch::Receiver<ConnectionProjection> {
        self.projection.clone()
    }

    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    async fn send(&self, command: OrchestratorCommand) -> VexarResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VexarError::OrchestratorGone)
    }
}

pub struct ConnectionOrchestrator<L, R, D, T, S>
where
    L: ProxyLauncher,
    R: StrayProcessReaper,
    D: DnsProvider,
    T: Telemetry,
    S: SettingsStore,
{
    supervisor: ProcessSupervisor<L, R>,
    dns: D,
    telemetry: T,
    settings_store: S,
    settings: Settings,
    state: ConnectionState,
    logs: LogSink,
    projection_tx: watch::Sender<ConnectionProjection>,
    commands_rx: mpsc::Receiver<OrchestratorCommand>,
    reachability_rx: Option<mpsc::Receiver<Reachability>>,
    health_interval: Option<Duration>,
    proxy_healthy: bool,
}

impl<L, R, D, T, S> ConnectionOrchestrator<L, R, D, T, S>
where
    L: ProxyLauncher,
    R: StrayProcessReaper,
    D: DnsProvider,
    T: Telemetry,
    S: SettingsStore,
{
    /// Build the orchestrator and the handle used to drive it.
    ///
    /// # Parameters
    /// - `settings`: already-loaded settings; persisted back through `settings_store`
    /// - `reachability`: change stream from the network monitor, if any
    pub fn new(
        supervisor: ProcessSupervisor<L, R>,
        dns: D,
        telemetry: T,
        settings_store: S,
        settings: Settings,
        reachability: Option<mpsc::Receiver<Reachability>>,
        options: OrchestratorOptions,
    ) -> (Self, OrchestratorHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (projection_tx, projection_rx) = watch::channel(ConnectionProjection::default());
        let logs = supervisor.logs().for_component(Component::Orchestrator);

        let state = ConnectionState {
            user_initiated_disconnect: settings.user_initiated_disconnect,
            ..ConnectionState::default()
        };

        let orchestrator = Self {
            supervisor,
            dns,
            telemetry,
            settings_store,
            settings,
            state,
            logs: logs.clone(),
            projection_tx,
            commands_rx,
            reachability_rx: reachability,
            health_interval: options.health_interval,
            proxy_healthy: true,
        };
        let handle = OrchestratorHandle {
            commands: commands_tx,
            projection: projection_rx,
            logs,
        };
        (orchestrator, handle)
    }

    /// Run until a shutdown command arrives or every handle is dropped
    pub async fn run(mut self) {
        logging::log_startup(Component::Orchestrator, "connection orchestrator");

        let mut health = self.health_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            tokio::select! {
                command = self.commands_rx.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            self.shutdown().await;
                            false
                        }
                    };
                    if !keep_running {
                        break;
                    }
                },

                Some(event) = self.supervisor.next_event() => {
                    self.apply_supervisor_event(event).await;
                },

                Some(status) = next_reachability(&mut self.reachability_rx) => {
                    self.on_reachability(status).await;
                },

                _ = next_health_tick(&mut health) => {
                    self.check_proxy_health().await;
                },
            }
        }
    }

    /// Returns false once the orchestrator should stop
    async fn handle_command(&mut self, command: OrchestratorCommand) -> bool {
        match command {
            OrchestratorCommand::Connect { done } => {
                self.connect().await;
                let _ = done.send(());
            }
            OrchestratorCommand::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
            OrchestratorCommand::ClearLogs => self.logs.clear(),
            OrchestratorCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            OrchestratorCommand::Shutdown { done } => {
                self.shutdown().await;
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    /// Start the proxy unless a connection exists or is being established
    pub async fn connect(&mut self) {
        if self.state.is_connected || self.state.is_connecting {
            component_debug!(Component::Orchestrator, "Connect ignored, already {:?}", self.state.projection().status());
            return;
        }

        self.state.is_connecting = true;
        self.state.user_initiated_disconnect = false;
        self.persist_disconnect_intent();
        self.publish();

        let dns_address = self.resolve_dns().await;
        if let Err(e) = self.supervisor.start(dns_address).await {
            self.logs.append(format!("❌ Connection failed: {e}"));
        }

        self.mirror_supervisor();
        self.state.is_connecting = false;
        self.publish();
    }

    /// Stop the proxy and remember that the user asked for it
    pub fn disconnect(&mut self) {
        self.state.user_initiated_disconnect = true;
        self.persist_disconnect_intent();
        self.supervisor.stop();
        self.logs.append("🔌 Disconnected");
        self.sync_with_supervisor();
    }

    /// React to a reachability report; only transitions have an effect
    pub async fn on_reachability(&mut self, status: Reachability) {
        let available = status.is_available();
        if available == self.state.is_internet_available {
            return;
        }
        self.state.is_internet_available = available;

        if !available {
            self.logs.append("⚠️ Internet connection lost");
            return;
        }

        self.logs.append("🌐 Internet connection available");
        if self.should_auto_connect() {
            component_info!(Component::Orchestrator, "Auto-connecting");
            self.connect().await;
        }
    }

    /// Wait for the next event from the supervised process
    pub async fn next_supervisor_event(&mut self) -> Option<SupervisorEvent> {
        self.supervisor.next_event().await
    }

    /// Let the supervisor handle an event, then mirror its running flag
    pub async fn apply_supervisor_event(&mut self, event: SupervisorEvent) {
        self.supervisor.handle_event(event).await;
        self.sync_with_supervisor();
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<L, R> {
        &self.supervisor
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            projection: self.state.projection(),
            is_internet_available: self.state.is_internet_available,
            user_initiated_disconnect: self.state.user_initiated_disconnect,
            supervisor: self.supervisor.snapshot(),
        }
    }

    pub fn projection(&self) -> ConnectionProjection {
        self.state.projection()
    }

    async fn shutdown(&mut self) {
        logging::log_shutdown(Component::Orchestrator, "stopping proxy");
        self.supervisor.stop_blocking().await;
        self.sync_with_supervisor();
    }

    fn should_auto_connect(&self) -> bool {
        self.settings.auto_connect
            && !self.state.is_connected
            && !self.state.is_connecting
            && !self.state.user_initiated_disconnect
    }

    async fn resolve_dns(&self) -> Option<String> {
        if self.settings.auto_dns {
            self.dns.measure_all_latencies().await;
            let best = self.dns.best_server();
            if let Some(server) = &best {
                component_debug!(Component::Orchestrator, "Using fastest DNS server {} ({})", server.name, server.address);
            }
            return best.map(|server| server.address);
        }

        let selected = self.settings.selected_dns_server.as_deref()?;
        let server = self.dns.servers().into_iter().find(|server| server.id == selected);
        if server.is_none() {
            component_warn!(Component::Orchestrator, "Selected DNS server '{}' is not in the catalog", selected);
        }
        server.map(|server| server.address)
    }

    /// Copy the supervisor's running flag into the connection state
    fn mirror_supervisor(&mut self) {
        let running = self.supervisor.is_running();
        let was_connected = self.state.is_connected;
        self.state.is_connected = running;
        if !running {
            self.state.is_connecting = false;
        }
        if running && !was_connected {
            self.report_connection_success();
        }
    }

    fn sync_with_supervisor(&mut self) {
        self.mirror_supervisor();
        self.publish();
    }

    fn publish(&self) {
        self.projection_tx.send_if_modified(|current| {
            let next = self.state.projection();
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn report_connection_success(&self) {
        let mut parameters = HashMap::new();
        if let Some(port) = self.supervisor.current_port() {
            parameters.insert("port".to_string(), port.to_string());
        }
        parameters.insert("auto_dns".to_string(), self.settings.auto_dns.to_string());
        self.telemetry.send_event(CONNECTION_SUCCESS_EVENT, parameters);
    }

    fn persist_disconnect_intent(&mut self) {
        self.settings.user_initiated_disconnect = self.state.user_initiated_disconnect;
        if let Err(e) = self.settings_store.save(&self.settings) {
            component_warn!(Component::Orchestrator, "Could not persist settings: {}", e);
        }
    }

    async fn check_proxy_health(&mut self) {
        let Some(address) = self.supervisor.listening_address() else {
            self.proxy_healthy = true;
            return;
        };

        let healthy = matches!(timeout(HEALTH_PROBE_TIMEOUT, TcpStream::connect(address)).await, Ok(Ok(_)));
        if healthy == self.proxy_healthy {
            return;
        }
        self.proxy_healthy = healthy;

        if healthy {
            self.logs
                .append(format!("Proxy on port {} is accepting connections again", address.port()));
        } else {
            self.logs
                .append(format!("⚠️ Proxy on port {} is not accepting connections", address.port()));
        }
    }
}

async fn next_reachability(rx: &mut Option<mpsc::Receiver<Reachability>>) -> Option<Reachability> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

async fn next_health_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
