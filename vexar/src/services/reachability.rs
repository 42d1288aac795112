//! Internet reachability monitor
//!
//! Periodically opens a TCP connection to well-known anycast endpoints and
//! emits a [`Reachability`] value whenever the answer changes.

use std::net::SocketAddr;
use std::time::Duration;

use shared::{Component, Reachability, component_debug};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, timeout};

pub const REACHABILITY_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const REACHABILITY_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TcpReachabilityMonitor {
    targets: Vec<SocketAddr>,
    poll_interval: Duration,
    probe_timeout: Duration,
}

impl TcpReachabilityMonitor {
    pub fn new() -> Self {
        Self::with_targets(vec![
            SocketAddr::from(([1, 1, 1, 1], 443)),
            SocketAddr::from(([8, 8, 8, 8], 443)),
        ])
    }

    pub fn with_targets(targets: Vec<SocketAddr>) -> Self {
        Self {
            targets,
            poll_interval: REACHABILITY_POLL_INTERVAL,
            probe_timeout: REACHABILITY_PROBE_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start polling. The first result is always sent; later ones only on change.
    /// Polling stops once the receiver is dropped.
    pub fn spawn(self) -> mpsc::Receiver<Reachability> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = None;

            loop {
                ticker.tick().await;
                let status = self.probe().await;
                if last == Some(status) {
                    continue;
                }
                last = Some(status);
                component_debug!(Component::Orchestrator, "Reachability changed: {:?}", status);
                if tx.send(status).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    pub async fn probe(&self) -> Reachability {
        for target in &self.targets {
            if let Ok(Ok(_)) = timeout(self.probe_timeout, TcpStream::connect(target)).await {
                return Reachability::Satisfied;
            }
        }
        Reachability::Unsatisfied
    }
}

impl Default for TcpReachabilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
