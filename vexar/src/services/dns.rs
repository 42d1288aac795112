//! DNS server catalog with TCP latency probing

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::join_all;
use shared::{Component, DnsServer, component_debug};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};

use crate::traits::DnsProvider;

/// Per-server ceiling for one latency probe
pub const DNS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const DNS_PORT: u16 = 53;

/// Public resolvers offered out of the box
pub fn default_servers() -> Vec<DnsServer> {
    vec![
        DnsServer::new("cloudflare", "Cloudflare", "1.1.1.1", "Fast, privacy-first resolver"),
        DnsServer::new("google", "Google", "8.8.8.8", "Google Public DNS"),
        DnsServer::new("quad9", "Quad9", "9.9.9.9", "Blocks known malicious domains"),
        DnsServer::new("adguard", "AdGuard", "94.140.14.14", "Blocks ads and trackers"),
        DnsServer::new("opendns", "OpenDNS", "208.67.222.222", "Cisco OpenDNS"),
    ]
}

pub struct DnsCatalog {
    servers: Vec<DnsServer>,
    latencies: Mutex<HashMap<String, u64>>,
    probe_timeout: Duration,
}

impl DnsCatalog {
    pub fn new(servers: Vec<DnsServer>) -> Self {
        Self {
            servers,
            latencies: Mutex::new(HashMap::new()),
            probe_timeout: DNS_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn record_latency(&self, server_id: &str, millis: u64) {
        self.lock().insert(server_id.to_string(), millis);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.latencies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DnsCatalog {
    fn default() -> Self {
        Self::new(default_servers())
    }
}

#[async_trait::async_trait]
impl DnsProvider for DnsCatalog {
    async fn measure_all_latencies(&self) {
        let probes = self.servers.iter().map(|server| async move {
            let latency = probe_latency(&server.address, self.probe_timeout).await;
            (server.id.clone(), latency)
        });
        let results = join_all(probes).await;

        let mut latencies = self.lock();
        latencies.clear();
        for (id, latency) in results {
            match latency {
                Some(millis) => {
                    latencies.insert(id, millis);
                }
                None => {
                    component_debug!(Component::Orchestrator, "DNS server {} unreachable", id);
                }
            }
        }
    }

    fn latencies(&self) -> HashMap<String, u64> {
        self.lock().clone()
    }

    fn best_server(&self) -> Option<DnsServer> {
        let latencies = self.lock();
        self.servers
            .iter()
            .filter_map(|server| latencies.get(&server.id).map(|millis| (*millis, server)))
            .min_by_key(|(millis, _)| *millis)
            .map(|(_, server)| server.clone())
    }

    fn servers(&self) -> Vec<DnsServer> {
        self.servers.clone()
    }
}

async fn probe_latency(address: &str, ceiling: Duration) -> Option<u64> {
    let started = Instant::now();
    match timeout(ceiling, TcpStream::connect((address, DNS_PORT))).await {
        Ok(Ok(_)) => Some(started.elapsed().as_millis() as u64),
        _ => None,
    }
}
