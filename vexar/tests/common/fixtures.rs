//! Test fixtures and data for supervisor and orchestrator tests

use std::path::PathBuf;

use shared::DnsServer;
use tempfile::TempDir;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const FIRST_PORT: u16 = 8080;

    /// What a proxy exits with when asked to stop
    pub const SIGTERM_EXIT_CODE: i32 = 15;
    pub const CRASH_EXIT_CODE: i32 = 2;

    pub const FASTEST_DNS_ADDRESS: &'static str = "1.1.1.1";
    pub const SELECTED_DNS_ID: &'static str = "quad9";
    pub const SELECTED_DNS_ADDRESS: &'static str = "9.9.9.9";

    /// Temporary directory holding an empty file named like the proxy
    pub fn installed_binary() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("spoofdpi");
        std::fs::write(&binary, b"").unwrap();
        (dir, binary)
    }

    pub fn missing_binary() -> PathBuf {
        PathBuf::from("/nonexistent/vexar-tests/spoofdpi")
    }

    pub fn dns_servers() -> Vec<DnsServer> {
        vec![
            DnsServer::new("cloudflare", "Cloudflare", Self::FASTEST_DNS_ADDRESS, "fast"),
            DnsServer::new("google", "Google", "8.8.8.8", "popular"),
            DnsServer::new(Self::SELECTED_DNS_ID, "Quad9", Self::SELECTED_DNS_ADDRESS, "filtering"),
        ]
    }

    pub fn fastest_dns() -> DnsServer {
        Self::dns_servers().remove(0)
    }
}
