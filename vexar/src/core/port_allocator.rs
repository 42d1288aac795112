//! First-fit listening port selection
//!
//! The probe binds and immediately releases the socket, so another process can
//! take the port between the check and the proxy's own bind. That race is not
//! closed here; a proxy that fails to bind exits and goes through crash recovery.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use crate::error::SupervisorError;
use crate::traits::PortProbe;

/// Ports tried in order when nothing else is configured
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 8080..=8090;

/// Binds `0.0.0.0:<port>` and drops the listener straight away
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpBindProbe;

impl PortProbe for TcpBindProbe {
    fn is_available(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

pub struct PortAllocator {
    candidates: RangeInclusive<u16>,
    probe: Box<dyn PortProbe>,
}

impl PortAllocator {
    pub fn new(candidates: RangeInclusive<u16>) -> Self {
        Self::with_probe(candidates, TcpBindProbe)
    }

    pub fn with_probe(candidates: RangeInclusive<u16>, probe: impl PortProbe + 'static) -> Self {
        Self {
            candidates,
            probe: Box::new(probe),
        }
    }

    /// Return the first candidate that can be bound right now
    pub fn find_available_port(&self) -> Result<u16, SupervisorError> {
        self.candidates
            .clone()
            .find(|&port| self.probe.is_available(port))
            .ok_or(SupervisorError::NoPortsAvailable)
    }

    pub fn candidates(&self) -> &RangeInclusive<u16> {
        &self.candidates
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_RANGE)
    }
}
