//! Common test utilities and infrastructure
//!
//! Fixtures, a scriptable fake proxy launcher, and builders for supervisors
//! and orchestrators wired to mocks.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{FakeLauncher, FakeProcess, OrchestratorBuilder, TestHelpers, TestOrchestrator, TestSupervisor};
