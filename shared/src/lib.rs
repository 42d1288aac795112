//! Shared types for the Vexar proxy supervisor
//!
//! Contains the values exchanged between the supervisor, the connection
//! orchestrator and whatever front end observes them, plus the common
//! logging setup.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
