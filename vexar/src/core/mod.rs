//! Core supervisor building blocks
//!
//! Port selection, binary lookup, crash bookkeeping, the log sink and the
//! state types. Nothing here spawns processes or owns a task.

pub mod binary_locator;
pub mod log_sink;
pub mod port_allocator;
pub mod recovery;
pub mod state;

pub use binary_locator::{BINARY_NAME, BinaryLocator};
pub use log_sink::{LOG_CAPACITY, LOG_RETAINED, LogSink};
pub use port_allocator::{DEFAULT_PORT_RANGE, PortAllocator, TcpBindProbe};
pub use recovery::{CRASH_DECAY, CrashTracker, CrashVerdict, MAX_CRASH_COUNT};
pub use state::{ConnectionState, OrchestratorSnapshot, SupervisorPhase, SupervisorSnapshot, SupervisorState};
