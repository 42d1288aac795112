//! Terminating leftover proxy processes by name

use shared::{Component, component_debug};
use sysinfo::System;

use crate::error::{VexarError, VexarResult};
use crate::traits::StrayProcessReaper;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemReaper;

impl SystemReaper {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StrayProcessReaper for SystemReaper {
    async fn terminate_strays(&self, binary_name: &str) -> VexarResult<usize> {
        let name = binary_name.to_string();
        tokio::task::spawn_blocking(move || reap_by_name(&name))
            .await
            .map_err(|e| VexarError::IoError(std::io::Error::other(e)))
    }
}

fn reap_by_name(name: &str) -> usize {
    let mut system = System::new();
    system.refresh_processes();

    let own_pid = std::process::id();
    let mut signalled = 0;
    for process in system.processes_by_exact_name(name) {
        let pid = process.pid().as_u32();
        if pid == own_pid {
            continue;
        }
        if send_terminate(process) {
            component_debug!(Component::Supervisor, "🔪 Sent SIGTERM to stray {} (pid {})", name, pid);
            signalled += 1;
        }
    }
    signalled
}

#[cfg(unix)]
fn send_terminate(process: &sysinfo::Process) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pid = process.pid().as_u32();
    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        // Exited between the scan and the signal
        Err(Errno::ESRCH) => false,
        Err(e) => {
            component_debug!(Component::Supervisor, "Could not signal pid {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(process: &sysinfo::Process) -> bool {
    process.kill()
}
