//! Spawning the proxy with tokio::process
//!
//! Each launched child gets a waiter task that owns the `Child`. The waiter
//! reports the exit code once and turns a termination request into SIGTERM.

use std::process::{ExitStatus, Stdio};

use shared::{Component, component_debug, component_warn};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::traits::{LaunchSpec, OutputReader, ProxyLauncher, ProxyProcess};

/// Exit code reported when the child's status could not be collected
const UNKNOWN_EXIT_CODE: i32 = -1;

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProxyLauncher;

impl TokioProxyLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProxyLauncher for TokioProxyLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ProxyProcess> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let stdout = child.stdout.take().map(|pipe| Box::new(pipe) as OutputReader);
        let stderr = child.stderr.take().map(|pipe| Box::new(pipe) as OutputReader);

        let (exit_tx, exit_rx) = oneshot::channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        tokio::spawn(watch_child(child, terminate_rx, exit_tx));

        component_debug!(Component::Supervisor, "Spawned {:?} with pid {:?}", spec.program, pid);
        Ok(ProxyProcess {
            pid,
            stdout,
            stderr,
            exit: exit_rx,
            terminate: terminate_tx,
        })
    }
}

async fn watch_child(mut child: Child, terminate: oneshot::Receiver<()>, exit: oneshot::Sender<i32>) {
    let status = tokio::select! {
        status = child.wait() => status,
        // A dropped sender counts as a termination request too
        _ = terminate => {
            request_graceful_exit(&mut child);
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            component_warn!(Component::Supervisor, "Failed to collect proxy exit status: {}", e);
            UNKNOWN_EXIT_CODE
        }
    };
    let _ = exit.send(code);
}

#[cfg(unix)]
fn request_graceful_exit(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    // None means the child was already reaped
    let Some(pid) = child.id() else { return };
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        component_debug!(Component::Supervisor, "SIGTERM to {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        component_debug!(Component::Supervisor, "Kill request failed: {}", e);
    }
}

/// Exit code, or the signal number for a signal-terminated process
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return signal;
        }
    }
    UNKNOWN_EXIT_CODE
}
