use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Point-in-time responsiveness check for a running process
#[async_trait]
pub trait Probe: Send + Sync {
    /// Answer whether `pid` is responsive, giving up after `timeout`
    async fn probe(&self, pid: u32, timeout: Duration) -> bool;
}

/// Run `probe` with a hard deadline
///
/// Whatever the adapter does, the answer arrives within `timeout`; a probe
/// that overruns counts as unresponsive.
pub async fn bounded_probe(probe: &dyn Probe, pid: u32, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, probe.probe(pid, timeout)).await {
        Ok(responsive) => responsive,
        Err(_) => {
            tracing::debug!("Probe of process {} exceeded {:?}", pid, timeout);
            false
        }
    }
}

/// Probe backed by the OS scheduler state of the process
///
/// A process is responsive while it exists and is neither stopped, traced,
/// nor a zombie.
#[derive(Debug, Default, Clone)]
pub struct StatusProbe;

impl StatusProbe {
    pub fn new() -> Self {
        Self
    }

    fn check(pid: u32) -> bool {
        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );

        match system.process(sys_pid) {
            Some(process) => is_responsive_status(process.status()),
            None => false,
        }
    }
}

fn is_responsive_status(status: ProcessStatus) -> bool {
    !matches!(
        status,
        ProcessStatus::Zombie | ProcessStatus::Stop | ProcessStatus::Tracing | ProcessStatus::Dead
    )
}

#[async_trait]
impl Probe for StatusProbe {
    async fn probe(&self, pid: u32, _timeout: Duration) -> bool {
        match tokio::task::spawn_blocking(move || Self::check(pid)).await {
            Ok(responsive) => responsive,
            Err(e) => {
                tracing::warn!("Status probe for process {} failed: {}", pid, e);
                false
            }
        }
    }
}
