use crate::process::types::ResourceSample;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Source of resource-usage readings for the supervised process
pub trait ResourceSampler: Send {
    /// Read current memory and the processor time used since the previous reading
    ///
    /// Returns `None` when the process cannot be found.
    fn sample(&mut self, pid: u32) -> Option<ResourceSample>;

    /// Drop any per-process bookkeeping (call when the child is replaced)
    fn forget(&mut self, pid: u32);
}

/// Process monitor for collecting resource usage statistics
pub struct ProcessMonitor {
    /// System information collector
    system: System,
    /// When each pid was last sampled, for turning CPU percentage into time
    last_sampled: HashMap<u32, Instant>,
}

impl ProcessMonitor {
    /// Create a new process monitor
    pub fn new() -> Self {
        Self {
            system: System::new(),
            last_sampled: HashMap::new(),
        }
    }

    fn refresh(&mut self, sys_pid: Pid) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );
    }
}

impl ResourceSampler for ProcessMonitor {
    fn sample(&mut self, pid: u32) -> Option<ResourceSample> {
        let sys_pid = Pid::from_u32(pid);
        self.refresh(sys_pid);

        let Some(process) = self.system.process(sys_pid) else {
            // Process not found in system - it has exited
            self.last_sampled.remove(&pid);
            return None;
        };

        let now = Instant::now();
        // sysinfo reports CPU usage as a percentage of one core since the previous refresh
        let cpu_time = match self.last_sampled.insert(pid, now) {
            Some(previous) => {
                let elapsed = now.duration_since(previous).as_secs_f64();
                let fraction = f64::from(process.cpu_usage().max(0.0)) / 100.0;
                Duration::from_secs_f64(elapsed * fraction)
            }
            None => Duration::ZERO,
        };

        Some(ResourceSample {
            memory: process.memory(),
            cpu_time,
        })
    }

    fn forget(&mut self, pid: u32) {
        self.last_sampled.remove(&pid);
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}
