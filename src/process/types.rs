use std::time::{Duration, SystemTime};

/// Identifies one launch of the supervised executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Phase of the restart state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Launching,
    Running,
    Terminating,
    Relaunching,
    Failed,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Idle => write!(f, "idle"),
            SupervisorState::Launching => write!(f, "launching"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Terminating => write!(f, "terminating"),
            SupervisorState::Relaunching => write!(f, "relaunching"),
            SupervisorState::Failed => write!(f, "failed"),
        }
    }
}

/// The currently supervised OS process
#[derive(Debug, Clone)]
pub struct ChildProcess {
    pub generation: Generation,
    pub pid: u32,
    pub name: String,
    pub started_at: SystemTime,
    /// Set only once the process has terminated
    pub exit_code: Option<i32>,
}

impl ChildProcess {
    pub fn new(generation: Generation, pid: u32, name: String) -> Self {
        Self {
            generation,
            pid,
            name,
            started_at: SystemTime::now(),
            exit_code: None,
        }
    }

    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Debounce flag for liveness probing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessState {
    pub unresponsive: bool,
}

/// Outcome of feeding one probe result into [`LivenessState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    Responsive,
    /// First failed probe; tolerated once
    Suspect,
    /// Second consecutive failed probe
    Hung,
}

impl LivenessState {
    pub fn record_probe(&mut self, responsive: bool) -> LivenessVerdict {
        if responsive {
            self.unresponsive = false;
            LivenessVerdict::Responsive
        } else if self.unresponsive {
            LivenessVerdict::Hung
        } else {
            self.unresponsive = true;
            LivenessVerdict::Suspect
        }
    }

    pub fn clear(&mut self) {
        self.unresponsive = false;
    }
}

/// One resource-usage reading for a process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    /// Resident memory in bytes
    pub memory: u64,
    /// Processor time consumed since the previous reading
    pub cpu_time: Duration,
}

/// Statistics accumulated over the life of one child
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStatistics {
    pub peak_memory: u64,
    pub cpu_time: Duration,
    pub samples: u64,
}

impl RunningStatistics {
    pub fn record(&mut self, sample: ResourceSample) {
        self.peak_memory = self.peak_memory.max(sample.memory);
        self.cpu_time += sample.cpu_time;
        self.samples += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ordering() {
        let first = Generation::new(1);
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.as_u64(), 2);
        assert_eq!(second.to_string(), "#2");
    }

    #[test]
    fn test_liveness_debounce() {
        let mut liveness = LivenessState::default();

        assert_eq!(liveness.record_probe(false), LivenessVerdict::Suspect);
        assert!(liveness.unresponsive);
        assert_eq!(liveness.record_probe(true), LivenessVerdict::Responsive);
        assert!(!liveness.unresponsive);

        assert_eq!(liveness.record_probe(false), LivenessVerdict::Suspect);
        assert_eq!(liveness.record_probe(false), LivenessVerdict::Hung);
    }

    #[test]
    fn test_statistics_are_monotonic() {
        let mut stats = RunningStatistics::default();

        stats.record(ResourceSample {
            memory: 4096,
            cpu_time: Duration::from_millis(20),
        });
        stats.record(ResourceSample {
            memory: 1024,
            cpu_time: Duration::from_millis(5),
        });

        assert_eq!(stats.peak_memory, 4096);
        assert_eq!(stats.cpu_time, Duration::from_millis(25));
        assert_eq!(stats.samples, 2);

        stats.reset();
        assert_eq!(stats, RunningStatistics::default());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SupervisorState::Running.to_string(), "running");
        assert_eq!(SupervisorState::Failed.to_string(), "failed");
    }
}
