// Process module - Supervision of the child executable

pub mod events;
pub mod monitor;
pub mod probe;
pub mod report;
pub mod spawner;
pub mod supervisor;
pub mod timer;
pub mod types;

pub use events::{ChildNotifier, SupervisorEvent};
pub use monitor::{ProcessMonitor, ResourceSampler};
pub use probe::{bounded_probe, Probe, StatusProbe};
pub use report::Reporter;
pub use spawner::{resolve_executable, Launcher, OsLauncher, SpawnedChild};
pub use supervisor::Supervisor;
pub use timer::{ArmedTimers, TimerService};
pub use types::{
    ChildProcess, Generation, LivenessState, ResourceSample, RunningStatistics, SupervisorState,
};
