use crate::config::SupervisionConfig;
use crate::error::{Result, WatchdogError};
use crate::logs::{LogSink, Severity};
use crate::process::events::{ChildNotifier, SupervisorEvent};
use crate::process::monitor::ResourceSampler;
use crate::process::probe::{bounded_probe, Probe};
use crate::process::report::Reporter;
use crate::process::spawner::Launcher;
use crate::process::timer::{ArmedTimers, TimerService};
use crate::process::types::{
    ChildProcess, Generation, LivenessState, LivenessVerdict, RunningStatistics, SupervisorState,
};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Capacity of the supervisor's event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Keeps one child executable alive
///
/// All state lives here and is only touched from the event loop in
/// [`Supervisor::run`]; timers, exit notifications and error-stream lines
/// reach it as [`SupervisorEvent`]s tagged with the generation they belong to.
pub struct Supervisor {
    config: SupervisionConfig,
    launcher: Box<dyn Launcher>,
    probe: Box<dyn Probe>,
    sampler: Box<dyn ResourceSampler>,
    sink: Box<dyn LogSink>,
    reporter: Reporter,
    timer_service: TimerService,
    state: SupervisorState,
    current: Option<ChildProcess>,
    liveness: LivenessState,
    stats: RunningStatistics,
    /// Last generation handed to the launcher
    generation: Generation,
    timers: Option<ArmedTimers>,
    launch_count: u64,
    events_tx: mpsc::Sender<SupervisorEvent>,
    events_rx: mpsc::Receiver<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        config: SupervisionConfig,
        launcher: Box<dyn Launcher>,
        probe: Box<dyn Probe>,
        sampler: Box<dyn ResourceSampler>,
        sink: Box<dyn LogSink>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let timer_service = TimerService::new(config.update_interval(), config.info_interval());

        Self {
            config,
            launcher,
            probe,
            sampler,
            sink,
            reporter: Reporter::for_local_host(),
            timer_service,
            state: SupervisorState::Idle,
            current: None,
            liveness: LivenessState::default(),
            stats: RunningStatistics::default(),
            generation: Generation::new(0),
            timers: None,
            launch_count: 0,
            events_tx,
            events_rx,
        }
    }

    /// Replace the reporter (and with it the host name shown in reports)
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Launch the child and supervise it until `shutdown` resolves
    ///
    /// Only a failed launch ends supervision early; that error is returned.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.shutdown().await;
                    return Ok(());
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await?;
                }
            }
        }
    }

    /// Idle → Launching → Running, or Failed when the executable cannot be started
    pub async fn start(&mut self) -> Result<()> {
        self.launch().await
    }

    /// Apply one event to the state machine
    ///
    /// Events produced for an earlier generation are discarded.
    pub async fn handle_event(&mut self, event: SupervisorEvent) -> Result<()> {
        if let Some(ref timers) = self.timers {
            timers.acknowledge(&event);
        }

        if !self.is_current(event.generation()) {
            debug!("Discarding stale event {:?}", event);
            return Ok(());
        }

        match event {
            SupervisorEvent::UpdateTick { .. } => {
                self.on_update_tick().await?;
            }
            SupervisorEvent::InfoTick { .. } => self.on_info_tick(),
            SupervisorEvent::Exited { exit_code, .. } => {
                self.on_terminated(exit_code).await?;
            }
            SupervisorEvent::ErrorOutput { line, .. } => self.on_error_output(&line),
        }

        Ok(())
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn current(&self) -> Option<&ChildProcess> {
        self.current.as_ref()
    }

    pub fn statistics(&self) -> &RunningStatistics {
        &self.stats
    }

    pub fn liveness(&self) -> LivenessState {
        self.liveness
    }

    /// Number of successful launches since the watchdog started
    pub fn launch_count(&self) -> u64 {
        self.launch_count
    }

    pub fn timers_armed(&self) -> bool {
        self.timers.is_some()
    }

    pub fn config(&self) -> &SupervisionConfig {
        &self.config
    }

    /// Statistics report for the running child, if there is one
    pub fn snapshot(&self) -> Option<String> {
        match (self.state, &self.current) {
            (SupervisorState::Running, Some(child)) => {
                Some(self.reporter.snapshot(child, &self.stats))
            }
            _ => None,
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.current
            .as_ref()
            .map(|child| child.generation == generation)
            .unwrap_or(false)
    }

    async fn launch(&mut self) -> Result<()> {
        self.state = SupervisorState::Launching;
        self.generation = self.generation.next();
        let generation = self.generation;

        let notifier = ChildNotifier::new(generation, self.events_tx.clone());
        let spawned = match self.launcher.launch(&self.config.executable, notifier).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.state = SupervisorState::Failed;
                self.sink.log(
                    &format!("{} ({})", e, self.config.executable.display()),
                    Severity::Error,
                );
                return Err(e);
            }
        };

        let child = ChildProcess::new(generation, spawned.pid, spawned.name);
        self.stats.reset();
        self.liveness.clear();
        self.launch_count += 1;
        self.sink.log(&self.reporter.launched(&child), Severity::Info);

        self.current = Some(child);
        self.timers = Some(self.timer_service.arm(generation, self.events_tx.clone()));
        self.state = SupervisorState::Running;

        Ok(())
    }

    async fn on_update_tick(&mut self) -> Result<()> {
        if self.state != SupervisorState::Running {
            return Ok(());
        }
        let Some(pid) = self.current.as_ref().map(|child| child.pid) else {
            return Ok(());
        };

        if let Some(sample) = self.sampler.sample(pid) {
            self.stats.record(sample);
        }

        let timeout = self.config.unresponsive_timeout();
        let responsive = bounded_probe(self.probe.as_ref(), pid, timeout).await;

        match self.liveness.record_probe(responsive) {
            LivenessVerdict::Responsive => {
                trace!("Process {} responded", pid);
                Ok(())
            }
            LivenessVerdict::Suspect => {
                debug!(
                    "{} ({:?}); killing it if the next probe fails",
                    WatchdogError::ProbeTimeout(pid),
                    timeout
                );
                Ok(())
            }
            LivenessVerdict::Hung => self.force_terminate(pid).await,
        }
    }

    async fn force_terminate(&mut self, pid: u32) -> Result<()> {
        let name = self
            .current
            .as_ref()
            .map(|child| child.name.clone())
            .unwrap_or_default();
        self.sink.log(
            &format!(
                "Process {} (PID: {}) is not responding, terminating it",
                name, pid
            ),
            Severity::Error,
        );

        self.state = SupervisorState::Terminating;
        if let Some(timers) = self.timers.take() {
            timers.disarm();
        }

        match self.launcher.terminate(pid).await {
            // The exit notification completes the cycle
            Ok(()) => Ok(()),
            Err(e) => {
                self.sink.log(&e.to_string(), Severity::Error);
                self.on_terminated(None).await
            }
        }
    }

    /// Terminating → Relaunching → Launching
    async fn on_terminated(&mut self, exit_code: Option<i32>) -> Result<()> {
        self.state = SupervisorState::Terminating;
        if let Some(timers) = self.timers.take() {
            timers.disarm();
        }

        if let Some(child) = self.current.as_mut() {
            child.exit_code = exit_code;
            self.sampler.forget(child.pid);

            let severity = if exit_code == Some(self.config.clean_exit_code) {
                Severity::Info
            } else {
                Severity::Error
            };
            let summary = self.reporter.exit_summary(child, &self.stats);
            self.sink.log(&summary, severity);
        }

        self.state = SupervisorState::Relaunching;
        self.launch().await
    }

    fn on_info_tick(&mut self) {
        if let Some(report) = self.snapshot() {
            self.sink.log(&report, Severity::Info);
        }
    }

    fn on_error_output(&mut self, line: &str) {
        if let Some(ref child) = self.current {
            self.sink
                .log(&format!("{}: {}", child.name, line), Severity::Error);
        }
    }

    async fn shutdown(&mut self) {
        if let Some(timers) = self.timers.take() {
            timers.disarm();
        }

        if let Some(ref child) = self.current {
            if child.exit_code.is_none() {
                self.sink.log(
                    &format!(
                        "Watchdog shutting down, stopping {} (PID: {})",
                        child.name, child.pid
                    ),
                    Severity::Info,
                );
                if let Err(e) = self.launcher.terminate(child.pid).await {
                    self.sink.log(&e.to_string(), Severity::Error);
                }
            }
        }

        self.state = SupervisorState::Idle;
    }
}
