use crate::error::{Result, WatchdogError};
use crate::process::events::ChildNotifier;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// How long a finished child's error stream may take to drain before its exit is reported
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Metadata returned when launching the supervised executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedChild {
    /// Process ID assigned by the OS
    pub pid: u32,

    /// Process name derived from the executable
    pub name: String,
}

/// OS capability for starting and killing the supervised executable
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start `path`, wiring its termination and error-stream notifications to `notifier`
    async fn launch(&self, path: &Path, notifier: ChildNotifier) -> Result<SpawnedChild>;

    /// Forcefully terminate the process with the given pid
    ///
    /// `Ok` means the kill was delivered and an exit notification follows.
    async fn terminate(&self, pid: u32) -> Result<()>;
}

/// Resolve the executable path against the watchdog's own install directory
///
/// Absolute paths are returned unchanged.
pub fn resolve_executable(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let current_exe = std::env::current_exe().map_err(|e| {
        WatchdogError::LaunchError(format!("Failed to locate install directory: {}", e))
    })?;
    let install_dir = current_exe.parent().ok_or_else(|| {
        WatchdogError::LaunchError(format!(
            "Install directory of {} is unknown",
            current_exe.display()
        ))
    })?;

    Ok(install_dir.join(path))
}

/// Process name as the OS reports it: the executable's file stem
pub fn process_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Exit code of a finished child; signal deaths map to `128 + signal`
pub fn exit_code_of(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|sig| 128 + sig))
    }

    #[cfg(not(unix))]
    {
        status.code()
    }
}

/// Reply channel for one kill request
type KillReply = oneshot::Sender<Result<()>>;

/// Launcher backed by `tokio::process`
///
/// Each child is owned by its exit task. Kills are requested through that
/// task, so a signal is only ever sent to a child that has not been reaped.
#[derive(Debug, Default, Clone)]
pub struct OsLauncher {
    kill_requests: Arc<Mutex<HashMap<u32, oneshot::Sender<KillReply>>>>,
}

impl OsLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    fn requests(&self) -> MutexGuard<'_, HashMap<u32, oneshot::Sender<KillReply>>> {
        self.kill_requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    KillRequested(KillReply),
}

/// SIGKILL the child together with everything it started
fn kill_process_tree(child: &mut Child, pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The child leads its own process group
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return Ok(()),
            Err(e) => tracing::debug!("Failed to signal process group {}: {}", pid, e),
        }
    }

    child
        .start_kill()
        .map_err(|e| WatchdogError::KillFailure(pid, format!("Failed to send SIGKILL: {}", e)))
}

#[async_trait]
impl Launcher for OsLauncher {
    async fn launch(&self, path: &Path, notifier: ChildNotifier) -> Result<SpawnedChild> {
        let executable = resolve_executable(path)?;

        if !executable.exists() {
            return Err(WatchdogError::LaunchError(format!(
                "Executable does not exist: {}",
                executable.display()
            )));
        }

        let mut command = Command::new(&executable);

        // stdin belongs to the watchdog; the error stream is forwarded to the log sink
        command.stdin(Stdio::null());
        command.stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            WatchdogError::LaunchError(format!(
                "Failed to start '{}': {}",
                executable.display(),
                e
            ))
        })?;

        let pid = child.id().ok_or_else(|| {
            WatchdogError::LaunchError(format!(
                "Failed to get PID for '{}'",
                executable.display()
            ))
        })?;

        let name = process_name(&executable);
        let generation = notifier.generation();

        let forwarder = child.stderr.take().map(|stderr| {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !notifier.error_output(line).await {
                        break;
                    }
                }
            })
        });

        let (kill_tx, kill_rx) = oneshot::channel();
        self.requests().insert(pid, kill_tx);
        let kill_requests = self.kill_requests.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => Outcome::Exited(status),
                Ok(reply) = kill_rx => Outcome::KillRequested(reply),
            };

            let status = match outcome {
                Outcome::Exited(status) => status,
                Outcome::KillRequested(reply) => {
                    let _ = reply.send(kill_process_tree(&mut child, pid));
                    child.wait().await
                }
            };

            let exit_code = match status {
                Ok(status) => exit_code_of(status),
                Err(e) => {
                    tracing::warn!("Failed to wait for process {}: {}", pid, e);
                    None
                }
            };

            kill_requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|_, request| !request.is_closed());

            // Lines explaining a crash must reach the supervisor before the exit does
            if let Some(forwarder) = forwarder {
                if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, forwarder)
                    .await
                    .is_err()
                {
                    tracing::debug!("Error stream of process {} still open after exit", pid);
                }
            }

            notifier.exited(exit_code).await;
        });

        tracing::debug!(
            "Launched {} (PID: {}) for generation {}",
            name,
            pid,
            generation
        );

        Ok(SpawnedChild { pid, name })
    }

    async fn terminate(&self, pid: u32) -> Result<()> {
        let request = self.requests().remove(&pid).ok_or_else(|| {
            WatchdogError::KillFailure(pid, "Process is not running".to_string())
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if request.send(reply_tx).is_err() {
            return Err(WatchdogError::KillFailure(
                pid,
                "Process has already exited".to_string(),
            ));
        }

        reply_rx.await.map_err(|_| {
            WatchdogError::KillFailure(pid, "Process exited before the kill".to_string())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::events::SupervisorEvent;
    use crate::process::types::Generation;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[cfg(unix)]
    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn next_exit(rx: &mut mpsc::Receiver<SupervisorEvent>) -> Option<i32> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for exit")
                .expect("channel closed");
            if let SupervisorEvent::Exited { exit_code, .. } = event {
                return exit_code;
            }
        }
    }

    #[test]
    fn test_resolve_absolute_path_unchanged() {
        let path = PathBuf::from("/usr/bin/env");
        assert_eq!(resolve_executable(&path).unwrap(), path);
    }

    #[test]
    fn test_resolve_relative_path_uses_install_dir() {
        let resolved = resolve_executable(Path::new("kiosk-app")).unwrap();
        let install_dir = std::env::current_exe().unwrap();
        assert_eq!(resolved.parent(), install_dir.parent());
        assert!(resolved.ends_with("kiosk-app"));
    }

    #[test]
    fn test_process_name_is_file_stem() {
        assert_eq!(process_name(Path::new("/opt/kiosk/app.exe")), "app");
        assert_eq!(process_name(Path::new("/bin/sleep")), "sleep");
    }

    #[tokio::test]
    async fn test_launch_nonexistent_executable() {
        let (tx, _rx) = mpsc::channel(8);
        let notifier = ChildNotifier::new(Generation::new(1), tx);

        let result = OsLauncher::new()
            .launch(Path::new("/nonexistent/executable"), notifier)
            .await;

        match result {
            Err(WatchdogError::LaunchError(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("Expected LaunchError, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "exit-three", "exit 3");
        let (tx, mut rx) = mpsc::channel(8);

        let spawned = OsLauncher::new()
            .launch(&script, ChildNotifier::new(Generation::new(1), tx))
            .await
            .unwrap();

        assert!(spawned.pid > 0);
        assert_eq!(spawned.name, "exit-three");
        assert_eq!(next_exit(&mut rx).await, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_forwards_error_stream() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "noisy", "echo 'disk on fire' >&2");
        let (tx, mut rx) = mpsc::channel(8);

        OsLauncher::new()
            .launch(&script, ChildNotifier::new(Generation::new(4), tx))
            .await
            .unwrap();

        let mut saw_line = false;
        let mut saw_exit = false;
        while !(saw_line && saw_exit) {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for events")
                .expect("channel closed");
            match event {
                SupervisorEvent::ErrorOutput { generation, line } => {
                    assert_eq!(generation, Generation::new(4));
                    assert_eq!(line, "disk on fire");
                    saw_line = true;
                }
                SupervisorEvent::Exited { .. } => saw_exit = true,
                _ => {}
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_non_executable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "not a program").unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let result = OsLauncher::new()
            .launch(&path, ChildNotifier::new(Generation::new(1), tx))
            .await;

        assert!(matches!(result, Err(WatchdogError::LaunchError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_child() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "sleeper", "exec sleep 30");
        let (tx, mut rx) = mpsc::channel(8);
        let launcher = OsLauncher::new();

        let spawned = launcher
            .launch(&script, ChildNotifier::new(Generation::new(1), tx))
            .await
            .unwrap();

        launcher.terminate(spawned.pid).await.unwrap();
        assert_eq!(next_exit(&mut rx).await, Some(128 + 9));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_reaped_process_fails() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "quick", "exit 0");
        let (tx, mut rx) = mpsc::channel(8);
        let launcher = OsLauncher::new();

        let spawned = launcher
            .launch(&script, ChildNotifier::new(Generation::new(1), tx))
            .await
            .unwrap();
        assert_eq!(next_exit(&mut rx).await, Some(0));

        let result = launcher.terminate(spawned.pid).await;
        assert!(matches!(result, Err(WatchdogError::KillFailure(_, _))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crash_output_arrives_before_exit() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "crasher", "echo 'fatal: out of memory' >&2\nexit 1");
        let launcher = OsLauncher::new();

        for attempt in 0..25 {
            let (tx, mut rx) = mpsc::channel(8);
            launcher
                .launch(&script, ChildNotifier::new(Generation::new(attempt), tx))
                .await
                .unwrap();

            let mut saw_line = false;
            loop {
                let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                    .await
                    .expect("timed out waiting for events")
                    .expect("channel closed");
                match event {
                    SupervisorEvent::ErrorOutput { line, .. } => {
                        assert_eq!(line, "fatal: out of memory");
                        saw_line = true;
                    }
                    SupervisorEvent::Exited { exit_code, .. } => {
                        assert_eq!(exit_code, Some(1));
                        break;
                    }
                    _ => {}
                }
            }
            assert!(saw_line, "error line lost on attempt {}", attempt);
        }
    }

    #[cfg(unix)]
    fn is_gone(pid: u32) -> bool {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );
        match system.process(sys_pid) {
            None => true,
            Some(process) => matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_descendants() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "parent", "sleep 300 &\necho \"$!\" >&2\nwait");
        let (tx, mut rx) = mpsc::channel(8);
        let launcher = OsLauncher::new();

        let spawned = launcher
            .launch(&script, ChildNotifier::new(Generation::new(1), tx))
            .await
            .unwrap();

        let helper = loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for helper pid")
                .expect("channel closed");
            if let SupervisorEvent::ErrorOutput { line, .. } = event {
                break line.trim().parse::<u32>().unwrap();
            }
        };
        assert!(!is_gone(helper));

        launcher.terminate(spawned.pid).await.unwrap();
        assert_eq!(next_exit(&mut rx).await, Some(128 + 9));

        let mut waited = Duration::ZERO;
        while !is_gone(helper) {
            assert!(waited < Duration::from_secs(5), "helper {} survived the kill", helper);
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_twice_fails_second_time() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "sleeper", "exec sleep 30");
        let (tx, mut rx) = mpsc::channel(8);
        let launcher = OsLauncher::new();

        let spawned = launcher
            .launch(&script, ChildNotifier::new(Generation::new(1), tx))
            .await
            .unwrap();

        launcher.terminate(spawned.pid).await.unwrap();
        let second = launcher.terminate(spawned.pid).await;

        assert!(matches!(second, Err(WatchdogError::KillFailure(_, _))));
        assert_eq!(next_exit(&mut rx).await, Some(128 + 9));
    }
}
