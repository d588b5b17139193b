use crate::process::types::Generation;
use tokio::sync::mpsc;

/// Messages delivered to the supervisor's event loop
///
/// Every event carries the generation it was produced for so the supervisor
/// can discard anything that outlived its child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    UpdateTick { generation: Generation },
    InfoTick { generation: Generation },
    Exited {
        generation: Generation,
        exit_code: Option<i32>,
    },
    ErrorOutput { generation: Generation, line: String },
}

impl SupervisorEvent {
    pub fn generation(&self) -> Generation {
        match self {
            SupervisorEvent::UpdateTick { generation }
            | SupervisorEvent::InfoTick { generation }
            | SupervisorEvent::Exited { generation, .. }
            | SupervisorEvent::ErrorOutput { generation, .. } => *generation,
        }
    }
}

/// Termination and error-stream notifications for one launched child
#[derive(Debug, Clone)]
pub struct ChildNotifier {
    generation: Generation,
    sender: mpsc::Sender<SupervisorEvent>,
}

impl ChildNotifier {
    pub fn new(generation: Generation, sender: mpsc::Sender<SupervisorEvent>) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Report that the child terminated
    pub async fn exited(&self, exit_code: Option<i32>) {
        let event = SupervisorEvent::Exited {
            generation: self.generation,
            exit_code,
        };
        if self.sender.send(event).await.is_err() {
            tracing::debug!(
                "Supervisor gone, dropping exit notification for generation {}",
                self.generation
            );
        }
    }

    /// Report a line the child wrote to its error stream
    ///
    /// Returns false once the supervisor is gone and further lines are pointless.
    pub async fn error_output(&self, line: String) -> bool {
        let event = SupervisorEvent::ErrorOutput {
            generation: self.generation,
            line,
        };
        if self.sender.send(event).await.is_err() {
            tracing::debug!(
                "Supervisor gone, dropping error output for generation {}",
                self.generation
            );
            return false;
        }
        true
    }
}
