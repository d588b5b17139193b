use crate::process::events::SupervisorEvent;
use crate::process::types::Generation;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Allows at most one undelivered tick per timer
///
/// While the supervisor is busy, further ticks are dropped instead of
/// piling up in the event channel.
#[derive(Debug, Clone, Default)]
struct TickGate(Arc<AtomicBool>);

impl TickGate {
    fn try_acquire(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
struct Ticker {
    handle: JoinHandle<()>,
    gate: TickGate,
}

impl Ticker {
    fn spawn(
        period: Duration,
        generation: Generation,
        sender: mpsc::Sender<SupervisorEvent>,
        make_event: fn(Generation) -> SupervisorEvent,
    ) -> Self {
        let gate = TickGate::default();
        let task_gate = gate.clone();

        let handle = tokio::spawn(async move {
            // First tick fires one full period after arming
            let now = Instant::now();
            let start = now.checked_add(period).unwrap_or(now);
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                if !task_gate.try_acquire() {
                    tracing::trace!("Previous tick for generation {} still pending", generation);
                    continue;
                }

                if sender.send(make_event(generation)).await.is_err() {
                    break;
                }
            }
        });

        Self { handle, gate }
    }
}

/// Schedules the update and info ticks for each child generation
#[derive(Debug, Clone, Copy)]
pub struct TimerService {
    update_period: Duration,
    info_period: Duration,
}

impl TimerService {
    pub fn new(update_period: Duration, info_period: Duration) -> Self {
        Self {
            update_period,
            info_period,
        }
    }

    /// Start both timers for `generation`
    pub fn arm(&self, generation: Generation, sender: mpsc::Sender<SupervisorEvent>) -> ArmedTimers {
        let update = Ticker::spawn(self.update_period, generation, sender.clone(), |generation| {
            SupervisorEvent::UpdateTick { generation }
        });
        let info = Ticker::spawn(self.info_period, generation, sender, |generation| {
            SupervisorEvent::InfoTick { generation }
        });

        ArmedTimers {
            generation,
            update,
            info,
        }
    }
}

/// Running timers for one generation; dropping them disarms both
#[derive(Debug)]
pub struct ArmedTimers {
    generation: Generation,
    update: Ticker,
    info: Ticker,
}

impl ArmedTimers {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Mark the pending tick carried by `event` as handled so the next one can be sent
    pub fn acknowledge(&self, event: &SupervisorEvent) {
        if event.generation() != self.generation {
            return;
        }

        match event {
            SupervisorEvent::UpdateTick { .. } => self.update.gate.release(),
            SupervisorEvent::InfoTick { .. } => self.info.gate.release(),
            _ => {}
        }
    }

    /// Stop both timers
    pub fn disarm(self) {
        drop(self);
    }
}

impl Drop for ArmedTimers {
    fn drop(&mut self) {
        self.update.handle.abort();
        self.info.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    const FAST: Duration = Duration::from_millis(20);
    const NEVER: Duration = Duration::from_secs(3600);

    async fn recv(rx: &mut mpsc::Receiver<SupervisorEvent>) -> SupervisorEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for tick")
            .expect("channel closed")
    }

    #[test]
    fn test_tick_gate() {
        let gate = TickGate::default();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        gate.release();
        assert!(gate.try_acquire());
    }

    #[tokio::test]
    async fn test_ticks_carry_generation() {
        let (tx, mut rx) = mpsc::channel(8);
        let timers = TimerService::new(FAST, NEVER).arm(Generation::new(3), tx);

        let event = recv(&mut rx).await;
        assert_eq!(
            event,
            SupervisorEvent::UpdateTick {
                generation: Generation::new(3)
            }
        );
        assert_eq!(timers.generation(), Generation::new(3));
    }

    #[tokio::test]
    async fn test_unacknowledged_ticks_coalesce() {
        let (tx, mut rx) = mpsc::channel(64);
        let timers = TimerService::new(FAST, NEVER).arm(Generation::new(1), tx);

        let first = recv(&mut rx).await;
        tokio::time::sleep(FAST * 6).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        timers.acknowledge(&first);
        let second = recv(&mut rx).await;
        assert!(matches!(second, SupervisorEvent::UpdateTick { .. }));
    }

    #[tokio::test]
    async fn test_stale_acknowledgement_is_ignored() {
        let (tx, mut rx) = mpsc::channel(64);
        let timers = TimerService::new(FAST, NEVER).arm(Generation::new(2), tx);

        recv(&mut rx).await;
        timers.acknowledge(&SupervisorEvent::UpdateTick {
            generation: Generation::new(1),
        });

        tokio::time::sleep(FAST * 6).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_disarm_stops_ticks() {
        let (tx, mut rx) = mpsc::channel(64);
        let timers = TimerService::new(FAST, FAST).arm(Generation::new(1), tx);

        recv(&mut rx).await;
        timers.disarm();
        tokio::time::sleep(FAST).await;

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(FAST * 5).await;
        assert!(rx.try_recv().is_err());
    }
}
