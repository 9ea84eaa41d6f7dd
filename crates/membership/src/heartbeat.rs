//! Heartbeat scheduling.
//!
//! Each [`HeartbeatScheduler::schedule`] arms a one-shot timer that delivers
//! a [`HeartbeatTick`] on the scheduler's channel. Ticks carry the id of the
//! handle that produced them, so the owner can tell the current timer apart
//! from a stray tick that was already in flight when its handle was
//! cancelled.

use std::time::Duration;

use tokio::{sync::mpsc, task::AbortHandle};

/// Fire signal of a heartbeat timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTick {
    id: u64,
}

impl HeartbeatTick {
    /// Id of the timer that fired.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Handle to a scheduled heartbeat.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    task: AbortHandle,
}

impl TimerHandle {
    /// Unique id, matching the id of the tick this timer delivers.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the timer. No-op if it already fired or was cancelled.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the timer has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Arms one-shot heartbeat timers.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    tx: mpsc::UnboundedSender<HeartbeatTick>,
    next_id: u64,
}

impl HeartbeatScheduler {
    /// Create a scheduler and the receiver its ticks are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HeartbeatTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, next_id: 0 }, rx)
    }

    /// Deliver one tick after `after`; zero means on the next poll.
    pub fn schedule(&mut self, after: Duration) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            if !after.is_zero() {
                tokio::time::sleep(after).await;
            }
            // Receiver gone means the owner stopped.
            let _ = tx.send(HeartbeatTick { id });
        });

        TimerHandle {
            id,
            task: task.abort_handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tick_after_delay() {
        let (mut scheduler, mut rx) = HeartbeatScheduler::new();
        let handle = scheduler.schedule(Duration::from_millis(100));
        assert!(handle.is_pending());

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.id(), handle.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_tick() {
        let (mut scheduler, mut rx) = HeartbeatScheduler::new();
        let first = scheduler.schedule(Duration::from_millis(100));
        first.cancel();
        let second = scheduler.schedule(Duration::from_millis(200));
        assert_ne!(first.id(), second.id());

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.id(), second.id());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (mut scheduler, mut rx) = HeartbeatScheduler::new();
        let handle = scheduler.schedule(Duration::ZERO);
        rx.recv().await.unwrap();

        // Already fired; cancelling twice is harmless.
        handle.cancel();
        handle.cancel();
        tokio::task::yield_now().await;
        assert!(!handle.is_pending());
    }
}
