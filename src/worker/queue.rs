//! Non-blocking polling of the upload queue.

use std::time::Duration;

use flume::{Receiver, TryRecvError};

use crate::config::{IDLE_MAX, IDLE_MIN};

/// Result of one poll.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Task(T),
    /// Nothing queued right now, but the producer is still running.
    Empty,
    /// The producer is done and the queue is drained.
    Closed,
}

/// Takes one task off `queue` without waiting.
///
/// # Returns
/// [`Dequeue::Task`] when a task was queued, [`Dequeue::Empty`] while the
/// producer may still send more, and [`Dequeue::Closed`] once it is gone
/// and the queue is drained.
pub fn poll<T>(queue: &Receiver<T>) -> Dequeue<T> {
    match queue.try_recv() {
        Ok(task) => Dequeue::Task(task),
        Err(TryRecvError::Empty) => Dequeue::Empty,
        Err(TryRecvError::Disconnected) => Dequeue::Closed,
    }
}

/// Idle wait between empty polls, doubling up to a cap.
#[derive(Debug)]
pub struct IdleBackoff {
    next: Duration,
    max: Duration,
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self { next: IDLE_MIN, max: IDLE_MAX }
    }
}

impl IdleBackoff {
    /// Sleeps for the current delay, then doubles it.
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.next).await;
        self.next = (self.next * 2).min(self.max);
    }

    #[inline]
    pub fn reset(&mut self) {
        self.next = IDLE_MIN;
    }
}
