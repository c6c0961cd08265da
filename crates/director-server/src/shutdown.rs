//! Shutdown signalling and task draining.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Used by [`Shutdown::drain`] when no timeout is given.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How a [`Shutdown::drain`] ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Tasks that finished on their own.
    pub finished: usize,
    /// Tasks still running at the deadline, now aborted.
    pub aborted: usize,
}

/// One cancellation signal shared by the listener, the heartbeat and every
/// socket session.
#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that resolves once [`signal`](Self::signal) is called.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the signal. Idempotent.
    pub fn signal(&self) {
        self.token.cancel();
    }

    /// Whether the signal has fired.
    pub fn is_draining(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the signal and give `tasks` until `timeout` to exit.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> DrainOutcome {
        let deadline = timeout.unwrap_or(DRAIN_TIMEOUT);
        let total = tasks.len();
        self.signal();
        info!(tasks = total, ?deadline, "draining tasks");

        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout(deadline, futures::future::join_all(tasks)).await;
        if joined.is_ok() {
            return DrainOutcome {
                finished: total,
                aborted: 0,
            };
        }

        let mut outcome = DrainOutcome::default();
        for task in aborts {
            if task.is_finished() {
                outcome.finished += 1;
            } else {
                task.abort();
                outcome.aborted += 1;
            }
        }
        warn!(aborted = outcome.aborted, ?deadline, "drain deadline passed");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_shared_and_idempotent() {
        let shutdown = Shutdown::new();
        let copy = shutdown.clone();
        let token = shutdown.token();
        assert!(!copy.is_draining());

        shutdown.signal();
        shutdown.signal();
        assert!(copy.is_draining());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_tasks() {
        let shutdown = Shutdown::new();
        let tasks = (0..3)
            .map(|_| {
                let token = shutdown.token();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();

        let outcome = shutdown.drain(tasks, None).await;
        assert_eq!(outcome, DrainOutcome { finished: 3, aborted: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_tasks_past_the_deadline() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        let polite = tokio::spawn(async move { token.cancelled().await });
        let stubborn = tokio::spawn(tokio::time::sleep(Duration::from_secs(300)));

        let outcome = shutdown
            .drain(vec![polite, stubborn], Some(Duration::from_millis(100)))
            .await;
        assert_eq!(outcome, DrainOutcome { finished: 1, aborted: 1 });
    }
}
