//! Cancellable deferred callbacks keyed by game and purpose.
//!
//! At most one timer exists per key; scheduling again replaces (cancels) the
//! previous one. Callbacks run on the tokio runtime once their delay elapses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a timer is for. One live timer per (game, purpose).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Settle delay before an invoke goes out.
    Invoke,
}

type TimerKey = (String, TimerPurpose);

#[derive(Debug)]
struct Armed {
    token: CancellationToken,
    generation: u64,
}

#[derive(Debug, Default)]
struct Timers {
    armed: HashMap<TimerKey, Armed>,
    next_generation: u64,
}

/// Keyed one-shot timers.
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    timers: Arc<Mutex<Timers>>,
}

impl Scheduler {
    /// No timers armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `delay`, replacing any timer already armed for the key.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, game: &str, purpose: TimerPurpose, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let key: TimerKey = (game.to_owned(), purpose);
        let token = CancellationToken::new();
        let generation = {
            let mut timers = self.timers.lock();
            timers.next_generation += 1;
            let generation = timers.next_generation;
            if let Some(previous) = timers.armed.insert(
                key.clone(),
                Armed {
                    token: token.clone(),
                    generation,
                },
            ) {
                previous.token.cancel();
            }
            generation
        };

        let timers = Arc::clone(&self.timers);
        drop(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    let still_armed = {
                        let mut timers = timers.lock();
                        let current = timers.armed.get(&key).is_some_and(|a| a.generation == generation);
                        if current {
                            let _ = timers.armed.remove(&key);
                        }
                        current
                    };
                    if still_armed {
                        callback();
                    }
                }
                () = token.cancelled() => {
                    debug!(game = %key.0, purpose = ?key.1, "timer cancelled");
                }
            }
        }));
    }

    /// Cancel the timer for a key. Returns whether one was armed.
    pub fn cancel(&self, game: &str, purpose: TimerPurpose) -> bool {
        let removed = self.timers.lock().armed.remove(&(game.to_owned(), purpose));
        match removed {
            Some(armed) => {
                armed.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer for `game`. Returns how many were armed.
    pub fn cancel_game(&self, game: &str) -> usize {
        let mut timers = self.timers.lock();
        let keys: Vec<TimerKey> = timers
            .armed
            .keys()
            .filter(|(g, _)| g == game)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(armed) = timers.armed.remove(key) {
                armed.token.cancel();
            }
        }
        keys.len()
    }

    /// Cancel everything.
    pub fn cancel_all(&self) -> usize {
        let mut timers = self.timers.lock();
        let count = timers.armed.len();
        for (_, armed) in timers.armed.drain() {
            armed.token.cancel();
        }
        count
    }

    /// Whether a timer is armed for the key.
    pub fn is_armed(&self, game: &str, purpose: TimerPurpose) -> bool {
        self.timers
            .lock()
            .armed
            .contains_key(&(game.to_owned(), purpose))
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.lock().armed.len()
    }

    /// Whether no timers are armed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, move || {
            let h = Arc::clone(&h);
            Box::new(move || {
                let _ = h.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let sched = Scheduler::new();
        let (hits, cb) = counter();
        sched.schedule("G", TimerPurpose::Invoke, Duration::from_millis(500), cb());
        assert!(sched.is_armed("G", TimerPurpose::Invoke));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sched.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_previous() {
        let sched = Scheduler::new();
        let (hits, cb) = counter();
        sched.schedule("G", TimerPurpose::Invoke, Duration::from_millis(100), cb());
        sched.schedule("G", TimerPurpose::Invoke, Duration::from_millis(300), cb());
        assert_eq!(sched.len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let sched = Scheduler::new();
        let (hits, cb) = counter();
        sched.schedule("G", TimerPurpose::Invoke, Duration::from_millis(100), cb());
        assert!(sched.cancel("G", TimerPurpose::Invoke));
        assert!(!sched.cancel("G", TimerPurpose::Invoke));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_game_leaves_other_games() {
        let sched = Scheduler::new();
        let (hits, cb) = counter();
        sched.schedule("A", TimerPurpose::Invoke, Duration::from_millis(100), cb());
        sched.schedule("B", TimerPurpose::Invoke, Duration::from_millis(100), cb());
        assert_eq!(sched.cancel_game("A"), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears() {
        let sched = Scheduler::new();
        let (hits, cb) = counter();
        sched.schedule("A", TimerPurpose::Invoke, Duration::from_millis(100), cb());
        sched.schedule("B", TimerPurpose::Invoke, Duration::from_millis(100), cb());
        assert_eq!(sched.cancel_all(), 2);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
