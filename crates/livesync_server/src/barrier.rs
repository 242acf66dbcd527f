//! Counted update barrier.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Default)]
struct BarrierState {
    pending: usize,
    generation: u64,
}

/// A counted barrier over in-flight reactive updates.
///
/// Every subscription flush holds a [`BarrierGuard`] for its duration; the
/// write path calls [`UpdateBarrier::wait_settled`] to block until no flush
/// is in flight, so method results are reported only after every reactive
/// side effect has been sent.
#[derive(Default)]
pub struct UpdateBarrier {
    state: Mutex<BarrierState>,
    settled: Condvar,
}

impl UpdateBarrier {
    /// Creates a settled barrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one in-flight update; the returned guard releases it on
    /// drop.
    pub fn begin(self: &Arc<Self>) -> BarrierGuard {
        let mut state = self.state.lock();
        state.pending += 1;
        state.generation += 1;
        BarrierGuard {
            barrier: Arc::clone(self),
        }
    }

    /// Blocks until no update is in flight. Returns immediately when the
    /// barrier is already settled.
    ///
    /// Updates that begin while the waiter sleeps advance the generation
    /// counter; the wait loops until the pending count is zero AND no new
    /// update arrived since the count was last observed, so a late arrival
    /// extends the wait instead of racing past it.
    pub fn wait_settled(&self) {
        let mut state = self.state.lock();
        loop {
            let observed = state.generation;
            while state.pending > 0 {
                self.settled.wait(&mut state);
            }
            if state.generation == observed {
                return;
            }
        }
    }

    /// Number of in-flight updates.
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Total number of updates ever begun.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.pending -= 1;
        if state.pending == 0 {
            self.settled.notify_all();
        }
    }
}

/// Releases one in-flight update when dropped.
pub struct BarrierGuard {
    barrier: Arc<UpdateBarrier>,
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        self.barrier.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn settled_barrier_does_not_block() {
        let barrier = Arc::new(UpdateBarrier::new());
        barrier.wait_settled();
        assert_eq!(barrier.pending(), 0);
    }

    #[test]
    fn guard_releases_on_drop() {
        let barrier = Arc::new(UpdateBarrier::new());
        let guard = barrier.begin();
        assert_eq!(barrier.pending(), 1);
        assert_eq!(barrier.generation(), 1);
        drop(guard);
        assert_eq!(barrier.pending(), 0);
        barrier.wait_settled();
    }

    #[test]
    fn waiter_blocks_until_last_guard_drops() {
        let barrier = Arc::new(UpdateBarrier::new());
        let first = barrier.begin();
        let second = barrier.begin();

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_settled())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(first);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(second);
        waiter.join().unwrap();
        assert_eq!(barrier.generation(), 2);
    }

    #[test]
    fn arrival_during_the_wait_extends_it() {
        let barrier = Arc::new(UpdateBarrier::new());
        let first = barrier.begin();

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_settled())
        };
        thread::sleep(Duration::from_millis(20));

        // A second update begins before the first finishes: the waiter
        // must cover it too.
        let second = barrier.begin();
        drop(first);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(second);
        waiter.join().unwrap();
        assert_eq!(barrier.pending(), 0);
    }
}
