//! Wakeable counting signal used by channel writers and waiting readers.
//!
//! A post increments a counter and wakes every waiter; a waiter remembers
//! the last count it saw and sleeps until the count moves. Posts are never
//! lost: a post that lands between a reader's check and its wait still
//! changes the count the wait compares against.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counting wake signal (process-local semaphore-post equivalent).
#[derive(Debug, Default)]
pub struct WakeSignal {
    posts: Mutex<u64>,
    cond: Condvar,
}

impl WakeSignal {
    /// Create a signal with no posts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the signal, waking all waiters. Returns the new post count.
    pub fn post(&self) -> u64 {
        let mut posts = self.posts.lock();
        *posts = posts.wrapping_add(1);
        self.cond.notify_all();
        *posts
    }

    /// Current post count.
    pub fn count(&self) -> u64 {
        *self.posts.lock()
    }

    /// Block until the post count differs from `seen` or `timeout` elapses.
    ///
    /// Returns the new count, or `None` on timeout.
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut posts = self.posts.lock();
        while *posts == seen {
            if self.cond.wait_until(&mut posts, deadline).timed_out() {
                return (*posts != seen).then_some(*posts);
            }
        }
        Some(*posts)
    }
}
