use std::sync::{Condvar, Mutex, PoisonError};

/// Countdown latch: starts at the number of outstanding units of work and
/// releases every waiter once each unit has signalled.
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: Mutex<usize>,
    released: Condvar,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            released: Condvar::new(),
        }
    }

    /// Records one completed unit. Extra signals past zero are ignored.
    pub fn signal(&self) {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.released.notify_all();
        }
    }

    /// Blocks until the count reaches zero.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        while *remaining > 0 {
            remaining = self
                .released
                .wait(remaining)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
