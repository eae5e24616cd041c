//! A counting semaphore built on `Mutex`+`Condvar`.
//!
//! Grounded on `Semaphore.h`/`Semaphore.cpp` from the original plugin, which
//! hand-rolls the same primitive for the same reason (pre-C++20 lacked
//! `std::counting_semaphore`); std's `Condvar::wait_timeout_while` gives Rust
//! the same thing directly.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.condvar.notify_one();
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.condvar.wait(count).unwrap();
        }
        *count -= 1;
    }

    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Blocks until notified or `timeout` elapses. Returns whether the
    /// semaphore was actually acquired.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap();
        let (mut count, result) = self
            .condvar
            .wait_timeout_while(count, timeout, |count| *count == 0)
            .unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            debug_assert!(result.timed_out());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_for_times_out_without_notify() {
        let sema = Semaphore::new(0);
        assert!(!sema.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn notify_wakes_a_waiter() {
        let sema = Arc::new(Semaphore::new(0));
        let waiter = Arc::clone(&sema);
        let handle = thread::spawn(move || waiter.wait_for(Duration::from_secs(1)));
        thread::sleep(Duration::from_millis(20));
        sema.notify();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn try_wait_does_not_block() {
        let sema = Semaphore::new(1);
        assert!(sema.try_wait());
        assert!(!sema.try_wait());
    }
}
