//! Single-slot debouncer: the latest trigger wins and the action runs once
//! the delay passes without another trigger.

use crate::safe_lock;
use log::{debug, error};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

#[derive(Default)]
struct SlotState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    wake: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        safe_lock(&self.state, "Debouncer")
    }
}

pub struct Debouncer {
    delay: Duration,
    slot: Arc<Slot>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl Debouncer {
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let slot = Arc::new(Slot::default());
        let worker_slot = Arc::clone(&slot);
        let handle = thread::spawn(move || run(&worker_slot, &action));
        let worker_id = handle.thread().id();

        Self {
            delay,
            slot,
            worker: Mutex::new(Some(handle)),
            worker_id,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule the action `delay` from now, replacing any pending schedule.
    pub fn trigger(&self) {
        let mut state = self.slot.lock();
        if state.shutdown {
            return;
        }
        state.deadline = Some(Instant::now() + self.delay);
        self.slot.wake.notify_one();
    }

    pub fn cancel(&self) {
        self.slot.lock().deadline = None;
        self.slot.wake.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().deadline.is_some()
    }

    /// Stop the worker. A pending action is dropped.
    pub fn shutdown(&self) {
        {
            let mut state = self.slot.lock();
            state.shutdown = true;
            state.deadline = None;
        }
        self.slot.wake.notify_one();

        // The action may drop the last owner, which lands here on the worker itself.
        if thread::current().id() == self.worker_id {
            return;
        }
        let handle = safe_lock(&self.worker, "Debouncer worker").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Debouncer worker panicked");
            }
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(slot: &Slot, action: &dyn Fn()) {
    let mut state = slot.lock();
    loop {
        if state.shutdown {
            break;
        }
        match state.deadline {
            None => {
                state = slot.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    drop(state);
                    action();
                    state = slot.lock();
                } else {
                    state = slot
                        .wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
    debug!("Debouncer worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(delay_ms: u64) -> (Debouncer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(delay_ms), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, count)
    }

    #[test]
    fn test_burst_runs_once() {
        let (debouncer, count) = counting(100);
        for _ in 0..5 {
            debouncer.trigger();
        }
        assert!(debouncer.is_pending());
        thread::sleep(Duration::from_millis(400));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_retrigger_pushes_deadline_back() {
        let (debouncer, count) = counting(200);
        debouncer.trigger();
        thread::sleep(Duration::from_millis(120));
        debouncer.trigger();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_drops_pending() {
        let (debouncer, count) = counting(50);
        debouncer.trigger();
        debouncer.cancel();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_ignores_later_triggers() {
        let (debouncer, count) = counting(10);
        debouncer.shutdown();
        debouncer.trigger();
        assert!(!debouncer.is_pending());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
