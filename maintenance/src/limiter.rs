use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    in_flight: usize,
}

/// Counting limiter whose capacity can change while work is in flight.
///
/// `try_acquire_owned` never blocks. Lowering the limit does not interrupt running
/// tasks; it only pushes back on subsequent acquires until enough permits
/// drop.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    state: Mutex<LimiterState>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LimiterState {
                limit: limit.max(1),
                in_flight: 0,
            }),
        })
    }

    /// Takes an owned handle so the permit can travel into a spawned task.
    pub fn try_acquire_owned(self: Arc<Self>) -> Option<ConcurrencyPermit> {
        let mut state = self.state.lock().unwrap();
        if state.in_flight < state.limit {
            state.in_flight += 1;
            drop(state);
            Some(ConcurrencyPermit { limiter: self })
        } else {
            None
        }
    }

    /// Adjusts the capacity; values below 1 clamp to 1.
    pub fn set_limit(&self, limit: usize) {
        let mut state = self.state.lock().unwrap();
        state.limit = limit.max(1);
    }

    pub fn current_limit(&self) -> usize {
        self.state.lock().unwrap().limit
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Returns its slot to the limiter when dropped.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
