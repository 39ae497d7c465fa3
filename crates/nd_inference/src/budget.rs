use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Cost charged for a successful external call.
pub const SUCCESS_COST: u32 = 1;
/// Cost charged when the provider reports a rate limit, so later calls fall
/// back sooner.
pub const RATE_LIMIT_PENALTY: u32 = 5;

#[derive(Debug)]
struct Window {
    used: u32,
    started: Instant,
}

/// Counts external summarization calls in a fixed wall-clock window.
///
/// One instance is shared (behind an `Arc`) by every summarizer in the
/// process and passed in explicitly.
#[derive(Debug)]
pub struct UsageBudget {
    ceiling: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl UsageBudget {
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self {
            ceiling,
            window,
            state: Mutex::new(Window {
                used: 0,
                started: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn roll(&self, state: &mut Window) -> bool {
        if state.started.elapsed() >= self.window {
            state.used = 0;
            state.started = Instant::now();
            true
        } else {
            false
        }
    }

    /// Starts a new window if the current one has elapsed. Returns whether it did.
    pub fn reset_if_elapsed(&self) -> bool {
        let mut state = self.lock();
        self.roll(&mut state)
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.used = 0;
        state.started = Instant::now();
    }

    /// True once usage in the current window has reached the ceiling.
    pub fn is_exhausted(&self) -> bool {
        let mut state = self.lock();
        self.roll(&mut state);
        state.used >= self.ceiling
    }

    pub fn charge(&self, units: u32) {
        let mut state = self.lock();
        self.roll(&mut state);
        state.used = state.used.saturating_add(units);
    }

    pub fn used(&self) -> u32 {
        let mut state = self.lock();
        self.roll(&mut state);
        state.used
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}
