//! Busy waiting
//!
//! There is no scheduler to block on, the foreground spins. Every spin is
//! bounded by an optional deadline and can be cut short with the link's abort
//! flag.

use crate::hal::{Duration, Instant};
use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpinError {
    Timeout,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(start: Instant, limit: Option<Duration>) -> Self {
        Self { start, limit }
    }

    pub fn never(start: Instant) -> Self {
        Self::new(start, None)
    }

    pub fn expired(&self, now: Instant) -> bool {
        match self.limit {
            None => false,
            Some(limit) => now
                .checked_duration_since(self.start)
                .map_or(false, |elapsed| elapsed >= limit),
        }
    }
}

pub struct Spin<'a> {
    deadline: Deadline,
    abort: &'a AtomicBool,
}

impl<'a> Spin<'a> {
    pub fn new(deadline: Deadline, abort: &'a AtomicBool) -> Self {
        Self { deadline, abort }
    }

    /// Spins until `done` holds. `done` is checked before the abort flag and the
    /// deadline, so a condition that is already met never fails.
    pub fn until<N, F>(&self, mut now: N, mut done: F) -> Result<(), SpinError>
    where
        N: FnMut() -> Instant,
        F: FnMut() -> bool,
    {
        loop {
            if done() {
                return Ok(());
            }

            if self.abort.load(Ordering::Acquire) {
                return Err(SpinError::Aborted);
            }

            if self.deadline.expired(now()) {
                return Err(SpinError::Timeout);
            }

            core::hint::spin_loop();
        }
    }
}
