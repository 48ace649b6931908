//! DWT cycle counter as time source and delay provider
//!
//! Cortex-M3 and up only, the M0+ has no cycle counter.

use crate::hal::{Clock, Instant};
use cortex_m::peripheral::{DCB, DWT};
use embedded_hal_02::blocking::delay::DelayUs;
use fugit::HertzU32;

/// Microsecond clock and busy delay driven by the cycle counter.
///
/// [`Clock::now`] has to be called at least once per counter wrap (2^32 core
/// cycles) to stay monotonic, which every bounded wait in this crate does.
pub struct Delay {
    cycles_per_us: u32,
    last: u32,
    carry: u32,
    micros: u32,
}

impl Delay {
    /// Enables the cycle counter. `sysclk` is the core clock.
    pub fn new(dcb: &mut DCB, dwt: &mut DWT, sysclk: HertzU32) -> Self {
        dcb.enable_trace();
        dwt.enable_cycle_counter();

        Self {
            cycles_per_us: sysclk.to_MHz().max(1),
            last: DWT::cycle_count(),
            carry: 0,
            micros: 0,
        }
    }
}

impl Clock for Delay {
    fn now(&mut self) -> Instant {
        let cycles = DWT::cycle_count();
        let elapsed = u64::from(cycles.wrapping_sub(self.last)) + u64::from(self.carry);
        let per_us = u64::from(self.cycles_per_us);

        self.last = cycles;
        self.micros = self.micros.wrapping_add((elapsed / per_us) as u32);
        self.carry = (elapsed % per_us) as u32;

        Instant::from_ticks(self.micros)
    }
}

impl DelayUs<u32> for Delay {
    fn delay_us(&mut self, us: u32) {
        // Half the counter range, so a chunk can't be mistaken for a wrap
        const MAX_CHUNK: u32 = u32::MAX / 2;

        let mut total = u64::from(us) * u64::from(self.cycles_per_us);

        while total != 0 {
            let chunk = if total <= MAX_CHUNK.into() {
                total as u32
            } else {
                MAX_CHUNK
            };

            let start = DWT::cycle_count();
            while DWT::cycle_count().wrapping_sub(start) < chunk {}

            total -= u64::from(chunk);
        }
    }
}
