//! Link configuration

use crate::consts::{FIRST_WRITE_SETTLE_US, SPI_WINDOW_SIZE};
use crate::hal::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Largest transfer a single DMA operation moves. Bigger frames go out in two.
    pub(crate) window: usize,
    /// Chip select settle time around the first transaction's two halves
    pub(crate) settle: Duration,
    /// Bound for everything [`Link::write`](crate::link::Link::write) waits on.
    /// `None` waits forever.
    pub(crate) timeout: Option<Duration>,
    /// Mask the ready interrupt before a received packet is handed over. The
    /// consumer unmasks it with [`Link::resume`](crate::link::Link::resume).
    pub(crate) pause_after_receive: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            window: SPI_WINDOW_SIZE,
            settle: Duration::micros(FIRST_WRITE_SETTLE_US),
            timeout: None,
            pause_after_receive: false,
        }
    }

    pub const fn window(mut self, window: usize) -> Self {
        assert!(window > 0);
        self.window = window;
        self
    }

    pub const fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub const fn pause_after_receive(mut self, pause: bool) -> Self {
        self.pause_after_receive = pause;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
