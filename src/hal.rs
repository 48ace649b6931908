//! Hardware the link drives
//!
//! Three small capabilities: the SPI DMA engine, the co-processor's ready line
//! and a microsecond clock. Chip select is a plain
//! [`OutputPin`](embedded_hal_02::digital::v2::OutputPin) (asserted low) and the
//! settle delay a [`DelayUs`](embedded_hal_02::blocking::delay::DelayUs).

use core::convert::Infallible;
use core::fmt::Debug;
use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use embedded_hal_02::digital::v2::InputPin;

pub type Instant = fugit::TimerInstantU32<1_000_000>;
pub type Duration = fugit::MicrosDurationU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Clock [`READ_COMMAND`](crate::consts::READ_COMMAND) and then zeros out, store what comes back
    Read,
    /// Clock the buffer out, discard what comes back
    Write,
}

/// SPI peripheral with its TX/RX DMA channel pair
pub trait SpiDma {
    /// Points both channels at `buf`.
    ///
    /// # Safety
    ///
    /// `buf` must stay valid for `len` bytes until the transfer has completed or
    /// [`disable`](SpiDma::disable) was called. For [`Direction::Write`] the
    /// engine only reads from it.
    unsafe fn configure(&mut self, direction: Direction, buf: *mut u8, len: usize);

    /// Starts the configured transfer. With `interrupt` set, completion raises
    /// the DMA interrupt, otherwise it has to be polled.
    fn enable(&mut self, interrupt: bool);

    fn disable(&mut self);

    fn is_complete(&self) -> bool;

    fn clear_complete(&mut self);

    /// SPI busy flag
    fn is_busy(&self) -> bool;

    /// Completion as a non-blocking operation: done once the transfer finished
    /// and the last byte left the shift register. Clears the completion flag.
    fn poll(&mut self) -> nb::Result<(), Infallible> {
        if self.is_complete() && !self.is_busy() {
            self.clear_complete();
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

/// The co-processor's active low "ready" interrupt line
pub trait ReadyLine {
    type Error: Debug;

    fn is_asserted(&mut self) -> bool;

    fn enable_interrupt(&mut self) -> Result<(), Self::Error>;

    fn disable_interrupt(&mut self);
}

/// Monotonic microsecond time source for bounded waits
pub trait Clock {
    fn now(&mut self) -> Instant;
}

/// Ready line on an input pin whose EXTI line is routed to `irq`.
///
/// Only masks and unmasks the NVIC line, the EXTI edge configuration is up to
/// the board and so is clearing the pending bit before calling
/// [`Link::on_ready_irq`](crate::link::Link::on_ready_irq).
pub struct ExtiReadyLine<PIN, I> {
    pin: PIN,
    irq: I,
}

impl<PIN, I> ExtiReadyLine<PIN, I>
where
    PIN: InputPin,
    I: InterruptNumber,
{
    pub fn new(pin: PIN, irq: I) -> Self {
        NVIC::mask(irq);
        Self { pin, irq }
    }

    pub fn free(self) -> PIN {
        NVIC::mask(self.irq);
        self.pin
    }
}

impl<PIN, I> ReadyLine for ExtiReadyLine<PIN, I>
where
    PIN: InputPin,
    I: InterruptNumber,
{
    type Error = Infallible;

    fn is_asserted(&mut self) -> bool {
        matches!(self.pin.is_low(), Ok(true))
    }

    fn enable_interrupt(&mut self) -> Result<(), Self::Error> {
        // SAFETY: The handler only touches the link through its critical sections
        unsafe { NVIC::unmask(self.irq) };
        Ok(())
    }

    fn disable_interrupt(&mut self) {
        NVIC::mask(self.irq);
    }
}
