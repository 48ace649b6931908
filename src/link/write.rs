//! Blocking write path

use super::{Link, PendingWrite};
use crate::consts::FIRST_WRITE_HEAD;
use crate::error::LinkError;
use crate::hal::{Clock, Direction, ReadyLine, SpiDma};
use crate::header;
use crate::rx::RxHandler;
use crate::spin::{Spin, SpinError};
use crate::state::{self, Action, Event, LinkState};
use critical_section::CriticalSection;
use embedded_hal_02::blocking::delay::DelayUs;
use embedded_hal_02::digital::v2::OutputPin;

impl<DMA, CS, IRQ, T, H> Link<DMA, CS, IRQ, T, H>
where
    DMA: SpiDma,
    CS: OutputPin,
    IRQ: ReadyLine,
    T: Clock + DelayUs<u32>,
    H: RxHandler,
{
    /// Sends the `len` payload bytes at `buf[SPI_HEADER_SIZE..]` and blocks until
    /// they are on the wire.
    ///
    /// `buf[..SPI_HEADER_SIZE]` is overwritten with the envelope. An even `len`
    /// gets a padding byte right behind the payload, so `buf` needs room for
    /// `SPI_HEADER_SIZE + len + 1` bytes in that case.
    ///
    /// The very first write after [`open`](Self::open) waits for the
    /// co-processor to come up and is sent without handshake. Every later one
    /// waits for the link to go idle, asserts chip select and lets the
    /// co-processor's ready pulse start the DMA.
    ///
    /// Must not be called from the [`RxHandler`] or any other interrupt handler.
    pub fn write(&self, buf: &mut [u8], len: usize) -> Result<(), LinkError<IRQ::Error>> {
        if len > u16::MAX as usize {
            return Err(LinkError::PayloadTooLarge);
        }

        let total = header::stamp_envelope(buf, len).ok_or(LinkError::BufferTooSmall)?;

        if !self.is_open() {
            return Err(LinkError::NotOpen);
        }

        let spin = self.spin();

        if self.state() == LinkState::PowerUp {
            debug!("waiting for the co-processor");
            self.wait(&spin, |_| self.state() != LinkState::PowerUp)?;
        }

        let frame = PendingWrite {
            ptr: buf.as_ptr(),
            len: total,
        };

        loop {
            let request = critical_section::with(|cs| {
                let mut xfer = self.xfer.borrow_ref_mut(cs);
                let step = state::step(self.state.load(), Event::WriteRequest, &self.context(&xfer));

                // Only one writer gets to send the first transaction
                if step.action == Action::Bootstrap {
                    if xfer.bootstrapping {
                        return Action::None;
                    }
                    xfer.bootstrapping = true;
                }

                step.action
            });

            match request {
                Action::Bootstrap => return self.bootstrap(&spin, &buf[..total]),
                Action::Reserve => {
                    if self.reserve(&spin, frame)? {
                        break;
                    }
                }
                // A read or another writer holds the bus
                _ => self.wait(&spin, |cs| match self.state() {
                    LinkState::Idle => true,
                    LinkState::Initialized => !self.xfer.borrow_ref(cs).bootstrapping,
                    _ => false,
                })?,
            }
        }

        trace!("frame of {} bytes reserved the bus", total);

        if let Err(e) = self.wait(&spin, |cs| self.sent(cs, frame)) {
            error!("write of {} bytes failed: {:?}", total, e);
            self.cancel(frame);
            return Err(e.into());
        }

        // `close` drops the frame too
        if self.state() == LinkState::PowerUp {
            return Err(LinkError::Aborted);
        }

        Ok(())
    }

    /// Takes the idle bus for `frame` and asserts chip select. `false` if the
    /// co-processor started a read in the meantime.
    fn reserve(&self, spin: &Spin<'_>, frame: PendingWrite) -> Result<bool, SpinError> {
        self.wait(spin, |cs| !self.hw.borrow_ref(cs).dma.is_busy())?;
        self.wait(spin, |cs| !self.hw.borrow_ref_mut(cs).ready.is_asserted())?;

        Ok(critical_section::with(|cs| {
            let mut xfer = self.xfer.borrow_ref_mut(cs);
            let step = state::step(self.state.load(), Event::WriteRequest, &self.context(&xfer));

            if step.action != Action::Reserve {
                return false;
            }

            xfer.tx = Some(frame);
            self.hw.borrow_ref_mut(cs).select();
            self.state.set(cs, step.next);
            true
        }))
    }

    /// Whether `frame` left the link. The co-processor grants a reserved write
    /// by asserting the ready line. The interrupt normally starts the transfer,
    /// a pulse that was masked or already gone before the handler ran is picked
    /// up here.
    fn sent(&self, cs: CriticalSection<'_>, frame: PendingWrite) -> bool {
        let mut xfer = self.xfer.borrow_ref_mut(cs);

        if !xfer.holds(frame) {
            return true;
        }

        let state = self.state.load();
        if state != LinkState::WriteIrqPending {
            return false;
        }

        let mut hw = self.hw.borrow_ref_mut(cs);
        if hw.ready.is_asserted() {
            let step = state::step(state, Event::Ready, &self.context(&xfer));
            self.apply(cs, &mut hw, &mut xfer, state, step);
        }

        false
    }

    /// Stops a write that ran out of time. The frame is released, so the DMA
    /// engine must not touch it again.
    fn cancel(&self, frame: PendingWrite) {
        critical_section::with(|cs| {
            let mut xfer = self.xfer.borrow_ref_mut(cs);

            // Already gone, or sent and the bus belongs to someone else by now
            if !xfer.holds(frame) {
                return;
            }

            let mut hw = self.hw.borrow_ref_mut(cs);
            hw.dma.disable();
            hw.deselect();
            xfer.tx = None;

            let state = self.state.load();
            if state.is_writing() {
                warn!("write abandoned in {:?}", state);
                self.state.set(cs, LinkState::Idle);
            }
        });
    }

    /// First transaction after power up. The co-processor doesn't handshake
    /// yet: assert chip select, give it time, send four bytes, give it time
    /// again, send the rest.
    fn bootstrap(&self, spin: &Spin<'_>, frame: &[u8]) -> Result<(), LinkError<IRQ::Error>> {
        debug!("first transaction, {} bytes", frame.len());

        critical_section::with(|cs| self.hw.borrow_ref_mut(cs).select());

        let (head, tail) = frame.split_at(FIRST_WRITE_HEAD);
        let res = self.first_write(spin, head, tail);

        critical_section::with(|cs| {
            let mut hw = self.hw.borrow_ref_mut(cs);
            self.xfer.borrow_ref_mut(cs).bootstrapping = false;

            // Idle before chip select goes up, the co-processor answers right away
            let res = res.map_err(LinkError::from).and_then(|()| {
                self.state
                    .transition(cs, LinkState::Initialized, LinkState::Idle)
                    .map_err(LinkError::from)
            });

            if res.is_err() {
                hw.dma.disable();
            }
            hw.deselect();

            res
        })?;

        debug!("link up");
        Ok(())
    }

    fn first_write(&self, spin: &Spin<'_>, head: &[u8], tail: &[u8]) -> Result<(), SpinError> {
        self.settle();
        self.send_polled(spin, head)?;
        self.settle();
        self.send_polled(spin, tail)
    }

    fn settle(&self) {
        let us = self.config.settle.ticks();
        critical_section::with(|cs| self.timer.borrow_ref_mut(cs).delay_us(us));
    }

    /// Sends `chunk` without the completion interrupt and polls for the end
    fn send_polled(&self, spin: &Spin<'_>, chunk: &[u8]) -> Result<(), SpinError> {
        critical_section::with(|cs| {
            // SAFETY: `chunk` is borrowed for the whole call and the transfer is
            // either polled to completion or stopped by the caller on error
            unsafe {
                self.hw.borrow_ref_mut(cs).start(
                    Direction::Write,
                    chunk.as_ptr() as *mut u8,
                    chunk.len(),
                    false,
                )
            };
        });

        self.wait(spin, |cs| self.hw.borrow_ref_mut(cs).dma.poll().is_ok())
    }
}
