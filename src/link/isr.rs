//! Interrupt entry points and the read path
//!
//! Wire the ready line (EXTI) vector to [`Link::on_ready_irq`] and the SPI TX
//! DMA channel's transfer complete vector to [`Link::on_dma_complete`]. Both
//! handlers clear nothing but the DMA completion flag, pending bits of the
//! interrupt controllers are up to the caller.

use super::{Hardware, Link, Transfer};
use crate::consts::{HEADERS_SIZE_EVNT, SPI_HEADER_SIZE};
use crate::hal::{Clock, Direction, ReadyLine, SpiDma};
use crate::rx::RxHandler;
use crate::state::{self, Action, Event, LinkState, Step};
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
    /// The co-processor asserted its ready line.
    ///
    /// First pulse after [`open`](Self::open): the co-processor is up. On an
    /// idle link: it has a packet for us, start reading the header. With a
    /// write waiting for the grant: send it. Anything else is ignored.
    pub fn on_ready_irq(&self) {
        critical_section::with(|cs| {
            let mut hw = self.hw.borrow_ref_mut(cs);

            // The line may have been released again already
            if !hw.ready.is_asserted() {
                trace!("ready pulse gone");
                return;
            }

            let mut xfer = self.xfer.borrow_ref_mut(cs);
            if !xfer.open {
                return;
            }

            let state = self.state.load();
            let step = state::step(state, Event::Ready, &self.context(&xfer));
            self.apply(cs, &mut hw, &mut xfer, state, step);
        });
    }

    /// The armed DMA transfer finished.
    ///
    /// Continues a split transfer, reads the payload announced by a header,
    /// ends a write or hands a complete packet to the [`RxHandler`].
    pub fn on_dma_complete(&self) {
        critical_section::with(|cs| {
            let deliver = {
                let mut hw = self.hw.borrow_ref_mut(cs);
                if !hw.dma.is_complete() {
                    return;
                }

                let mut xfer = self.xfer.borrow_ref_mut(cs);
                let state = self.state.load();

                if !xfer.open {
                    hw.dma.clear_complete();
                    return;
                }

                let step = state::step(state, Event::DmaComplete, &self.context(&xfer));

                if step.action == Action::None {
                    trace!("dma completion ignored in {:?}", state);
                    // The first transaction polls for the flag
                    if state != LinkState::Initialized {
                        hw.dma.clear_complete();
                    }
                    return;
                }

                hw.dma.clear_complete();
                self.apply(cs, &mut hw, &mut xfer, state, step)
            };

            if deliver {
                self.deliver(cs);
            }
        });
    }

    /// Carries out `step`. Returns whether a received packet is ready for the handler.
    pub(super) fn apply(
        &self,
        cs: CriticalSection<'_>,
        hw: &mut Hardware<DMA, CS, IRQ>,
        xfer: &mut Transfer,
        from: LinkState,
        step: Step,
    ) -> bool {
        match step.action {
            Action::None => {}
            Action::ReadHeader => {
                hw.select();
                xfer.rx_len = HEADERS_SIZE_EVNT;

                // SAFETY: The receive buffer is 'static and not looked at again
                // before the transfer completed
                unsafe {
                    hw.start(
                        Direction::Read,
                        xfer.rx.as_mut_ptr(),
                        HEADERS_SIZE_EVNT,
                        true,
                    )
                };
            }
            Action::Read { offset, len } => {
                let end = offset + len;

                if end > xfer.rx.len() {
                    warn!(
                        "dropping packet of {} bytes, receive buffer holds {}",
                        end,
                        xfer.rx.len()
                    );
                    hw.dma.disable();
                    hw.deselect();
                    xfer.rx_len = 0;
                    self.state.set(cs, LinkState::Idle);
                    return false;
                }

                xfer.rx_len = end;

                // SAFETY: In bounds, see above
                unsafe {
                    hw.start(
                        Direction::Read,
                        xfer.rx.as_mut_ptr().add(offset),
                        len,
                        true,
                    )
                };
            }
            Action::Write { offset, len } => {
                let tx = match xfer.tx {
                    Some(tx) if offset + len <= tx.len => tx,
                    _ => {
                        warn!("write granted in {:?} without a matching frame", from);
                        hw.deselect();
                        xfer.tx = None;
                        self.state.set(cs, LinkState::Idle);
                        return false;
                    }
                };

                // SAFETY: `write` keeps the frame borrowed until the link is idle
                // again or the transfer was stopped
                unsafe {
                    hw.start(
                        Direction::Write,
                        tx.ptr.add(offset) as *mut u8,
                        len,
                        true,
                    )
                };
            }
            Action::FinishWrite => {
                // Last byte still in the shift register
                while hw.dma.is_busy() {
                    core::hint::spin_loop();
                }

                hw.deselect();
                xfer.tx = None;
            }
            Action::Deliver => {
                hw.deselect();

                if self.config.pause_after_receive {
                    hw.ready.disable_interrupt();
                }
            }
            // Foreground only
            Action::Reserve | Action::Bootstrap => return false,
        }

        self.state.set(cs, step.next);

        if from != step.next {
            trace!("{:?} -> {:?}", from, step.next);
        }

        step.action == Action::Deliver
    }

    fn deliver(&self, cs: CriticalSection<'_>) {
        let xfer = self.xfer.borrow_ref(cs);
        let packet = &xfer.rx[SPI_HEADER_SIZE..xfer.rx_len];

        match self.handler.borrow_ref_mut(cs).as_mut() {
            Some(handler) => handler.on_packet(packet),
            None => warn!("no handler for packet of {} bytes", packet.len()),
        }
    }
}
