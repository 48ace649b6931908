//! SPI link to the co-processor
//!
//! One [`Link`] is shared between three contexts: the foreground calling
//! [`Link::write`], the ready line interrupt calling [`Link::on_ready_irq`] and
//! the DMA completion interrupt calling [`Link::on_dma_complete`]. Put it in a
//! `static` (e.g. through `static_cell` or `cortex_m::singleton!`) so the
//! interrupt handlers can reach it.
//!
//! Hardware handles and transfer bookkeeping sit behind
//! [`critical_section::Mutex`]es, the state itself is an atomic. The interrupt
//! handlers run entirely inside a critical section, the foreground only enters
//! one for single checks and never while spinning.

mod isr;
mod write;

use crate::config::Config;
use crate::consts::{HCI_HEADER_SIZE, HEADERS_SIZE_EVNT, RX_BUFFER_SIZE, SPI_HEADER_SIZE};
use crate::error::LinkError;
use crate::hal::{Clock, Direction, Instant, ReadyLine, SpiDma};
use crate::rx::RxHandler;
use crate::spin::{Deadline, Spin, SpinError};
use crate::state::{AtomicLinkState, Context, LinkState};
use aligned::{Aligned, A4};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::{CriticalSection, Mutex};
use embedded_hal_02::blocking::delay::DelayUs;
use embedded_hal_02::digital::v2::OutputPin;

/// Word aligned storage for the receive buffer
pub type RxBuffer = Aligned<A4, [u8; RX_BUFFER_SIZE]>;

pub(crate) struct Hardware<DMA, CS, IRQ> {
    dma: DMA,
    cs: CS,
    ready: IRQ,
}

impl<DMA, CS, IRQ> Hardware<DMA, CS, IRQ>
where
    DMA: SpiDma,
    CS: OutputPin,
{
    fn select(&mut self) {
        self.cs.set_low().ok();
    }

    fn deselect(&mut self) {
        self.cs.set_high().ok();
    }

    /// # Safety
    ///
    /// See [`SpiDma::configure`]
    unsafe fn start(&mut self, direction: Direction, buf: *mut u8, len: usize, interrupt: bool) {
        self.dma.disable();
        self.dma.configure(direction, buf, len);
        self.dma.enable(interrupt);
    }
}

/// Frame handed over by [`Link::write`], borrowed until the link is idle again
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingWrite {
    ptr: *const u8,
    len: usize,
}

// SAFETY: The pointer is only dereferenced by the DMA engine while the owning
// `write` call is blocked waiting for the transfer
unsafe impl Send for PendingWrite {}

pub(crate) struct Transfer {
    rx: &'static mut [u8],
    /// Bytes of the receive buffer filled by the current reception
    rx_len: usize,
    tx: Option<PendingWrite>,
    /// A writer owns the first transaction
    bootstrapping: bool,
    open: bool,
}

impl Transfer {
    fn reset(&mut self) {
        self.rx_len = 0;
        self.tx = None;
        self.bootstrapping = false;
    }

    fn holds(&self, frame: PendingWrite) -> bool {
        self.tx.map_or(false, |tx| tx.ptr == frame.ptr)
    }

    fn hci(&self) -> [u8; HCI_HEADER_SIZE] {
        let mut hci = [0; HCI_HEADER_SIZE];
        hci.copy_from_slice(&self.rx[SPI_HEADER_SIZE..HEADERS_SIZE_EVNT]);
        hci
    }
}

pub struct Link<DMA, CS, IRQ, T, H> {
    state: AtomicLinkState,
    abort: AtomicBool,
    config: Config,
    hw: Mutex<RefCell<Hardware<DMA, CS, IRQ>>>,
    timer: Mutex<RefCell<T>>,
    xfer: Mutex<RefCell<Transfer>>,
    handler: Mutex<RefCell<Option<H>>>,
}

impl<DMA, CS, IRQ, T, H> Link<DMA, CS, IRQ, T, H>
where
    DMA: SpiDma,
    CS: OutputPin,
    IRQ: ReadyLine,
    T: Clock + DelayUs<u32>,
    H: RxHandler,
{
    /// Takes the hardware and the receive buffer. The link stays closed, with
    /// chip select released, until [`open`](Self::open).
    ///
    /// # Panics
    ///
    /// If `rx` can't even hold the header window.
    pub fn new(
        dma: DMA,
        mut cs: CS,
        ready: IRQ,
        timer: T,
        rx: &'static mut [u8],
        config: Config,
    ) -> Self {
        assert!(rx.len() > HEADERS_SIZE_EVNT);

        cs.set_high().ok();

        Self {
            state: AtomicLinkState::new(LinkState::PowerUp),
            abort: AtomicBool::new(false),
            config,
            hw: Mutex::new(RefCell::new(Hardware { dma, cs, ready })),
            timer: Mutex::new(RefCell::new(timer)),
            xfer: Mutex::new(RefCell::new(Transfer {
                rx,
                rx_len: 0,
                tx: None,
                bootstrapping: false,
                open: false,
            })),
            handler: Mutex::new(RefCell::new(None)),
        }
    }

    /// Resets the link to [`LinkState::PowerUp`], installs `handler` and
    /// enables the ready line interrupt.
    pub fn open(&self, handler: H) -> Result<(), LinkError<IRQ::Error>> {
        critical_section::with(|cs| {
            self.state.set(cs, LinkState::PowerUp);
            self.abort.store(false, Ordering::Release);

            let mut xfer = self.xfer.borrow_ref_mut(cs);
            xfer.reset();
            xfer.open = true;

            *self.handler.borrow_ref_mut(cs) = Some(handler);

            let mut hw = self.hw.borrow_ref_mut(cs);
            hw.ready.enable_interrupt().map_err(|e| {
                xfer.open = false;
                LinkError::Pin(e)
            })
        })?;

        info!("link open");
        Ok(())
    }

    /// Disables the ready line interrupt, stops any transfer and drops the
    /// handler. A blocked [`write`](Self::write) returns
    /// [`LinkError::Aborted`]. Calling it again does nothing new.
    pub fn close(&self) {
        critical_section::with(|cs| {
            let mut hw = self.hw.borrow_ref_mut(cs);
            hw.ready.disable_interrupt();
            hw.dma.disable();
            hw.deselect();

            let mut xfer = self.xfer.borrow_ref_mut(cs);
            xfer.reset();
            xfer.open = false;

            *self.handler.borrow_ref_mut(cs) = None;
            self.abort.store(true, Ordering::Release);
            self.state.set(cs, LinkState::PowerUp);
        });

        info!("link closed");
    }

    /// Masks the ready line interrupt, the co-processor can't start a transfer
    pub fn pause(&self) {
        critical_section::with(|cs| self.hw.borrow_ref_mut(cs).ready.disable_interrupt());
    }

    pub fn resume(&self) -> Result<(), LinkError<IRQ::Error>> {
        critical_section::with(|cs| self.hw.borrow_ref_mut(cs).ready.enable_interrupt())
            .map_err(LinkError::Pin)
    }

    /// Makes the current and every further [`write`](Self::write) give up with
    /// [`LinkError::Aborted`] until the link is opened again.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn state(&self) -> LinkState {
        self.state.load()
    }

    pub fn is_open(&self) -> bool {
        critical_section::with(|cs| self.xfer.borrow_ref(cs).open)
    }

    /// Releases the hardware and the receive buffer
    pub fn free(self) -> (DMA, CS, IRQ, T, &'static mut [u8]) {
        let Hardware { dma, cs, ready } = self.hw.into_inner().into_inner();
        let xfer = self.xfer.into_inner().into_inner();
        let timer = self.timer.into_inner().into_inner();

        (dma, cs, ready, timer, xfer.rx)
    }

    fn now(&self) -> Instant {
        critical_section::with(|cs| self.timer.borrow_ref_mut(cs).now())
    }

    fn spin(&self) -> Spin<'_> {
        Spin::new(Deadline::new(self.now(), self.config.timeout), &self.abort)
    }

    /// Spins until `done` holds, checking it in a fresh critical section each round
    fn wait<F>(&self, spin: &Spin<'_>, mut done: F) -> Result<(), SpinError>
    where
        F: FnMut(CriticalSection<'_>) -> bool,
    {
        spin.until(|| self.now(), || critical_section::with(&mut done))
    }

    fn context(&self, xfer: &Transfer) -> Context {
        Context {
            window: self.config.window,
            tx_len: xfer.tx.map_or(0, |tx| tx.len),
            hci: xfer.hci(),
        }
    }
}
