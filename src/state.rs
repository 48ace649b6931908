//! Link state machine
//!
//! `POWERUP -> INITIALIZED -> IDLE -> {WRITE_*} | {READ_*} -> IDLE`
//!
//! The state is shared between the foreground writer and both interrupt
//! handlers. Reads are plain atomic loads, every store needs a
//! [`CriticalSection`] token so a check-then-set can't be split by an interrupt.
//!
//! [`step`] is the whole transition table. The handlers and the writer feed it
//! an [`Event`] and carry out the returned [`Action`], nothing else decides
//! where the link goes next.

use crate::consts::{HCI_HEADER_SIZE, HEADERS_SIZE_EVNT};
use crate::header::{self, ReadPlan};
use core::sync::atomic::{AtomicU8, Ordering};
use critical_section::CriticalSection;
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LinkState {
    /// Opened, co-processor hasn't signalled yet
    PowerUp,
    /// First ready pulse seen, first transaction still outstanding
    Initialized,
    Idle,
    /// Chip select asserted, waiting for the co-processor to grant the write
    WriteIrqPending,
    /// First window of a split write in flight
    WriteFirstChunkSent,
    /// Last (or only) part of a write in flight
    WriteComplete,
    /// Header window read in flight
    ReadIrqPending,
    /// First payload window of a split read in flight
    ReadFirstChunkReceived,
    /// Last (or only) payload read in flight
    ReadComplete,
}

impl LinkState {
    pub const ALL: [LinkState; 9] = [
        LinkState::PowerUp,
        LinkState::Initialized,
        LinkState::Idle,
        LinkState::WriteIrqPending,
        LinkState::WriteFirstChunkSent,
        LinkState::WriteComplete,
        LinkState::ReadIrqPending,
        LinkState::ReadFirstChunkReceived,
        LinkState::ReadComplete,
    ];

    pub fn is_writing(self) -> bool {
        matches!(
            self,
            LinkState::WriteIrqPending | LinkState::WriteFirstChunkSent | LinkState::WriteComplete
        )
    }
}

/// A transition was requested from a state the link isn't in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Desync {
    pub expected: LinkState,
    pub actual: LinkState,
}

pub struct AtomicLinkState(AtomicU8);

impl AtomicLinkState {
    pub const fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> LinkState {
        match LinkState::try_from(self.0.load(Ordering::Acquire)) {
            Ok(state) => state,
            // only ever stored from a `LinkState`
            Err(_) => unreachable!(),
        }
    }

    /// Unconditional store, returns the previous state
    pub fn set(&self, _cs: CriticalSection<'_>, state: LinkState) -> LinkState {
        let old = self.load();
        self.0.store(state.into(), Ordering::Release);
        old
    }

    /// `from -> to`, or [`Desync`] if the link isn't in `from`
    pub fn transition(
        &self,
        cs: CriticalSection<'_>,
        from: LinkState,
        to: LinkState,
    ) -> Result<(), Desync> {
        let actual = self.load();

        if actual != from {
            return Err(Desync {
                expected: from,
                actual,
            });
        }

        self.set(cs, to);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The ready line is (still) asserted
    Ready,
    /// The DMA engine finished the armed transfer
    DmaComplete,
    /// The foreground wants to send a frame
    WriteRequest,
    /// The synchronous first transaction went out
    Bootstrapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    None,
    /// Assert chip select and read the header window into the receive buffer
    ReadHeader,
    /// Read `len` bytes into the receive buffer at `offset`
    Read { offset: usize, len: usize },
    /// Send `len` bytes of the pending frame starting at `offset`
    Write { offset: usize, len: usize },
    /// Wait for the bus to drain, release chip select, drop the pending frame
    FinishWrite,
    /// Release chip select and hand the received packet over
    Deliver,
    /// Reserve the bus for the pending frame (foreground asserts chip select)
    Reserve,
    /// Perform the synchronous first transaction
    Bootstrap,
}

/// What the transition table needs to know besides the state
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub window: usize,
    /// Length on the wire of the pending frame, envelope included
    pub tx_len: usize,
    /// HCI sub-header of the packet being received
    pub hci: [u8; HCI_HEADER_SIZE],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Step {
    pub next: LinkState,
    pub action: Action,
}

impl Step {
    const fn to(next: LinkState, action: Action) -> Self {
        Self { next, action }
    }

    const fn stay(state: LinkState) -> Self {
        Self::to(state, Action::None)
    }
}

pub fn step(state: LinkState, event: Event, ctx: &Context) -> Step {
    use Event::*;
    use LinkState::*;

    match (state, event) {
        (PowerUp, Ready) => Step::to(Initialized, Action::None),

        (Initialized, WriteRequest) => Step::to(Initialized, Action::Bootstrap),
        (Initialized, Bootstrapped) => Step::to(Idle, Action::None),

        (Idle, Ready) => Step::to(ReadIrqPending, Action::ReadHeader),
        (Idle, WriteRequest) => Step::to(WriteIrqPending, Action::Reserve),

        (WriteIrqPending, Ready) if ctx.tx_len <= ctx.window => Step::to(
            WriteComplete,
            Action::Write {
                offset: 0,
                len: ctx.tx_len,
            },
        ),
        (WriteIrqPending, Ready) => Step::to(
            WriteFirstChunkSent,
            Action::Write {
                offset: 0,
                len: ctx.window,
            },
        ),
        (WriteFirstChunkSent, DmaComplete) => Step::to(
            WriteComplete,
            Action::Write {
                offset: ctx.window,
                len: ctx.tx_len.saturating_sub(ctx.window),
            },
        ),
        (WriteComplete, DmaComplete) => Step::to(Idle, Action::FinishWrite),

        (ReadIrqPending, DmaComplete) => match header::plan_read(&ctx.hci, ctx.window) {
            ReadPlan::Complete => Step::to(Idle, Action::Deliver),
            ReadPlan::Remaining(len) => Step::to(
                ReadComplete,
                Action::Read {
                    offset: HEADERS_SIZE_EVNT,
                    len,
                },
            ),
            ReadPlan::FirstWindow => Step::to(
                ReadFirstChunkReceived,
                Action::Read {
                    offset: HEADERS_SIZE_EVNT,
                    len: ctx.window,
                },
            ),
        },
        (ReadFirstChunkReceived, DmaComplete) => Step::to(
            ReadComplete,
            Action::Read {
                offset: HEADERS_SIZE_EVNT + ctx.window,
                len: header::second_chunk_len(&ctx.hci, ctx.window),
            },
        ),
        (ReadComplete, DmaComplete) => Step::to(Idle, Action::Deliver),

        // Spurious pulses and completions, and write requests the writer has
        // to wait out
        (state, _) => Step::stay(state),
    }
}
