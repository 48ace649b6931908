//! SPI link layer for the TI CC3000 network co-processor
//!
//! Moves HCI packets between the host and the co-processor over SPI with DMA.
//! The co-processor signals through an active low "ready" interrupt line: it
//! pulses the line to push a packet and to grant a write the host asked for
//! by asserting chip select.
//!
//! The board provides an [`SpiDma`](hal::SpiDma) implementation, a chip select
//! pin, a [`ReadyLine`](hal::ReadyLine) and a [`Clock`](hal::Clock) that can
//! also delay, and wires the two interrupt vectors to [`Link::on_ready_irq`]
//! and [`Link::on_dma_complete`].

#![cfg_attr(not(test), no_std)]

#[cfg(all(feature = "cm4", feature = "cm0p"))]
compile_error!("features `cm4` and `cm0p` are mutually exclusive, disable default features for the M0+ core");

// Must come first, the macros are used everywhere below
mod fmt;

pub mod config;
pub mod consts;
#[cfg(feature = "cm4")]
pub mod delay;
pub mod error;
pub mod hal;
pub mod header;
pub mod link;
pub mod rx;
pub mod spin;
pub mod state;

pub use config::Config;
pub use error::LinkError;
pub use link::{Link, RxBuffer};
pub use rx::RxHandler;
pub use state::LinkState;
