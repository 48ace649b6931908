//! Receive side hand-over
//!
//! Received packets are passed to an [`RxHandler`] straight from the DMA
//! interrupt. Anything that takes time belongs in the foreground: queue the
//! packet with the [`heapless::spsc::Producer`] implementation and drain the
//! [`Consumer`](heapless::spsc::Consumer) from the main loop.

use crate::consts::{RX_BUFFER_SIZE, SPI_HEADER_SIZE};

/// Largest packet the link can hand over (HCI header, payload and padding)
pub const PACKET_CAPACITY: usize = RX_BUFFER_SIZE - SPI_HEADER_SIZE;

pub type Packet = heapless::Vec<u8, PACKET_CAPACITY>;

pub type PacketQueue<const N: usize> = heapless::spsc::Queue<Packet, N>;

/// Consumer of received packets.
///
/// Runs in interrupt context with the link already idle and chip select
/// released. It must not block and must not call
/// [`Link::write`](crate::link::Link::write), which would spin forever.
pub trait RxHandler {
    /// `packet` starts at the HCI sub-header and includes the padding byte, if any
    fn on_packet(&mut self, packet: &[u8]);
}

impl<F> RxHandler for F
where
    F: FnMut(&[u8]),
{
    fn on_packet(&mut self, packet: &[u8]) {
        self(packet)
    }
}

impl<'a, const N: usize> RxHandler for heapless::spsc::Producer<'a, Packet, N> {
    fn on_packet(&mut self, packet: &[u8]) {
        let packet = match Packet::from_slice(packet) {
            Ok(p) => p,
            Err(()) => {
                warn!("rx packet of {} bytes too large for queue", packet.len());
                return;
            }
        };

        if let Err(p) = self.enqueue(packet) {
            warn!("rx queue full, dropping {} bytes", p.len());
        }
    }
}
