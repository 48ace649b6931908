//! Packet header codec
//!
//! Every transfer starts with a 5 byte envelope. Outbound frames carry
//! `[WRITE, len_hi, len_lo, 0, 0]`. Inbound frames are read in two steps: first
//! [`HEADERS_SIZE_EVNT`] bytes (envelope + HCI sub-header), then whatever the
//! sub-header announces, rounded so the total transfer length is even.
//!
//! The two parity rules below are not symmetric. Data packets are padded when
//! `HEADERS_SIZE_EVNT + len` is even, events when it is odd. The co-processor
//! firmware expects exactly this, keep it.

use crate::consts::{
    HCI_DATA_LENGTH_OFFSET, HCI_EVENT_LENGTH_OFFSET, HCI_HEADER_SIZE, HCI_PACKET_TYPE_OFFSET,
    HEADERS_SIZE_EVNT, SPI_HEADER_SIZE, WRITE,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Command = 0x01,
    Data = 0x02,
    Patch = 0x03,
    Event = 0x04,
}

/// What the read path has to do after the header window arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadPlan {
    /// The whole packet is already in the buffer
    Complete,
    /// Read this many more bytes (padding included), then the packet is complete
    Remaining(usize),
    /// Read exactly one window, the rest follows in a second transfer
    FirstWindow,
}

impl ReadPlan {
    /// Number of bytes the next DMA read moves
    pub fn len(&self, window: usize) -> usize {
        match *self {
            ReadPlan::Complete => 0,
            ReadPlan::Remaining(n) => n,
            ReadPlan::FirstWindow => window,
        }
    }
}

/// Padding rule for data packets: one extra byte when the total is even.
#[inline]
pub const fn data_padding(len: usize) -> usize {
    if (HEADERS_SIZE_EVNT + len) & 1 == 0 {
        1
    } else {
        0
    }
}

/// Padding rule for event packets: one extra byte when the total is odd.
#[inline]
pub const fn event_padding(len: usize) -> usize {
    (HEADERS_SIZE_EVNT + len) & 1
}

/// Envelope padding for outbound frames: one byte when the payload length is even.
#[inline]
pub const fn write_padding(len: usize) -> usize {
    if len & 1 == 0 {
        1
    } else {
        0
    }
}

/// Stamps the envelope into `buf[..SPI_HEADER_SIZE]` for a payload of `len`
/// bytes stored at `buf[SPI_HEADER_SIZE..]` and zeroes the padding byte if one is
/// needed.
///
/// Returns the number of bytes that go on the wire, or `None` if `buf` can't
/// hold them or the length doesn't fit the 16 bit length field.
pub fn stamp_envelope(buf: &mut [u8], len: usize) -> Option<usize> {
    if len > u16::MAX as usize {
        return None;
    }

    let padded = len + write_padding(len);
    let total = SPI_HEADER_SIZE + padded;

    if padded > u16::MAX as usize || buf.len() < total {
        return None;
    }

    let [hi, lo] = (padded as u16).to_be_bytes();
    buf[..SPI_HEADER_SIZE].copy_from_slice(&[WRITE, hi, lo, 0, 0]);

    if padded != len {
        buf[total - 1] = 0;
    }

    Some(total)
}

/// Decodes the packet type of an HCI sub-header
pub fn packet_type(hci: &[u8]) -> Option<PacketType> {
    hci.get(HCI_PACKET_TYPE_OFFSET)
        .and_then(|&t| PacketType::try_from(t).ok())
}

fn data_length(hci: &[u8]) -> usize {
    u16::from_le_bytes([
        hci[HCI_DATA_LENGTH_OFFSET],
        hci[HCI_DATA_LENGTH_OFFSET + 1],
    ]) as usize
}

/// Decides how the rest of a packet is read, given its HCI sub-header.
///
/// Packet types other than data and event have nothing to read at this layer
/// and come back as [`ReadPlan::Complete`].
pub fn plan_read(hci: &[u8; HCI_HEADER_SIZE], window: usize) -> ReadPlan {
    match packet_type(hci) {
        Some(PacketType::Data) => {
            let len = data_length(hci);

            if len >= window {
                ReadPlan::FirstWindow
            } else {
                // never zero, a data packet always reads at least the padding byte
                ReadPlan::Remaining(len + data_padding(len))
            }
        }
        Some(PacketType::Event) => {
            // the length byte counts the status byte, which came with the header
            let len = (hci[HCI_EVENT_LENGTH_OFFSET] as usize).saturating_sub(1);
            let len = len + event_padding(len);

            if len == 0 {
                ReadPlan::Complete
            } else {
                ReadPlan::Remaining(len)
            }
        }
        _ => ReadPlan::Complete,
    }
}

/// Length of the second read of a data packet that was split at `window`
pub fn second_chunk_len(hci: &[u8; HCI_HEADER_SIZE], window: usize) -> usize {
    let rest = data_length(hci).saturating_sub(window);

    rest + data_padding(rest)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consts::{HCI_TYPE_CMND, HCI_TYPE_DATA, HCI_TYPE_EVNT, HCI_TYPE_PATCH};

    const WINDOW: usize = 64;

    fn data(len: u16) -> [u8; HCI_HEADER_SIZE] {
        let [lo, hi] = len.to_le_bytes();
        [HCI_TYPE_DATA, 0x81, 0x00, lo, hi]
    }

    fn event(len: u8) -> [u8; HCI_HEADER_SIZE] {
        [HCI_TYPE_EVNT, 0x01, 0x40, len, 0x00]
    }

    #[test]
    fn stamps_odd_payload_without_padding() {
        let mut buf = [0x02, 0, 0, 0, 0, 0xAA, 0xBB, 0xCC];

        assert_eq!(stamp_envelope(&mut buf, 3), Some(8));
        assert_eq!(buf, [WRITE, 0x00, 0x03, 0, 0, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn stamps_even_payload_with_padding() {
        let mut buf = [0xFF; 12];

        assert_eq!(stamp_envelope(&mut buf, 4), Some(10));
        assert_eq!(&buf[..5], &[WRITE, 0x00, 0x05, 0, 0]);
        assert_eq!(buf[9], 0);
        // untouched past the frame
        assert_eq!(buf[10], 0xFF);
    }

    #[test]
    fn stamps_big_endian_length() {
        let mut buf = [0; 5 + 0x0123];

        assert_eq!(stamp_envelope(&mut buf, 0x0123), Some(5 + 0x0123));
        assert_eq!(&buf[..5], &[WRITE, 0x01, 0x23, 0, 0]);
    }

    #[test]
    fn rejects_short_buffer() {
        // 4 bytes payload need 5 + 4 + 1
        let mut buf = [0; 9];
        assert_eq!(stamp_envelope(&mut buf, 4), None);
        assert_eq!(buf, [0; 9]);
    }

    #[test]
    fn rejects_length_beyond_length_field() {
        let mut buf = [0; 8];

        for len in [0x1_0000, usize::MAX - 1, usize::MAX] {
            assert_eq!(stamp_envelope(&mut buf, len), None, "len {}", len);
        }
        assert_eq!(buf, [0; 8]);

        let mut buf = vec![0; SPI_HEADER_SIZE + 0xFFFF];
        assert_eq!(stamp_envelope(&mut buf, 0xFFFE), Some(SPI_HEADER_SIZE + 0xFFFF));
        assert_eq!(buf[..SPI_HEADER_SIZE], [WRITE, 0xFF, 0xFF, 0, 0]);
    }

    #[test]
    fn data_parity_fires_on_even_total() {
        for len in 0..=(2 * WINDOW) {
            let pad = data_padding(len);
            assert_eq!(pad == 1, (HEADERS_SIZE_EVNT + len) % 2 == 0, "len {}", len);
        }
    }

    #[test]
    fn event_parity_fires_on_odd_total() {
        for len in 0..=(2 * WINDOW) {
            let pad = event_padding(len);
            assert_eq!(pad == 1, (HEADERS_SIZE_EVNT + len) % 2 == 1, "len {}", len);
        }
    }

    #[test]
    fn event_table() {
        // (length byte, bytes left to read)
        let table: &[(u8, ReadPlan)] = &[
            (0, ReadPlan::Complete),
            (1, ReadPlan::Complete),
            (2, ReadPlan::Remaining(2)),
            (3, ReadPlan::Remaining(2)),
            (4, ReadPlan::Remaining(4)),
            (5, ReadPlan::Remaining(4)),
            (6, ReadPlan::Remaining(6)),
            (7, ReadPlan::Remaining(6)),
        ];

        for &(len, plan) in table {
            assert_eq!(plan_read(&event(len), WINDOW), plan, "len {}", len);
        }

        for len in 2..=(2 * WINDOW) {
            let rest = len - 1;
            let expected = if rest % 2 == 1 { rest + 1 } else { rest };
            assert_eq!(
                plan_read(&event(len as u8), WINDOW),
                ReadPlan::Remaining(expected)
            );
        }
    }

    #[test]
    fn data_table() {
        for len in 0..(WINDOW as u16) {
            let l = len as usize;
            let expected = if l % 2 == 0 { l + 1 } else { l };
            assert_eq!(plan_read(&data(len), WINDOW), ReadPlan::Remaining(expected));
        }

        for len in (WINDOW as u16)..=(2 * WINDOW as u16) {
            assert_eq!(plan_read(&data(len), WINDOW), ReadPlan::FirstWindow);
        }
    }

    #[test]
    fn window_split_sums_to_padded_length() {
        for len in (WINDOW + 1)..=(3 * WINDOW) {
            let hci = data(len as u16);
            let first = plan_read(&hci, WINDOW).len(WINDOW);
            let second = second_chunk_len(&hci, WINDOW);

            assert_eq!(first, WINDOW);
            assert_eq!(first + second, len + data_padding(len - WINDOW));
        }
    }

    #[test]
    fn unknown_types_have_nothing_to_read() {
        for t in [0x00, HCI_TYPE_CMND, HCI_TYPE_PATCH, 0x05, 0xFF] {
            let hci = [t, 0, 0, 0x10, 0x00];
            assert_eq!(plan_read(&hci, WINDOW), ReadPlan::Complete);
        }
    }
}
