// SPI envelope

pub const SPI_HEADER_SIZE: usize = 5;

pub const WRITE: u8 = 0x01;
pub const READ: u8 = 0x03;

/// Bytes clocked out on MOSI while reading from the co-processor
pub const READ_COMMAND: [u8; SPI_HEADER_SIZE] = [READ, 0, 0, 0, 0];

// HCI packets

pub const HCI_TYPE_CMND: u8 = 0x01;
pub const HCI_TYPE_DATA: u8 = 0x02;
pub const HCI_TYPE_PATCH: u8 = 0x03;
pub const HCI_TYPE_EVNT: u8 = 0x04;

pub const HCI_HEADER_SIZE: usize = 5;

// Offsets relative to the start of the HCI sub-header
pub const HCI_PACKET_TYPE_OFFSET: usize = 0;
pub const HCI_DATA_LENGTH_OFFSET: usize = 3;
pub const HCI_EVENT_LENGTH_OFFSET: usize = 3;

/// Size of the first read of every inbound packet. Payload reads land right behind it.
pub const HEADERS_SIZE_EVNT: usize = SPI_HEADER_SIZE + HCI_HEADER_SIZE;

// Sizes

pub const SPI_WINDOW_SIZE: usize = 1024;

// CC3000 maximal rx size (1519) + 1
pub const RX_BUFFER_SIZE: usize = 1519 + 1;

// Bootstrap transaction

pub const FIRST_WRITE_HEAD: usize = 4;
pub const FIRST_WRITE_SETTLE_US: u32 = 50;
