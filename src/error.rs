use crate::spin::SpinError;
use crate::state::{Desync, LinkState};
use core::fmt;

/// Errors surfaced to the foreground. `E` is the ready line driver's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    /// The ready line interrupt couldn't be enabled
    Pin(E),
    NotOpen,
    /// The buffer can't hold envelope, payload and padding
    BufferTooSmall,
    /// The payload doesn't fit the envelope's 16 bit length field
    PayloadTooLarge,
    /// The co-processor didn't finish the transaction in time
    Timeout,
    /// [`Link::abort`](crate::link::Link::abort) was called while waiting
    Aborted,
    /// Driver and bus disagree about the link state
    Desync {
        expected: LinkState,
        actual: LinkState,
    },
}

impl<E> From<SpinError> for LinkError<E> {
    fn from(e: SpinError) -> Self {
        match e {
            SpinError::Timeout => Self::Timeout,
            SpinError::Aborted => Self::Aborted,
        }
    }
}

impl<E> From<Desync> for LinkError<E> {
    fn from(d: Desync) -> Self {
        Self::Desync {
            expected: d.expected,
            actual: d.actual,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for LinkError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin(e) => write!(f, "ready line error: {:?}", e),
            Self::NotOpen => f.write_str("link not open"),
            Self::BufferTooSmall => f.write_str("buffer too small for frame"),
            Self::PayloadTooLarge => f.write_str("payload too large"),
            Self::Timeout => f.write_str("bus timeout"),
            Self::Aborted => f.write_str("aborted"),
            Self::Desync { expected, actual } => {
                write!(f, "link desync: expected {:?}, found {:?}", expected, actual)
            }
        }
    }
}
