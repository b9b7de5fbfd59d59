//! Error types for usbasp-core
//!
//! The dispatcher never retries and never panics; every failure it can report
//! is a protocol-state error that the USB glue turns into the 0xFF status.

use core::fmt;

use crate::protocol::STATUS_NOT_READY;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A packet callback arrived while no streaming command is active
    NotReady,
    /// A packet callback arrived for the opposite direction of the active stream
    WrongDirection,
}

impl Error {
    /// Status byte reported to the USB stack in place of a length
    pub const fn wire_status(self) -> u8 {
        STATUS_NOT_READY
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "no streaming transfer in progress"),
            Self::WrongDirection => write!(f, "packet direction does not match the active transfer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
