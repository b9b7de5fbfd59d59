//! Streaming state carried between packets of one control transfer

use crate::target::{FlashPaging, Memory};

/// Address cursor and byte budget of a memory transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Next target address
    pub cursor: u32,
    /// Bytes still expected in this transfer
    pub remaining: u16,
}

impl Span {
    /// Span starting at `cursor` covering `len` bytes
    pub fn new(cursor: u32, len: u16) -> Self {
        Self {
            cursor,
            remaining: len,
        }
    }

    /// How many bytes of a `capacity`-byte packet belong to this span
    pub fn chunk(&self, capacity: usize) -> usize {
        capacity.min(usize::from(self.remaining))
    }

    /// Move past `n` transferred bytes
    pub fn advance(&mut self, n: usize) {
        let n = u16::try_from(n).unwrap_or(u16::MAX).min(self.remaining);
        self.cursor = self.cursor.wrapping_add(u32::from(n));
        self.remaining -= n;
    }
}

/// Operation kind, without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// No transfer armed
    Idle,
    /// Flash to host
    ReadFlash,
    /// EEPROM to host
    ReadEeprom,
    /// TPI memory to host
    ReadTpi,
    /// UART receive ring to host
    UartRx,
    /// Host to flash
    WriteFlash,
    /// Host to EEPROM
    WriteEeprom,
    /// Host to TPI memory
    WriteTpi,
    /// Host to UART transmit ring
    UartTx,
}

/// The operation armed by the last setup packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Nothing armed; packet callbacks are rejected
    #[default]
    Idle,
    /// Read from flash, EEPROM or TPI memory
    Read {
        /// Source memory
        memory: Memory,
        /// Position and budget
        span: Span,
    },
    /// Program flash, optionally page by page
    WriteFlash {
        /// Position and budget
        span: Span,
        /// Page size and block flags of the command
        paging: FlashPaging,
    },
    /// Program EEPROM byte by byte
    WriteEeprom {
        /// Position and budget
        span: Span,
    },
    /// Write TPI memory
    WriteTpi {
        /// Position and budget
        span: Span,
    },
    /// Drain the UART receive ring
    UartRx {
        /// Bytes the host may still read
        remaining: u16,
    },
    /// Fill the UART transmit ring
    UartTx {
        /// Bytes the host still has to send
        remaining: u16,
    },
}

impl StreamState {
    /// Operation kind
    pub fn operation(&self) -> Operation {
        match self {
            Self::Idle => Operation::Idle,
            Self::Read {
                memory: Memory::Flash,
                ..
            } => Operation::ReadFlash,
            Self::Read {
                memory: Memory::Eeprom,
                ..
            } => Operation::ReadEeprom,
            Self::Read {
                memory: Memory::Tpi,
                ..
            } => Operation::ReadTpi,
            Self::UartRx { .. } => Operation::UartRx,
            Self::WriteFlash { .. } => Operation::WriteFlash,
            Self::WriteEeprom { .. } => Operation::WriteEeprom,
            Self::WriteTpi { .. } => Operation::WriteTpi,
            Self::UartTx { .. } => Operation::UartTx,
        }
    }

    /// Bytes still expected, 0 when idle
    pub fn remaining(&self) -> u16 {
        match self {
            Self::Idle => 0,
            Self::Read { span, .. }
            | Self::WriteFlash { span, .. }
            | Self::WriteEeprom { span }
            | Self::WriteTpi { span } => span.remaining,
            Self::UartRx { remaining } | Self::UartTx { remaining } => *remaining,
        }
    }

    /// Next target address of a memory operation
    pub fn cursor(&self) -> Option<u32> {
        match self {
            Self::Read { span, .. }
            | Self::WriteFlash { span, .. }
            | Self::WriteEeprom { span }
            | Self::WriteTpi { span } => Some(span.cursor),
            _ => None,
        }
    }

    /// True when nothing is armed
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
