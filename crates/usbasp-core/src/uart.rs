//! UART bridge built from two byte rings
//!
//! The UART is split into two halves that run in different contexts:
//!
//! - [`UartChannel`] is used by the USB command code. It consumes the receive
//!   ring and produces into the transmit ring.
//! - [`UartInterrupts`] is called from the receive-complete and
//!   transmit-ready interrupt vectors. It produces into the receive ring and
//!   consumes the transmit ring.
//!
//! Both halves talk to the peripheral through a shared [`UartHw`] reference.
//! Overrun policy: a byte received while the receive ring is full is dropped
//! without any error. A full transmit ring rejects new bytes; the host is
//! expected to poll the free-space query and retry.

use crate::protocol::uart_flags;
use crate::ring::{Consumer, Producer};

/// Parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

/// Character size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 5 bits
    Five,
    /// 6 bits
    Six,
    /// 7 bits
    Seven,
    /// 8 bits
    #[default]
    Eight,
    /// 9 bits
    Nine,
}

impl DataBits {
    /// Build from a bit count (5..=9)
    pub fn from_count(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(Self::Five),
            6 => Some(Self::Six),
            7 => Some(Self::Seven),
            8 => Some(Self::Eight),
            9 => Some(Self::Nine),
            _ => None,
        }
    }

    /// Bit count
    pub fn count(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Nine => 9,
        }
    }
}

/// Line parameters of the UART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    /// Value for the baud rate register
    pub baud_divisor: u16,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Character size
    pub data_bits: DataBits,
}

impl UartConfig {
    /// Decode the UART_CONFIG wire form
    ///
    /// Reserved parity values fall back to no parity and reserved character
    /// sizes to 5 bits, which is what the register defaults produce.
    pub fn from_wire(baud_divisor: u16, flags: u8) -> Self {
        let parity = match flags & uart_flags::PARITY_MASK {
            uart_flags::PARITY_EVEN => Parity::Even,
            uart_flags::PARITY_ODD => Parity::Odd,
            _ => Parity::None,
        };
        let stop_bits = if flags & uart_flags::STOP_MASK == uart_flags::STOP_2BIT {
            StopBits::Two
        } else {
            StopBits::One
        };
        let data_bits = match flags & uart_flags::BYTES_MASK {
            uart_flags::BYTES_6B => DataBits::Six,
            uart_flags::BYTES_7B => DataBits::Seven,
            uart_flags::BYTES_8B => DataBits::Eight,
            uart_flags::BYTES_9B => DataBits::Nine,
            _ => DataBits::Five,
        };
        Self {
            baud_divisor,
            parity,
            stop_bits,
            data_bits,
        }
    }

    /// Encode the flags byte of UART_CONFIG
    pub fn flags(&self) -> u8 {
        let parity = match self.parity {
            Parity::None => uart_flags::PARITY_NONE,
            Parity::Even => uart_flags::PARITY_EVEN,
            Parity::Odd => uart_flags::PARITY_ODD,
        };
        let stop = match self.stop_bits {
            StopBits::One => uart_flags::STOP_1BIT,
            StopBits::Two => uart_flags::STOP_2BIT,
        };
        let bytes = match self.data_bits {
            DataBits::Five => uart_flags::BYTES_5B,
            DataBits::Six => uart_flags::BYTES_6B,
            DataBits::Seven => uart_flags::BYTES_7B,
            DataBits::Eight => uart_flags::BYTES_8B,
            DataBits::Nine => uart_flags::BYTES_9B,
        };
        parity | stop | bytes
    }
}

/// UART peripheral registers
///
/// All methods take `&self`: the same peripheral is driven from mainline code
/// and from interrupt handlers, like a PAC register block.
pub trait UartHw {
    /// Clear all enable and interrupt-enable bits. Safe to call repeatedly.
    fn disable(&self);

    /// Program the line parameters, then enable receiver, transmitter and the
    /// receive-complete interrupt
    fn enable(&self, config: &UartConfig);

    /// Enable or disable the receive-complete interrupt
    fn set_rx_interrupt(&self, enabled: bool);

    /// Enable or disable the transmit-ready (data register empty) interrupt
    fn set_tx_ready_interrupt(&self, enabled: bool);

    /// Read the received character
    fn read_data(&self) -> u8;

    /// Load a character into the transmit register
    fn write_data(&self, byte: u8);
}

/// Mainline half of the UART bridge
pub struct UartChannel<'a, H: UartHw, const RX: usize, const TX: usize> {
    hw: &'a H,
    rx: Consumer<'a, RX>,
    tx: Producer<'a, TX>,
}

impl<'a, H: UartHw, const RX: usize, const TX: usize> UartChannel<'a, H, RX, TX> {
    /// Create the channel from the consumer end of the receive ring and the
    /// producer end of the transmit ring
    pub fn new(hw: &'a H, rx: Consumer<'a, RX>, tx: Producer<'a, TX>) -> Self {
        Self { hw, rx, tx }
    }

    /// Disable the UART, drop both queues and restart with `config`
    pub fn configure(&mut self, config: &UartConfig) {
        self.hw.disable();
        self.tx.flush();
        self.rx.flush();
        log::debug!(
            "uart: divisor {} {:?} {:?} {:?}",
            config.baud_divisor,
            config.data_bits,
            config.parity,
            config.stop_bits
        );
        self.hw.enable(config);
    }

    /// Stop the UART
    pub fn disable(&mut self) {
        self.hw.disable();
    }

    /// Drop bytes queued for transmission
    pub fn flush_tx(&mut self) {
        self.tx.flush();
    }

    /// Drop received bytes not yet fetched
    pub fn flush_rx(&mut self) {
        self.rx.flush();
    }

    /// Queue one byte for transmission; `false` if the ring is full
    pub fn put_byte(&mut self, byte: u8) -> bool {
        if self.tx.is_full() {
            return false;
        }
        self.tx.push(byte);
        self.hw.set_tx_ready_interrupt(true);
        true
    }

    /// Queue as many bytes of `data` as fit, returning how many were taken
    pub fn put_bytes(&mut self, data: &[u8]) -> usize {
        data.iter().take_while(|&&b| self.put_byte(b)).count()
    }

    /// Fetch one received byte
    pub fn get_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            return None;
        }
        Some(self.rx.pop())
    }

    /// Fill `buf` from the receive ring, returning how many bytes were copied
    pub fn get_bytes(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.get_byte() {
                Some(b) => *slot = b,
                None => break,
            }
            count += 1;
        }
        count
    }

    /// Remaining transmit ring capacity
    pub fn free_tx_slots(&self) -> u16 {
        u16::try_from(self.tx.free_slots()).unwrap_or(u16::MAX)
    }
}

/// Interrupt half of the UART bridge
pub struct UartInterrupts<'a, H: UartHw, const RX: usize, const TX: usize> {
    hw: &'a H,
    rx: Producer<'a, RX>,
    tx: Consumer<'a, TX>,
}

impl<'a, H: UartHw, const RX: usize, const TX: usize> UartInterrupts<'a, H, RX, TX> {
    /// Create the interrupt half from the producer end of the receive ring and
    /// the consumer end of the transmit ring
    pub fn new(hw: &'a H, rx: Producer<'a, RX>, tx: Consumer<'a, TX>) -> Self {
        Self { hw, rx, tx }
    }

    /// Receive-complete handler
    ///
    /// The vector masks its own source on entry so the USB interrupt can
    /// preempt it; the source is unmasked again only after the byte is
    /// queued (or dropped when the ring is full).
    pub fn on_receive(&mut self) {
        self.hw.set_rx_interrupt(false);
        let byte = self.hw.read_data();
        if !self.rx.is_full() {
            self.rx.push(byte);
        }
        self.hw.set_rx_interrupt(true);
    }

    /// Transmit-ready handler
    ///
    /// The source is level-triggered, so it stays masked once the transmit
    /// ring runs dry. [`UartChannel::put_byte`] unmasks it again.
    pub fn on_transmit_ready(&mut self) {
        self.hw.set_tx_ready_interrupt(false);
        if !self.tx.is_empty() {
            self.hw.write_data(self.tx.pop());
            self.hw.set_tx_ready_interrupt(true);
        }
    }
}
