//! usbasp-core - Control core of a USB-attached AVR programmer
//!
//! This crate contains the device-side logic that turns 8-byte USB setup
//! packets into programming operations. It is `no_std` and owns no hardware:
//! the ISP/TPI line protocols, the UART registers and the USB stack are all
//! supplied by the firmware through traits.
//!
//! # Layout
//!
//! - [`protocol`] - opcodes, capability bits and setup packet decoding
//! - [`ring`] - single-producer/single-consumer byte ring for interrupt use
//! - [`uart`] - UART channel built from two rings and a [`uart::UartHw`]
//! - [`target`] - ISP/TPI transport traits and the [`target::TargetAccess`] layer
//! - [`stream`] - the streaming state carried between packets
//! - [`dispatch`] - the [`dispatch::Dispatcher`] implementing the three USB callbacks
//!
//! # Example
//!
//! ```ignore
//! use usbasp_core::dispatch::{Dispatcher, SetupResponse};
//! use usbasp_core::ring::RingBuffer;
//!
//! static RX: StaticCell<RingBuffer<256>> = StaticCell::new();
//! static TX: StaticCell<RingBuffer<256>> = StaticCell::new();
//!
//! let (rx_prod, rx_cons) = RX.init(RingBuffer::new()).split();
//! let (tx_prod, tx_cons) = TX.init(RingBuffer::new()).split();
//! let uart = UartChannel::new(&UART_REGS, rx_cons, tx_prod);
//! let irq = UartInterrupts::new(&UART_REGS, rx_prod, tx_cons);
//! let mut dispatcher = Dispatcher::new(board, isp, tpi, uart);
//!
//! match dispatcher.setup(&packet) {
//!     SetupResponse::Reply(len) => send(&dispatcher.reply()[..len]),
//!     SetupResponse::Stream => { /* read()/write() follow */ }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod ring;
pub mod stream;
pub mod target;
pub mod uart;

pub use error::{Error, Result};
