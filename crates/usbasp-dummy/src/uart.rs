//! UART peripheral model
//!
//! [`LoopbackUart`] stands in for the register block. Bytes injected with
//! [`inject`](LoopbackUart::inject) wait on the line until the receive
//! interrupt is serviced; bytes the transmit interrupt writes out are
//! collected, and in loopback mode fed straight back to the receiver.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use usbasp_core::uart::{UartConfig, UartHw, UartInterrupts};

/// Register-level UART model
#[derive(Debug, Default)]
pub struct LoopbackUart {
    loopback: bool,
    config: Cell<Option<UartConfig>>,
    rx_irq: Cell<bool>,
    tx_irq: Cell<bool>,
    line_in: RefCell<VecDeque<u8>>,
    line_out: RefCell<Vec<u8>>,
}

impl LoopbackUart {
    /// UART whose transmitter is not connected to anything
    pub fn new() -> Self {
        Self::default()
    }

    /// UART with TX wired to RX
    pub fn with_loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Active line parameters, `None` while disabled
    pub fn config(&self) -> Option<UartConfig> {
        self.config.get()
    }

    /// True while the receiver and transmitter are enabled
    pub fn is_enabled(&self) -> bool {
        self.config.get().is_some()
    }

    /// True while the transmit-ready interrupt is armed
    pub fn tx_armed(&self) -> bool {
        self.tx_irq.get()
    }

    /// Put bytes on the receive line
    pub fn inject(&self, data: &[u8]) {
        self.line_in.borrow_mut().extend(data.iter().copied());
    }

    /// Bytes waiting on the receive line
    pub fn line_pending(&self) -> usize {
        self.line_in.borrow().len()
    }

    /// Take everything transmitted so far
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut *self.line_out.borrow_mut())
    }

    /// Run the interrupt vectors until both directions are idle
    ///
    /// Received bytes are only delivered while the UART is enabled and its
    /// receive interrupt is unmasked.
    pub fn service<const RX: usize, const TX: usize>(
        &self,
        irq: &mut UartInterrupts<'_, Self, RX, TX>,
    ) {
        loop {
            let mut progressed = false;
            while self.is_enabled() && self.rx_irq.get() && self.line_pending() > 0 {
                irq.on_receive();
                progressed = true;
            }
            while self.tx_irq.get() {
                irq.on_transmit_ready();
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }
}

impl UartHw for LoopbackUart {
    fn disable(&self) {
        self.config.set(None);
        self.rx_irq.set(false);
        self.tx_irq.set(false);
    }

    fn enable(&self, config: &UartConfig) {
        self.config.set(Some(*config));
        self.rx_irq.set(true);
    }

    fn set_rx_interrupt(&self, enabled: bool) {
        self.rx_irq.set(enabled);
    }

    fn set_tx_ready_interrupt(&self, enabled: bool) {
        self.tx_irq.set(enabled);
    }

    fn read_data(&self) -> u8 {
        self.line_in.borrow_mut().pop_front().unwrap_or(0)
    }

    fn write_data(&self, byte: u8) {
        if self.loopback {
            self.line_in.borrow_mut().push_back(byte);
        } else {
            self.line_out.borrow_mut().push(byte);
        }
    }
}
