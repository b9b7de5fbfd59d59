//! In-memory AVR target
//!
//! [`DummyAvr`] answers ISP requests from flash and EEPROM arrays and models
//! the target's page buffer: unpolled flash writes only load the buffer, and
//! nothing reaches flash until the page is flushed. Flash programming can only
//! clear bits, like the real thing; the chip-erase instruction sent through
//! TRANSMIT sets everything back to 0xFF.

use std::collections::VecDeque;

use usbasp_core::target::{Board, IspTransport, TpiTransport};

/// ISP instruction: programming enable (`AC 53 00 00`)
const INSN_PROG_ENABLE: [u8; 2] = [0xAC, 0x53];
/// ISP instruction: chip erase (`AC 80 00 00`)
const INSN_CHIP_ERASE: [u8; 2] = [0xAC, 0x80];
/// ISP instruction: read signature byte (`30 00 nn 00`)
const INSN_READ_SIGNATURE: u8 = 0x30;

/// Geometry of the emulated part
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Signature bytes returned by the read-signature instruction
    pub signature: [u8; 3],
    /// Flash size in bytes
    pub flash_size: usize,
    /// EEPROM size in bytes
    pub eeprom_size: usize,
    /// Flash page size in bytes
    pub page_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            signature: [0x1E, 0x95, 0x0F], // ATmega328P
            flash_size: 32 * 1024,
            eeprom_size: 1024,
            page_size: 128,
        }
    }
}

/// Emulated AVR behind the ISP lines
pub struct DummyAvr {
    config: DummyConfig,
    flash: Vec<u8>,
    eeprom: Vec<u8>,
    page_buffer: Vec<Option<u8>>,
    flushes: Vec<u32>,
    connected: bool,
    sck_option: Option<u8>,
    frame: [u8; 4],
    frame_pos: usize,
}

impl DummyAvr {
    /// Create an erased part with the given geometry
    pub fn new(config: DummyConfig) -> Self {
        Self {
            flash: vec![0xFF; config.flash_size],
            eeprom: vec![0xFF; config.eeprom_size],
            page_buffer: vec![None; config.page_size.max(1)],
            flushes: Vec::new(),
            connected: false,
            sck_option: None,
            frame: [0; 4],
            frame_pos: 0,
            config,
        }
    }

    /// Create an erased ATmega328P
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a part with pre-filled flash
    pub fn with_flash(config: DummyConfig, initial: &[u8]) -> Self {
        let mut avr = Self::new(config);
        let len = initial.len().min(avr.flash.len());
        avr.flash[..len].copy_from_slice(&initial[..len]);
        avr
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// EEPROM contents, mutably
    pub fn eeprom_mut(&mut self) -> &mut [u8] {
        &mut self.eeprom
    }

    /// Base addresses of committed pages, in commit order
    pub fn flushes(&self) -> &[u32] {
        &self.flushes
    }

    /// True while the ISP lines are driven
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// SCK option applied by the last connect
    pub fn sck_option(&self) -> Option<u8> {
        self.sck_option
    }

    /// Bytes loaded into the page buffer but not yet committed
    pub fn pending_page_bytes(&self) -> usize {
        self.page_buffer.iter().filter(|b| b.is_some()).count()
    }

    fn program(&mut self, address: u32, byte: u8) {
        match self.flash.get_mut(address as usize) {
            Some(cell) => *cell &= byte,
            None => log::warn!("dummy: flash write beyond end at 0x{:06X}", address),
        }
    }

    fn page_slot(&self, address: u32) -> usize {
        address as usize % self.page_buffer.len()
    }

    /// Reply byte for the fourth position of a complete instruction
    fn execute_frame(&mut self) -> u8 {
        let frame = self.frame;
        if frame[..2] == INSN_CHIP_ERASE {
            log::debug!("dummy: chip erase");
            self.flash.fill(0xFF);
            self.eeprom.fill(0xFF);
            0
        } else if frame[0] == INSN_READ_SIGNATURE {
            self.config
                .signature
                .get(usize::from(frame[2] & 0x03))
                .copied()
                .unwrap_or(0)
        } else {
            0
        }
    }
}

impl IspTransport for DummyAvr {
    fn connect(&mut self) {
        self.connected = true;
        self.frame_pos = 0;
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn set_sck_option(&mut self, option: u8) {
        self.sck_option = Some(option);
    }

    fn transmit(&mut self, byte: u8) -> u8 {
        if !self.connected {
            return 0xFF;
        }
        self.frame[self.frame_pos] = byte;
        // The target echoes the previous byte while shifting in the next one
        let out = match self.frame_pos {
            0 => 0x00,
            1 | 2 => self.frame[self.frame_pos - 1],
            _ => self.execute_frame(),
        };
        self.frame_pos = (self.frame_pos + 1) % self.frame.len();
        out
    }

    fn enter_programming_mode(&mut self) -> u8 {
        let mut echo = 0;
        for (i, &b) in INSN_PROG_ENABLE.iter().chain(&[0, 0]).enumerate() {
            let r = self.transmit(b);
            if i == 2 {
                echo = r;
            }
        }
        if echo == INSN_PROG_ENABLE[1] {
            0
        } else {
            1
        }
    }

    fn read_flash(&mut self, address: u32) -> u8 {
        self.flash.get(address as usize).copied().unwrap_or(0xFF)
    }

    fn read_eeprom(&mut self, address: u32) -> u8 {
        self.eeprom.get(address as usize).copied().unwrap_or(0xFF)
    }

    fn write_flash(&mut self, address: u32, byte: u8, poll: bool) {
        if poll {
            self.program(address, byte);
        } else {
            let slot = self.page_slot(address);
            self.page_buffer[slot] = Some(byte);
        }
    }

    fn write_eeprom(&mut self, address: u32, byte: u8) {
        match self.eeprom.get_mut(address as usize) {
            Some(cell) => *cell = byte,
            None => log::warn!("dummy: eeprom write beyond end at 0x{:04X}", address),
        }
    }

    fn flush_page(&mut self, address: u32, _last_byte: u8) {
        let page_len = self.page_buffer.len() as u32;
        let base = address - address % page_len;
        log::debug!("dummy: commit page 0x{:06X}", base);
        for offset in 0..page_len {
            if let Some(byte) = self.page_buffer[offset as usize].take() {
                self.program(base + offset, byte);
            }
        }
        self.flushes.push(base);
    }
}

/// Emulated TPI target with a flat 16-bit data space
pub struct DummyTpi {
    memory: Vec<u8>,
    delay: Option<u16>,
    sent: Vec<u8>,
    responses: VecDeque<u8>,
}

impl DummyTpi {
    /// Create a target whose data space reads 0xFF
    pub fn new() -> Self {
        Self {
            memory: vec![0xFF; 0x1_0000],
            delay: None,
            sent: Vec::new(),
            responses: VecDeque::new(),
        }
    }

    /// Data space contents
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Bit delay passed to the last connect, `None` while disconnected
    pub fn delay(&self) -> Option<u16> {
        self.delay
    }

    /// Raw frames sent by the programmer
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Queue a raw frame for the programmer to receive
    pub fn queue_response(&mut self, byte: u8) {
        self.responses.push_back(byte);
    }
}

impl Default for DummyTpi {
    fn default() -> Self {
        Self::new()
    }
}

impl TpiTransport for DummyTpi {
    fn connect(&mut self, delay: u16) {
        self.delay = Some(delay);
    }

    fn disconnect(&mut self) {
        self.delay = None;
    }

    fn send_byte(&mut self, byte: u8) {
        self.sent.push(byte);
    }

    fn recv_byte(&mut self) -> u8 {
        // An idle TPI data line reads high
        self.responses.pop_front().unwrap_or(0xFF)
    }

    fn read_block(&mut self, address: u32, buf: &mut [u8]) {
        for (addr, byte) in (address as usize..).zip(buf.iter_mut()) {
            *byte = self.memory.get(addr).copied().unwrap_or(0xFF);
        }
    }

    fn write_block(&mut self, address: u32, data: &[u8]) {
        for (addr, &byte) in (address as usize..).zip(data) {
            if let Some(cell) = self.memory.get_mut(addr) {
                *cell = byte;
            }
        }
    }
}

/// Board with a jumper and an LED
#[derive(Debug, Default)]
pub struct DummyBoard {
    /// Slow-SCK jumper fitted
    pub slow_sck_jumper: bool,
    /// Busy LED state
    pub busy_led: bool,
}

impl Board for DummyBoard {
    fn slow_sck_jumper(&self) -> bool {
        self.slow_sck_jumper
    }

    fn set_busy_led(&mut self, on: bool) {
        self.busy_led = on;
    }
}
