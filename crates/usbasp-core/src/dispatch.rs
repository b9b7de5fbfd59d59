//! Command dispatcher
//!
//! The USB stack drives the [`Dispatcher`] through three callbacks:
//!
//! 1. [`Dispatcher::setup`] once per 8-byte setup packet. Immediate commands
//!    run to completion here and leave their reply in [`Dispatcher::reply`].
//!    Streaming commands only arm a [`StreamState`].
//! 2. [`Dispatcher::read`] for every IN data packet of a streaming read.
//! 3. [`Dispatcher::write`] for every OUT data packet of a streaming write.
//!
//! A read stream ends on the first short packet or when its length is used
//! up. A write stream ends when its length is used up. A packet callback with
//! nothing armed is rejected with [`Error::NotReady`], which the glue reports
//! as [`STATUS_NOT_READY`](crate::protocol::STATUS_NOT_READY).

use crate::error::{Error, Result};
use crate::protocol::{sck, Capabilities, Opcode, SetupPacket, PACKET_SIZE};
use crate::stream::{Span, StreamState};
use crate::target::{Board, FlashPaging, IspTransport, Memory, TargetAccess, TpiTransport};
use crate::uart::{UartChannel, UartConfig, UartHw};

/// Capabilities compiled into this firmware
pub const CAPABILITIES: Capabilities = Capabilities::TPI.union(Capabilities::UART);

/// Outcome of [`Dispatcher::setup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupResponse {
    /// Immediate reply of this many bytes from [`Dispatcher::reply`]
    Reply(usize),
    /// The data stage is served by [`Dispatcher::read`] or [`Dispatcher::write`]
    Stream,
}

/// Outcome of one [`Dispatcher::write`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// More packets are expected
    Pending,
    /// The transfer is complete and the dispatcher is idle again
    Complete,
}

impl WriteStatus {
    /// Value returned to the USB stack from the write callback
    pub const fn wire_status(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Complete => 1,
        }
    }
}

/// USBasp command dispatcher
///
/// Owns the target transports, the board and the mainline half of the UART
/// bridge, plus the single [`StreamState`].
pub struct Dispatcher<'a, B, I, T, H: UartHw, const RX: usize, const TX: usize> {
    board: B,
    target: TargetAccess<I, T>,
    uart: UartChannel<'a, H, RX, TX>,
    state: StreamState,
    /// Latched by SETLONGADDRESS, cleared by CONNECT
    long_address: bool,
    /// Address of the next streamed byte; in long mode it also seeds the next command
    address: u32,
    sck_option: u8,
    reply: [u8; PACKET_SIZE],
}

impl<'a, B, I, T, H, const RX: usize, const TX: usize> Dispatcher<'a, B, I, T, H, RX, TX>
where
    B: Board,
    I: IspTransport,
    T: TpiTransport,
    H: UartHw,
{
    /// Create an idle dispatcher
    pub fn new(board: B, isp: I, tpi: T, uart: UartChannel<'a, H, RX, TX>) -> Self {
        Self {
            board,
            target: TargetAccess::new(isp, tpi),
            uart,
            state: StreamState::Idle,
            long_address: false,
            address: 0,
            sck_option: sck::AUTO,
            reply: [0; PACKET_SIZE],
        }
    }

    /// Reply buffer filled by the last immediate command
    pub fn reply(&self) -> &[u8; PACKET_SIZE] {
        &self.reply
    }

    /// Currently armed stream
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// True while SETLONGADDRESS overrides per-command addresses
    pub fn long_address_mode(&self) -> bool {
        self.long_address
    }

    /// Target transports
    pub fn target(&self) -> &TargetAccess<I, T> {
        &self.target
    }

    /// Target transports, mutably
    pub fn target_mut(&mut self) -> &mut TargetAccess<I, T> {
        &mut self.target
    }

    /// Board
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Mainline half of the UART bridge
    pub fn uart(&self) -> &UartChannel<'a, H, RX, TX> {
        &self.uart
    }

    /// Mainline half of the UART bridge, mutably
    pub fn uart_mut(&mut self) -> &mut UartChannel<'a, H, RX, TX> {
        &mut self.uart
    }

    /// Decode and execute one setup packet
    pub fn setup(&mut self, data: &[u8; PACKET_SIZE]) -> SetupResponse {
        let pkt = SetupPacket::from_bytes(data);
        let Some(opcode) = pkt.opcode() else {
            log::warn!("unknown request {}", pkt.request);
            return SetupResponse::Reply(0);
        };
        log::trace!("setup {:?} {:02X?}", opcode, data);

        let len = match opcode {
            Opcode::Connect => {
                // The UART shares pins with the ISP lines on some boards
                self.uart.disable();
                let option = if self.board.slow_sck_jumper() {
                    sck::SCK_8
                } else {
                    self.sck_option
                };
                self.target.isp_mut().set_sck_option(option);
                self.long_address = false;
                self.board.set_busy_led(true);
                self.target.isp_mut().connect();
                0
            }
            Opcode::Disconnect => {
                self.target.isp_mut().disconnect();
                self.board.set_busy_led(false);
                self.finish();
                0
            }
            Opcode::Transmit => {
                for i in 0..4 {
                    self.reply[i] = self.target.isp_mut().transmit(data[2 + i]);
                }
                4
            }
            Opcode::EnableProg => {
                self.reply[0] = self.target.isp_mut().enter_programming_mode();
                1
            }
            Opcode::SetLongAddress => {
                self.long_address = true;
                self.address = pkt.long_address();
                log::debug!("long address 0x{:08X}", self.address);
                0
            }
            Opcode::SetIspSck => {
                self.sck_option = data[2];
                self.reply[0] = 0;
                1
            }
            Opcode::TpiConnect => {
                self.uart.disable();
                self.target.tpi_mut().connect(pkt.address());
                self.board.set_busy_led(true);
                0
            }
            Opcode::TpiDisconnect => {
                self.target.tpi_mut().disconnect();
                self.board.set_busy_led(false);
                self.finish();
                0
            }
            Opcode::TpiRawRead => {
                self.reply[0] = self.target.tpi_mut().recv_byte();
                1
            }
            Opcode::TpiRawWrite => {
                self.target.tpi_mut().send_byte(data[2]);
                0
            }
            Opcode::UartConfig => {
                let config = UartConfig::from_wire(pkt.address(), pkt.param_a());
                self.uart.configure(&config);
                0
            }
            Opcode::UartFlushTx => {
                self.uart.flush_tx();
                0
            }
            Opcode::UartFlushRx => {
                self.uart.flush_rx();
                0
            }
            Opcode::UartDisable => {
                self.uart.disable();
                0
            }
            Opcode::UartTxFree => {
                let free = self.uart.free_tx_slots();
                self.reply[..2].copy_from_slice(&free.to_be_bytes());
                2
            }
            Opcode::GetCapabilities => {
                self.reply[..4].copy_from_slice(&CAPABILITIES.bits().to_le_bytes());
                4
            }

            Opcode::ReadFlash => return self.arm_read(Memory::Flash, &pkt),
            Opcode::ReadEeprom => return self.arm_read(Memory::Eeprom, &pkt),
            Opcode::TpiReadBlock => return self.arm_read(Memory::Tpi, &pkt),
            Opcode::WriteFlash => {
                let paging = FlashPaging {
                    page_size: pkt.page_size(),
                    flags: pkt.block_flags(),
                };
                self.target.begin_flash_write(&paging);
                let span = Span::new(self.stream_address(&pkt), pkt.length());
                return self.arm(StreamState::WriteFlash { span, paging });
            }
            Opcode::WriteEeprom => {
                let span = Span::new(self.stream_address(&pkt), pkt.length());
                return self.arm(StreamState::WriteEeprom { span });
            }
            Opcode::TpiWriteBlock => {
                let span = Span::new(self.stream_address(&pkt), pkt.length());
                return self.arm(StreamState::WriteTpi { span });
            }
            Opcode::UartTx => {
                return self.arm(StreamState::UartTx {
                    remaining: pkt.length(),
                })
            }
            Opcode::UartRx => {
                return self.arm(StreamState::UartRx {
                    remaining: pkt.length(),
                })
            }
        };
        SetupResponse::Reply(len)
    }

    /// Fill one IN packet of a streaming read
    ///
    /// Returns the number of bytes placed in `buf`. A count below
    /// [`PACKET_SIZE`] ends the transfer.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = match &mut self.state {
            StreamState::Idle => {
                log::warn!("read callback while idle");
                return Err(Error::NotReady);
            }
            StreamState::Read { memory, span } => {
                let n = span.chunk(buf.len());
                self.target.read(*memory, span.cursor, &mut buf[..n]);
                span.advance(n);
                self.address = span.cursor;
                n
            }
            StreamState::UartRx { remaining } => {
                let n = buf.len().min(usize::from(*remaining));
                let got = self.uart.get_bytes(&mut buf[..n]);
                *remaining -= got as u16;
                got
            }
            other => {
                log::warn!("read callback during {:?}", other.operation());
                return Err(Error::WrongDirection);
            }
        };
        log::trace!("read {} bytes, {} left", count, self.state.remaining());

        if count < PACKET_SIZE || self.state.remaining() == 0 {
            self.finish();
        }
        Ok(count)
    }

    /// Consume one OUT packet of a streaming write
    ///
    /// Bytes beyond the announced transfer length are ignored.
    pub fn write(&mut self, data: &[u8]) -> Result<WriteStatus> {
        match &mut self.state {
            StreamState::Idle => {
                log::warn!("write callback while idle");
                return Err(Error::NotReady);
            }
            StreamState::WriteFlash { span, paging } => {
                let n = span.chunk(data.len());
                let ends_transfer = n == usize::from(span.remaining);
                self.target
                    .write_flash(span.cursor, &data[..n], paging, ends_transfer);
                span.advance(n);
                self.address = span.cursor;
            }
            StreamState::WriteEeprom { span } => {
                let n = span.chunk(data.len());
                self.target.write_eeprom(span.cursor, &data[..n]);
                span.advance(n);
                self.address = span.cursor;
            }
            StreamState::WriteTpi { span } => {
                let n = span.chunk(data.len());
                self.target.write_tpi(span.cursor, &data[..n]);
                span.advance(n);
                self.address = span.cursor;
            }
            StreamState::UartTx { remaining } => {
                let n = data.len().min(usize::from(*remaining));
                let taken = self.uart.put_bytes(&data[..n]);
                if taken < n {
                    log::debug!("uart tx ring full, {} of {} bytes dropped", n - taken, n);
                }
                *remaining -= taken as u16;
            }
            other => {
                log::warn!("write callback during {:?}", other.operation());
                return Err(Error::WrongDirection);
            }
        }
        log::trace!("wrote packet, {} left", self.state.remaining());

        if self.state.remaining() == 0 {
            self.finish();
            Ok(WriteStatus::Complete)
        } else {
            Ok(WriteStatus::Pending)
        }
    }

    /// Start address of a streaming command: the latched long address if
    /// SETLONGADDRESS was issued, the packet's 16-bit address otherwise
    fn stream_address(&mut self, pkt: &SetupPacket) -> u32 {
        if !self.long_address {
            self.address = u32::from(pkt.address());
        }
        self.address
    }

    fn arm_read(&mut self, memory: Memory, pkt: &SetupPacket) -> SetupResponse {
        let span = Span::new(self.stream_address(pkt), pkt.length());
        self.arm(StreamState::Read { memory, span })
    }

    fn arm(&mut self, state: StreamState) -> SetupResponse {
        if !self.state.is_idle() {
            log::debug!("{:?} abandoned", self.state.operation());
        }
        log::debug!(
            "stream {:?} at {:?}, {} bytes",
            state.operation(),
            state.cursor(),
            state.remaining()
        );
        self.state = state;
        SetupResponse::Stream
    }

    fn finish(&mut self) {
        self.state = StreamState::Idle;
    }
}
