//! USBasp protocol constants and types
//!
//! Every command is a standard 8-byte USB setup packet on EP0. The vendor
//! request number is the opcode; `wValue`, `wIndex` and `wLength` carry the
//! opcode-specific parameters.

use bitflags::bitflags;
use zerocopy::byteorder::{LittleEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

// USB device identifiers (shared V-USB VID/PID)
/// USB vendor ID
pub const USBASP_USB_VENDOR: u16 = 0x16C0;
/// USB product ID
pub const USBASP_USB_PRODUCT: u16 = 0x05DC;
/// Manufacturer string used to tell a USBasp apart from other shared-ID devices
pub const USBASP_MANUFACTURER: &str = "www.fischl.de";
/// Product string
pub const USBASP_PRODUCT: &str = "USBasp";

/// Maximum packet size of the control endpoint
pub const PACKET_SIZE: usize = 8;

/// Status byte returned by a packet callback when no matching transfer is armed
pub const STATUS_NOT_READY: u8 = 0xFF;

/// Largest UART_RX request the V-USB control pipe can satisfy
pub const MAX_UART_READ: usize = 254;

/// Clock frequency of the reference hardware, used for the baud divisor
pub const F_CPU_HZ: u32 = 12_000_000;

/// USBasp vendor requests
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Connect the ISP lines and apply the SCK option
    Connect = 1,
    /// Release the ISP lines
    Disconnect = 2,
    /// Raw 4-byte ISP exchange
    Transmit = 3,
    /// Stream flash contents to the host
    ReadFlash = 4,
    /// Send the programming-enable sequence
    EnableProg = 5,
    /// Stream host data into flash
    WriteFlash = 6,
    /// Stream EEPROM contents to the host
    ReadEeprom = 7,
    /// Stream host data into EEPROM
    WriteEeprom = 8,
    /// Latch a 32-bit address overriding per-command addresses
    SetLongAddress = 9,
    /// Select the ISP clock option
    SetIspSck = 10,
    /// Enter TPI mode
    TpiConnect = 11,
    /// Leave TPI mode
    TpiDisconnect = 12,
    /// Receive one raw TPI byte
    TpiRawRead = 13,
    /// Send one raw TPI byte
    TpiRawWrite = 14,
    /// Stream TPI memory to the host
    TpiReadBlock = 15,
    /// Stream host data into TPI memory
    TpiWriteBlock = 16,
    /// Configure and enable the UART
    UartConfig = 60,
    /// Drop queued UART transmit bytes
    UartFlushTx = 61,
    /// Drop queued UART receive bytes
    UartFlushRx = 62,
    /// Disable the UART
    UartDisable = 63,
    /// Stream host data into the UART transmit ring
    UartTx = 64,
    /// Stream the UART receive ring to the host
    UartRx = 65,
    /// Query free transmit ring slots
    UartTxFree = 66,
    /// Query the capability bitmask
    GetCapabilities = 127,
}

impl Opcode {
    /// Decode a vendor request number
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            1 => Self::Connect,
            2 => Self::Disconnect,
            3 => Self::Transmit,
            4 => Self::ReadFlash,
            5 => Self::EnableProg,
            6 => Self::WriteFlash,
            7 => Self::ReadEeprom,
            8 => Self::WriteEeprom,
            9 => Self::SetLongAddress,
            10 => Self::SetIspSck,
            11 => Self::TpiConnect,
            12 => Self::TpiDisconnect,
            13 => Self::TpiRawRead,
            14 => Self::TpiRawWrite,
            15 => Self::TpiReadBlock,
            16 => Self::TpiWriteBlock,
            60 => Self::UartConfig,
            61 => Self::UartFlushTx,
            62 => Self::UartFlushRx,
            63 => Self::UartDisable,
            64 => Self::UartTx,
            65 => Self::UartRx,
            66 => Self::UartTxFree,
            127 => Self::GetCapabilities,
            _ => return None,
        };
        Some(op)
    }
}

bitflags! {
    /// Capability bits reported by GETCAPABILITIES (4 bytes, little-endian)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// TPI programming of small AVRs
        const TPI  = 1 << 0;
        /// UART bridge
        const UART = 1 << 6;
    }
}

bitflags! {
    /// Block flags carried in the low nibble of WRITEFLASH `data[5]`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u8 {
        /// First block of a transfer; resets the page counter
        const FIRST = 0x01;
        /// Last block of a transfer; forces a flush of a partial page
        const LAST  = 0x02;
    }
}

/// ISP clock options for SETISPSCK
pub mod sck {
    /// Let the firmware pick (375 kHz on the reference hardware)
    pub const AUTO: u8 = 0;
    /// 0.5 kHz
    pub const SCK_0_5: u8 = 1;
    /// 1 kHz
    pub const SCK_1: u8 = 2;
    /// 2 kHz
    pub const SCK_2: u8 = 3;
    /// 4 kHz
    pub const SCK_4: u8 = 4;
    /// 8 kHz, forced by the slow-SCK jumper
    pub const SCK_8: u8 = 5;
    /// 16 kHz
    pub const SCK_16: u8 = 6;
    /// 32 kHz
    pub const SCK_32: u8 = 7;
    /// 93.75 kHz
    pub const SCK_93_75: u8 = 8;
    /// 187.5 kHz
    pub const SCK_187_5: u8 = 9;
    /// 375 kHz
    pub const SCK_375: u8 = 10;
    /// 750 kHz
    pub const SCK_750: u8 = 11;
    /// 1.5 MHz
    pub const SCK_1500: u8 = 12;
}

/// Bit layout of the UART_CONFIG flags byte
pub mod uart_flags {
    /// Parity field
    pub const PARITY_MASK: u8 = 0b0000_0011;
    /// No parity
    pub const PARITY_NONE: u8 = 0b0000_0000;
    /// Even parity
    pub const PARITY_EVEN: u8 = 0b0000_0001;
    /// Odd parity
    pub const PARITY_ODD: u8 = 0b0000_0010;

    /// Stop bit field
    pub const STOP_MASK: u8 = 0b0000_0100;
    /// One stop bit
    pub const STOP_1BIT: u8 = 0b0000_0000;
    /// Two stop bits
    pub const STOP_2BIT: u8 = 0b0000_0100;

    /// Character size field
    pub const BYTES_MASK: u8 = 0b0011_1000;
    /// 5 data bits
    pub const BYTES_5B: u8 = 0b0000_0000;
    /// 6 data bits
    pub const BYTES_6B: u8 = 0b0000_1000;
    /// 7 data bits
    pub const BYTES_7B: u8 = 0b0001_0000;
    /// 8 data bits
    pub const BYTES_8B: u8 = 0b0001_1000;
    /// 9 data bits
    pub const BYTES_9B: u8 = 0b0010_0000;
}

/// Raw USB setup packet as delivered by the device stack
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SetupPacket {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest, the USBasp opcode
    pub request: u8,
    /// wValue
    pub value: U16<LittleEndian>,
    /// wIndex
    pub index: U16<LittleEndian>,
    /// wLength
    pub length: U16<LittleEndian>,
}

impl SetupPacket {
    /// View an 8-byte setup buffer as a packet
    pub fn from_bytes(data: &[u8; PACKET_SIZE]) -> Self {
        zerocopy::transmute!(*data)
    }

    /// Decoded opcode, `None` for requests this firmware does not know
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.request)
    }

    /// 16-bit short address (`wValue`)
    pub fn address(&self) -> u16 {
        self.value.get()
    }

    /// First parameter byte (`wIndex` low)
    pub fn param_a(&self) -> u8 {
        self.index.get() as u8
    }

    /// Second parameter byte (`wIndex` high)
    pub fn param_b(&self) -> u8 {
        (self.index.get() >> 8) as u8
    }

    /// Transfer length (`wLength`)
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// The 32-bit value spread over `wValue` and `wIndex`, used by SETLONGADDRESS
    pub fn long_address(&self) -> u32 {
        u32::from(self.value.get()) | (u32::from(self.index.get()) << 16)
    }

    /// 12-bit flash page size of a WRITEFLASH command
    pub fn page_size(&self) -> u16 {
        u16::from(self.param_a()) | ((u16::from(self.param_b()) & 0xF0) << 4)
    }

    /// Block flags of a WRITEFLASH command
    pub fn block_flags(&self) -> BlockFlags {
        BlockFlags::from_bits_truncate(self.param_b() & 0x0F)
    }
}

/// Baud divisor the reference hardware expects for `baud` (U2X mode)
///
/// Returns `None` when the rate is zero or too high to be represented.
pub fn baud_divisor(baud: u32) -> Option<u16> {
    if baud == 0 {
        return None;
    }
    let div = (F_CPU_HZ / 8 / baud).checked_sub(1)?;
    u16::try_from(div).ok()
}
