//! Target memory access
//!
//! The dispatcher never touches programming lines itself. It streams bytes
//! through [`TargetAccess`], which sits on top of two transports supplied by
//! the firmware:
//!
//! - [`IspTransport`] - byte-oriented SPI in-system programming (flash and
//!   EEPROM of classic AVRs)
//! - [`TpiTransport`] - block-oriented tiny programming interface
//!
//! Addresses are not range-checked here. Requests beyond the size of the
//! target device go straight to the transport.

use crate::protocol::BlockFlags;

/// Byte-level ISP primitives
pub trait IspTransport {
    /// Drive the ISP lines and reset the target
    fn connect(&mut self);

    /// Release the ISP lines
    fn disconnect(&mut self);

    /// Select the SCK option used by the next [`connect`](Self::connect)
    fn set_sck_option(&mut self, option: u8);

    /// Exchange one raw byte with the target
    fn transmit(&mut self, byte: u8) -> u8;

    /// Send the programming-enable sequence, returning 0 on success
    fn enter_programming_mode(&mut self) -> u8;

    /// Read one flash byte
    fn read_flash(&mut self, address: u32) -> u8;

    /// Read one EEPROM byte
    fn read_eeprom(&mut self, address: u32) -> u8;

    /// Write one flash byte
    ///
    /// With `poll` set the byte is programmed immediately and the call waits
    /// for completion. Without it the byte is only loaded into the target's
    /// page buffer and committed by [`flush_page`](Self::flush_page).
    fn write_flash(&mut self, address: u32, byte: u8, poll: bool);

    /// Write one EEPROM byte and wait for completion
    fn write_eeprom(&mut self, address: u32, byte: u8);

    /// Commit the loaded page containing `address`
    ///
    /// The target polls for completion by reading back a data byte, so the
    /// last byte written is passed along instead of a sentinel.
    fn flush_page(&mut self, address: u32, last_byte: u8);
}

/// TPI primitives
pub trait TpiTransport {
    /// Enter TPI mode; `delay` is the bit delay count for the line protocol
    fn connect(&mut self, delay: u16);

    /// Leave TPI mode and release the lines
    fn disconnect(&mut self);

    /// Send one raw TPI frame
    fn send_byte(&mut self, byte: u8);

    /// Receive one raw TPI frame
    fn recv_byte(&mut self) -> u8;

    /// Read `buf.len()` bytes of data space starting at `address`
    fn read_block(&mut self, address: u32, buf: &mut [u8]);

    /// Write `data` to data space starting at `address`
    fn write_block(&mut self, address: u32, data: &[u8]);
}

/// Board-level odds and ends the command set touches
pub trait Board {
    /// State of the "slow SCK" jumper; when set, CONNECT forces 8 kHz SCK
    fn slow_sck_jumper(&self) -> bool {
        false
    }

    /// Drive the busy LED, lit while connected to a target
    fn set_busy_led(&mut self, on: bool);
}

/// Memory reachable through a streaming read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    /// Flash over ISP
    Flash,
    /// EEPROM over ISP
    Eeprom,
    /// TPI data space
    Tpi,
}

/// Paging parameters of one WRITEFLASH command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashPaging {
    /// Page size in bytes, 0 for unpaged (byte-by-byte) programming
    pub page_size: u16,
    /// Position of this command in a multi-command transfer
    pub flags: BlockFlags,
}

impl FlashPaging {
    /// True when bytes are buffered and committed page by page
    pub fn is_paged(&self) -> bool {
        self.page_size != 0
    }
}

/// Uniform read/write access to flash, EEPROM and TPI memory
pub struct TargetAccess<I, T> {
    isp: I,
    tpi: T,
    /// Bytes left before the current flash page is full. Carries over between
    /// WRITEFLASH commands unless a command is flagged as the first block.
    page_counter: u16,
}

impl<I: IspTransport, T: TpiTransport> TargetAccess<I, T> {
    /// Wrap the two transports
    pub fn new(isp: I, tpi: T) -> Self {
        Self {
            isp,
            tpi,
            page_counter: 0,
        }
    }

    /// ISP transport
    pub fn isp(&self) -> &I {
        &self.isp
    }

    /// ISP transport, mutably
    pub fn isp_mut(&mut self) -> &mut I {
        &mut self.isp
    }

    /// TPI transport
    pub fn tpi(&self) -> &T {
        &self.tpi
    }

    /// TPI transport, mutably
    pub fn tpi_mut(&mut self) -> &mut T {
        &mut self.tpi
    }

    /// Bytes left before the pending flash page is committed
    pub fn page_counter(&self) -> u16 {
        self.page_counter
    }

    /// Read `buf.len()` bytes of `memory` starting at `address`
    pub fn read(&mut self, memory: Memory, address: u32, buf: &mut [u8]) {
        match memory {
            Memory::Flash => {
                for (addr, byte) in (address..).zip(buf.iter_mut()) {
                    *byte = self.isp.read_flash(addr);
                }
            }
            Memory::Eeprom => {
                for (addr, byte) in (address..).zip(buf.iter_mut()) {
                    *byte = self.isp.read_eeprom(addr);
                }
            }
            Memory::Tpi => self.tpi.read_block(address, buf),
        }
    }

    /// Prepare for a WRITEFLASH command
    pub fn begin_flash_write(&mut self, paging: &FlashPaging) {
        if paging.flags.contains(BlockFlags::FIRST) {
            self.page_counter = paging.page_size;
        }
    }

    /// Program `data` into flash starting at `address`
    ///
    /// `ends_transfer` is set when `data` ends with the final byte of the
    /// command. If that command is the last block and a partial page is still
    /// buffered, the page is committed even though it is not full.
    pub fn write_flash(
        &mut self,
        address: u32,
        data: &[u8],
        paging: &FlashPaging,
        ends_transfer: bool,
    ) {
        let mut last = None;
        for (addr, &byte) in (address..).zip(data.iter()) {
            if paging.is_paged() {
                self.isp.write_flash(addr, byte, false);
                self.page_counter = self.page_counter.wrapping_sub(1);
                if self.page_counter == 0 {
                    log::trace!("flash: page full at 0x{:06X}", addr);
                    self.isp.flush_page(addr, byte);
                    self.page_counter = paging.page_size;
                }
            } else {
                self.isp.write_flash(addr, byte, true);
            }
            last = Some((addr, byte));
        }

        if let Some((addr, byte)) = last {
            if ends_transfer
                && paging.is_paged()
                && paging.flags.contains(BlockFlags::LAST)
                && self.page_counter != paging.page_size
            {
                log::trace!("flash: flushing partial page at 0x{:06X}", addr);
                self.isp.flush_page(addr, byte);
                self.page_counter = paging.page_size;
            }
        }
    }

    /// Program `data` into EEPROM starting at `address`, one byte at a time
    pub fn write_eeprom(&mut self, address: u32, data: &[u8]) {
        for (addr, &byte) in (address..).zip(data.iter()) {
            self.isp.write_eeprom(addr, byte);
        }
    }

    /// Write `data` to TPI memory starting at `address`
    pub fn write_tpi(&mut self, address: u32, data: &[u8]) {
        self.tpi.write_block(address, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[derive(Default)]
    struct RecordingIsp {
        writes: Vec<(u32, u8, bool)>,
        flushes: Vec<(u32, u8)>,
    }

    impl IspTransport for RecordingIsp {
        fn connect(&mut self) {}
        fn disconnect(&mut self) {}
        fn set_sck_option(&mut self, _option: u8) {}
        fn transmit(&mut self, byte: u8) -> u8 {
            byte
        }
        fn enter_programming_mode(&mut self) -> u8 {
            0
        }
        fn read_flash(&mut self, address: u32) -> u8 {
            address as u8
        }
        fn read_eeprom(&mut self, address: u32) -> u8 {
            !(address as u8)
        }
        fn write_flash(&mut self, address: u32, byte: u8, poll: bool) {
            self.writes.push((address, byte, poll));
        }
        fn write_eeprom(&mut self, address: u32, byte: u8) {
            self.writes.push((address, byte, true));
        }
        fn flush_page(&mut self, address: u32, last_byte: u8) {
            self.flushes.push((address, last_byte));
        }
    }

    struct NoTpi;

    impl TpiTransport for NoTpi {
        fn connect(&mut self, _delay: u16) {}
        fn disconnect(&mut self) {}
        fn send_byte(&mut self, _byte: u8) {}
        fn recv_byte(&mut self) -> u8 {
            0
        }
        fn read_block(&mut self, _address: u32, buf: &mut [u8]) {
            buf.fill(0xAA);
        }
        fn write_block(&mut self, _address: u32, _data: &[u8]) {}
    }

    #[test]
    fn test_read_walks_addresses() {
        let mut target = TargetAccess::new(RecordingIsp::default(), NoTpi);
        let mut buf = [0u8; 4];
        target.read(Memory::Flash, 0x10, &mut buf);
        assert_eq!(buf, [0x10, 0x11, 0x12, 0x13]);
        target.read(Memory::Eeprom, 0, &mut buf[..1]);
        assert_eq!(buf[0], 0xFF);
        target.read(Memory::Tpi, 0x4000, &mut buf);
        assert_eq!(buf, [0xAA; 4]);
    }

    #[test]
    fn test_unpaged_flash_polls_every_byte() {
        let mut target = TargetAccess::new(RecordingIsp::default(), NoTpi);
        let paging = FlashPaging {
            page_size: 0,
            flags: BlockFlags::FIRST | BlockFlags::LAST,
        };
        target.begin_flash_write(&paging);
        target.write_flash(0x100, &[1, 2, 3], &paging, true);
        assert_eq!(
            target.isp().writes,
            [(0x100, 1, true), (0x101, 2, true), (0x102, 3, true)]
        );
        assert!(target.isp().flushes.is_empty());
    }

    #[test]
    fn test_paged_flash_flushes_full_pages_with_last_byte() {
        let mut target = TargetAccess::new(RecordingIsp::default(), NoTpi);
        let paging = FlashPaging {
            page_size: 4,
            flags: BlockFlags::FIRST,
        };
        target.begin_flash_write(&paging);
        target.write_flash(0, &[10, 11, 12, 13, 14, 15], &paging, true);
        assert_eq!(target.isp().flushes, [(3, 13)]);
        assert_eq!(target.page_counter(), 2);
    }

    #[test]
    fn test_page_counter_carries_between_blocks() {
        let mut target = TargetAccess::new(RecordingIsp::default(), NoTpi);
        let first = FlashPaging {
            page_size: 4,
            flags: BlockFlags::FIRST,
        };
        target.begin_flash_write(&first);
        target.write_flash(0, &[1, 2], &first, true);
        assert!(target.isp().flushes.is_empty());

        let last = FlashPaging {
            page_size: 4,
            flags: BlockFlags::LAST,
        };
        target.begin_flash_write(&last);
        target.write_flash(2, &[3, 4, 5], &last, true);
        // One full page spanning both commands, then the forced partial flush
        assert_eq!(target.isp().flushes, [(3, 4), (4, 5)]);
    }
}
