//! usbasp-dummy - In-memory USBasp device for testing
//!
//! This crate wires the usbasp-core dispatcher to an emulated AVR, TPI target,
//! board and UART so the whole command set can be exercised without hardware.

pub mod avr;
pub mod uart;
pub mod usb;

pub use avr::{DummyAvr, DummyBoard, DummyConfig, DummyTpi};
pub use uart::LoopbackUart;

use usbasp_core::dispatch::Dispatcher;

/// Dispatcher driving the emulated parts
pub type DummyDispatcher<'a, const RX: usize, const TX: usize> =
    Dispatcher<'a, DummyBoard, DummyAvr, DummyTpi, LoopbackUart, RX, TX>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::{control_in, control_out, setup_packet, REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT};
    use usbasp_core::dispatch::WriteStatus;
    use usbasp_core::protocol::{baud_divisor, sck, uart_flags, BlockFlags, Opcode};
    use usbasp_core::ring::RingBuffer;
    use usbasp_core::stream::Operation;
    use usbasp_core::uart::{UartChannel, UartInterrupts};
    use usbasp_core::Error;

    /// Transmit ring kept small so back-pressure is easy to reach
    const TX_RING: usize = 16;

    macro_rules! rig {
        ($d:ident, $hw:ident, $irq:ident) => {
            rig!($d, $hw, $irq, DummyAvr::new_default())
        };
        ($d:ident, $hw:ident, $irq:ident, $avr:expr) => {
            let $hw = LoopbackUart::new();
            let mut rx_ring = RingBuffer::<256>::new();
            let mut tx_ring = RingBuffer::<TX_RING>::new();
            let (rx_prod, rx_cons) = rx_ring.split();
            let (tx_prod, tx_cons) = tx_ring.split();
            #[allow(unused_mut, unused_variables)]
            let mut $irq = UartInterrupts::new(&$hw, rx_prod, tx_cons);
            let uart = UartChannel::new(&$hw, rx_cons, tx_prod);
            let mut $d: DummyDispatcher<'_, 256, TX_RING> =
                Dispatcher::new(DummyBoard::default(), $avr, DummyTpi::new(), uart);
        };
    }

    fn vin(opcode: Opcode, value: u16, index: u16, length: u16) -> [u8; 8] {
        setup_packet(REQUEST_TYPE_VENDOR_IN, opcode, value, index, length)
    }

    fn vout(opcode: Opcode, value: u16, index: u16, length: u16) -> [u8; 8] {
        setup_packet(REQUEST_TYPE_VENDOR_OUT, opcode, value, index, length)
    }

    /// wIndex of WRITEFLASH: page size low byte, then page size high nibble | flags
    fn flash_index(page_size: u16, flags: BlockFlags) -> u16 {
        let low = page_size as u8;
        let high = ((page_size >> 4) as u8 & 0xF0) | flags.bits();
        u16::from_le_bytes([low, high])
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    fn uart_8n1() -> [u8; 8] {
        let divisor = baud_divisor(115_200).unwrap();
        vout(Opcode::UartConfig, divisor, u16::from(uart_flags::BYTES_8B), 0)
    }

    #[test]
    fn test_read_flash_short_transfer() {
        let image = pattern(64);
        rig!(d, hw, irq, DummyAvr::with_flash(DummyConfig::default(), &image));

        let data = control_in(&mut d, &vin(Opcode::ReadFlash, 0x0010, 0, 4)).unwrap();
        assert_eq!(data, &image[0x10..0x14]);
        assert!(d.state().is_idle());
    }

    #[test]
    fn test_read_flash_multi_packet() {
        let image = pattern(256);
        rig!(d, hw, irq, DummyAvr::with_flash(DummyConfig::default(), &image));

        let data = control_in(&mut d, &vin(Opcode::ReadFlash, 0x0020, 0, 100)).unwrap();
        assert_eq!(data, &image[0x20..0x20 + 100]);
        assert!(d.state().is_idle());
    }

    #[test]
    fn test_long_address_overrides_command_address() {
        let config = DummyConfig {
            eeprom_size: 0x2_0100,
            ..DummyConfig::default()
        };
        let mut avr = DummyAvr::new(config);
        avr.eeprom_mut()[0x2_0000] = 0x5A;
        avr.eeprom_mut()[0x0040] = 0xA5;
        rig!(d, hw, irq, avr);

        control_in(&mut d, &vout(Opcode::SetLongAddress, 0x0000, 0x0002, 0)).unwrap();
        let data = control_in(&mut d, &vin(Opcode::ReadEeprom, 0x0040, 0, 1)).unwrap();
        assert_eq!(data, [0x5A]);

        // CONNECT drops back to per-command addresses
        control_in(&mut d, &vin(Opcode::Connect, 0, 0, 0)).unwrap();
        let data = control_in(&mut d, &vin(Opcode::ReadEeprom, 0x0040, 0, 1)).unwrap();
        assert_eq!(data, [0xA5]);
    }

    #[test]
    fn test_paged_write_flush_count() {
        const PAGE: usize = 64;
        for (len, expected_flushes) in [(PAGE * 3 + 10, 4), (PAGE * 2, 2), (5, 1)] {
            let config = DummyConfig {
                page_size: PAGE,
                ..DummyConfig::default()
            };
            rig!(d, hw, irq, DummyAvr::new(config));

            let image = pattern(len);
            let index = flash_index(PAGE as u16, BlockFlags::FIRST | BlockFlags::LAST);
            let setup = vout(Opcode::WriteFlash, 0, index, len as u16);
            control_out(&mut d, &setup, &image).unwrap();

            assert!(d.state().is_idle());
            let avr = d.target().isp();
            assert_eq!(avr.flushes().len(), expected_flushes, "len {len}");
            assert_eq!(&avr.flash()[..len], &image[..]);
            assert_eq!(avr.pending_page_bytes(), 0);
        }
    }

    #[test]
    fn test_page_spans_write_commands() {
        const PAGE: usize = 32;
        let config = DummyConfig {
            page_size: PAGE,
            ..DummyConfig::default()
        };
        rig!(d, hw, irq, DummyAvr::new(config));
        let image = pattern(48);

        // 20 + 28 bytes: the first page completes inside the second command
        let first = vout(Opcode::WriteFlash, 0, flash_index(PAGE as u16, BlockFlags::FIRST), 20);
        control_out(&mut d, &first, &image[..20]).unwrap();
        assert!(d.target().isp().flushes().is_empty());
        assert_eq!(d.target().isp().pending_page_bytes(), 20);

        let last = vout(Opcode::WriteFlash, 20, flash_index(PAGE as u16, BlockFlags::LAST), 28);
        control_out(&mut d, &last, &image[20..]).unwrap();
        assert_eq!(d.target().isp().flushes(), &[0, 32]);
        assert_eq!(&d.target().isp().flash()[..48], &image[..]);
    }

    #[test]
    fn test_unpaged_write_and_eeprom() {
        rig!(d, hw, irq);
        let index = flash_index(0, BlockFlags::FIRST | BlockFlags::LAST);
        control_out(&mut d, &vout(Opcode::WriteFlash, 0x100, index, 3), &[1, 2, 3]).unwrap();
        control_out(&mut d, &vout(Opcode::WriteEeprom, 0x10, 0, 10), &pattern(10)).unwrap();

        let avr = d.target().isp();
        assert!(avr.flushes().is_empty());
        assert_eq!(&avr.flash()[0x100..0x103], &[1, 2, 3]);
        assert_eq!(&avr.eeprom()[0x10..0x1A], &pattern(10)[..]);
        assert!(d.state().is_idle());
    }

    #[test]
    fn test_tpi_block_round_trip() {
        rig!(d, hw, irq);
        control_in(&mut d, &vin(Opcode::TpiConnect, 3, 0, 0)).unwrap();
        assert_eq!(d.target().tpi().delay(), Some(3));
        assert!(d.board().busy_led);

        let data = pattern(20);
        let packets = control_out(&mut d, &vout(Opcode::TpiWriteBlock, 0x4000, 0, 20), &data).unwrap();
        assert_eq!(packets, 3);
        assert_eq!(&d.target().tpi().memory()[0x4000..0x4014], &data[..]);
        let back = control_in(&mut d, &vin(Opcode::TpiReadBlock, 0x4000, 0, 20)).unwrap();
        assert_eq!(back, data);

        control_in(&mut d, &vin(Opcode::TpiDisconnect, 0, 0, 0)).unwrap();
        assert_eq!(d.target().tpi().delay(), None);
        assert!(!d.board().busy_led);
    }

    #[test]
    fn test_tpi_raw_frames() {
        rig!(d, hw, irq);
        control_in(&mut d, &vin(Opcode::TpiConnect, 1, 0, 0)).unwrap();

        d.target_mut().tpi_mut().queue_response(0x80);
        assert_eq!(control_in(&mut d, &vin(Opcode::TpiRawRead, 0, 0, 1)).unwrap(), [0x80]);
        // Nothing queued: the line idles high
        assert_eq!(control_in(&mut d, &vin(Opcode::TpiRawRead, 0, 0, 1)).unwrap(), [0xFF]);

        control_in(&mut d, &vin(Opcode::TpiRawWrite, 0x00C5, 0, 0)).unwrap();
        control_in(&mut d, &vin(Opcode::TpiRawWrite, 0x0007, 0, 0)).unwrap();
        assert_eq!(d.target().tpi().sent(), &[0xC5, 0x07]);
        assert!(d.state().is_idle());
    }

    #[test]
    fn test_signature_via_transmit() {
        rig!(d, hw, irq);
        control_in(&mut d, &vin(Opcode::Connect, 0, 0, 0)).unwrap();
        assert_eq!(control_in(&mut d, &vin(Opcode::EnableProg, 0, 0, 1)).unwrap(), [0]);

        let mut signature = Vec::new();
        for i in 0..3u16 {
            // data[2..6] = 30 00 i 00
            let reply = control_in(&mut d, &vin(Opcode::Transmit, 0x0030, i, 4)).unwrap();
            signature.push(reply[3]);
        }
        assert_eq!(signature, [0x1E, 0x95, 0x0F]);
    }

    #[test]
    fn test_capabilities_ignore_channel_state() {
        rig!(d, hw, irq);
        let caps = vin(Opcode::GetCapabilities, 0, 0, 4);
        assert_eq!(control_in(&mut d, &caps).unwrap(), [0x41, 0, 0, 0]);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        d.setup(&vin(Opcode::ReadFlash, 0, 0, 64));
        assert_eq!(control_in(&mut d, &caps).unwrap(), [0x41, 0, 0, 0]);
    }

    #[test]
    fn test_idle_packet_callbacks_fail() {
        rig!(d, hw, irq);
        let mut buf = [0u8; 8];
        assert_eq!(d.read(&mut buf), Err(Error::NotReady));
        assert_eq!(d.write(&buf), Err(Error::NotReady));
        assert_eq!(Error::NotReady.wire_status(), 0xFF);
    }

    #[test]
    fn test_uart_rx_partial_then_empty() {
        rig!(d, hw, irq);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        assert!(hw.is_enabled());

        hw.inject(b"hello");
        hw.service(&mut irq);
        let data = control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 254)).unwrap();
        assert_eq!(data, b"hello");
        assert!(d.state().is_idle());

        let data = control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 254)).unwrap();
        assert!(data.is_empty());
        assert!(d.state().is_idle());
    }

    #[test]
    fn test_uart_rx_respects_length() {
        rig!(d, hw, irq);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        hw.inject(&pattern(40));
        hw.service(&mut irq);

        let data = control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 16)).unwrap();
        assert_eq!(data, &pattern(40)[..16]);
        let data = control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 254)).unwrap();
        assert_eq!(data, &pattern(40)[16..]);
    }

    #[test]
    fn test_uart_tx_back_pressure() {
        rig!(d, hw, irq);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        let free = control_in(&mut d, &vin(Opcode::UartTxFree, 0, 0, 2)).unwrap();
        assert_eq!(free, [0, (TX_RING - 1) as u8]);

        let data = pattern(20);
        d.setup(&vout(Opcode::UartTx, 0, 0, 20));
        assert_eq!(d.write(&data[..8]), Ok(WriteStatus::Pending));
        // Only 7 slots left: one byte is turned away
        assert_eq!(d.write(&data[8..16]), Ok(WriteStatus::Pending));
        assert_eq!(d.state().remaining(), 5);
        assert_eq!(d.state().operation(), Operation::UartTx);

        hw.service(&mut irq);
        assert_eq!(hw.take_sent(), &data[..15]);
        assert_eq!(d.write(&data[15..]), Ok(WriteStatus::Complete));
        assert!(d.state().is_idle());

        hw.service(&mut irq);
        assert_eq!(hw.take_sent(), &data[15..]);
    }

    #[test]
    fn test_uart_config_resets_rings() {
        rig!(d, hw, irq);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        hw.inject(b"stale");
        hw.service(&mut irq);
        control_out(&mut d, &vout(Opcode::UartTx, 0, 0, 4), b"late").unwrap();

        let odd = vout(Opcode::UartConfig, 155, u16::from(uart_flags::PARITY_ODD | uart_flags::BYTES_7B), 0);
        control_out(&mut d, &odd, &[]).unwrap();
        assert_eq!(hw.config().map(|c| c.baud_divisor), Some(155));
        assert!(control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 254)).unwrap().is_empty());
        let free = control_in(&mut d, &vin(Opcode::UartTxFree, 0, 0, 2)).unwrap();
        assert_eq!(u16::from_be_bytes([free[0], free[1]]), (TX_RING - 1) as u16);
    }

    #[test]
    fn test_connect_disables_uart() {
        rig!(d, hw, irq);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        assert!(hw.is_enabled());
        control_in(&mut d, &vin(Opcode::Connect, 0, 0, 0)).unwrap();
        assert!(!hw.is_enabled());
        assert!(d.board().busy_led);
        assert!(d.target().isp().is_connected());
        assert_eq!(d.target().isp().sck_option(), Some(sck::AUTO));
    }

    #[test]
    fn test_sck_option_applied_at_connect() {
        rig!(d, hw, irq);
        let reply = control_in(&mut d, &vin(Opcode::SetIspSck, u16::from(sck::SCK_32), 0, 1)).unwrap();
        assert_eq!(reply, [0]);
        assert_eq!(d.target().isp().sck_option(), None);

        control_in(&mut d, &vin(Opcode::Connect, 0, 0, 0)).unwrap();
        assert_eq!(d.target().isp().sck_option(), Some(sck::SCK_32));
    }

    #[test]
    fn test_uart_flush_and_disable_opcodes() {
        rig!(d, hw, irq);
        control_out(&mut d, &uart_8n1(), &[]).unwrap();
        let tx_free = vin(Opcode::UartTxFree, 0, 0, 2);
        let full = [0, (TX_RING - 1) as u8];

        // FLUSHTX drops queued TX bytes and keeps RX
        hw.inject(b"abc");
        hw.service(&mut irq);
        control_out(&mut d, &vout(Opcode::UartTx, 0, 0, 3), b"xyz").unwrap();
        assert!(hw.tx_armed());
        assert_eq!(control_in(&mut d, &tx_free).unwrap(), [0, (TX_RING - 4) as u8]);
        control_in(&mut d, &vin(Opcode::UartFlushTx, 0, 0, 0)).unwrap();
        assert_eq!(control_in(&mut d, &tx_free).unwrap(), full);
        assert_eq!(control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 254)).unwrap(), b"abc");
        hw.service(&mut irq);
        assert!(hw.take_sent().is_empty());
        assert!(!hw.tx_armed());

        // FLUSHRX drops received bytes and keeps TX
        hw.inject(b"def");
        hw.service(&mut irq);
        control_out(&mut d, &vout(Opcode::UartTx, 0, 0, 3), b"uvw").unwrap();
        control_in(&mut d, &vin(Opcode::UartFlushRx, 0, 0, 0)).unwrap();
        assert!(control_in(&mut d, &vin(Opcode::UartRx, 0, 0, 254)).unwrap().is_empty());
        assert_eq!(control_in(&mut d, &tx_free).unwrap(), [0, (TX_RING - 4) as u8]);
        hw.service(&mut irq);
        assert_eq!(hw.take_sent(), b"uvw");
        assert_eq!(control_in(&mut d, &tx_free).unwrap(), full);

        control_in(&mut d, &vin(Opcode::UartDisable, 0, 0, 0)).unwrap();
        assert!(!hw.is_enabled());
        assert!(!hw.tx_armed());
    }
}
