//! Control-transfer driver standing in for the device's USB stack
//!
//! Each helper runs one complete control transfer against a
//! [`Dispatcher`]: the setup callback, then the data stage split into 8-byte
//! packets the way a low-speed device stack delivers it.

use usbasp_core::dispatch::{Dispatcher, SetupResponse, WriteStatus};
use usbasp_core::protocol::{Opcode, SetupPacket, PACKET_SIZE};
use usbasp_core::target::{Board, IspTransport, TpiTransport};
use usbasp_core::uart::UartHw;
use usbasp_core::Result;

/// bmRequestType of a vendor IN request to the device
pub const REQUEST_TYPE_VENDOR_IN: u8 = 0xC0;
/// bmRequestType of a vendor OUT request to the device
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;

/// Build a setup packet
pub fn setup_packet(
    request_type: u8,
    opcode: Opcode,
    value: u16,
    index: u16,
    length: u16,
) -> [u8; 8] {
    let [v0, v1] = value.to_le_bytes();
    let [i0, i1] = index.to_le_bytes();
    let [l0, l1] = length.to_le_bytes();
    [request_type, opcode as u8, v0, v1, i0, i1, l0, l1]
}

/// Run a device-to-host transfer and collect the data stage
///
/// Immediate replies are truncated to `wLength` like a real stack does.
pub fn control_in<B, I, T, H, const RX: usize, const TX: usize>(
    dispatcher: &mut Dispatcher<'_, B, I, T, H, RX, TX>,
    setup: &[u8; PACKET_SIZE],
) -> Result<Vec<u8>>
where
    B: Board,
    I: IspTransport,
    T: TpiTransport,
    H: UartHw,
{
    let length = usize::from(SetupPacket::from_bytes(setup).length());
    match dispatcher.setup(setup) {
        SetupResponse::Reply(n) => Ok(dispatcher.reply()[..n.min(length)].to_vec()),
        SetupResponse::Stream => {
            let mut data = Vec::with_capacity(length);
            while data.len() < length {
                let want = (length - data.len()).min(PACKET_SIZE);
                let mut packet = [0u8; PACKET_SIZE];
                let n = dispatcher.read(&mut packet[..want])?;
                data.extend_from_slice(&packet[..n]);
                if n < PACKET_SIZE {
                    break;
                }
            }
            Ok(data)
        }
    }
}

/// Run a host-to-device transfer
///
/// Returns how many packets the dispatcher consumed before it reported the
/// transfer complete.
pub fn control_out<B, I, T, H, const RX: usize, const TX: usize>(
    dispatcher: &mut Dispatcher<'_, B, I, T, H, RX, TX>,
    setup: &[u8; PACKET_SIZE],
    data: &[u8],
) -> Result<usize>
where
    B: Board,
    I: IspTransport,
    T: TpiTransport,
    H: UartHw,
{
    match dispatcher.setup(setup) {
        SetupResponse::Reply(_) => Ok(0),
        SetupResponse::Stream => {
            let mut packets = 0;
            for chunk in data.chunks(PACKET_SIZE) {
                packets += 1;
                if dispatcher.write(chunk)? == WriteStatus::Complete {
                    break;
                }
            }
            Ok(packets)
        }
    }
}
