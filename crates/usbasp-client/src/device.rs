//! USBasp device implementation

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture};

use usbasp_core::protocol::{
    baud_divisor, Capabilities, Opcode, MAX_UART_READ, USBASP_MANUFACTURER, USBASP_PRODUCT,
    USBASP_USB_PRODUCT, USBASP_USB_VENDOR,
};
use usbasp_core::uart::{DataBits, Parity, StopBits, UartConfig};

use crate::error::{Result, UsbAspError};

/// Timeout of every control transfer
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for opening a USBasp
#[derive(Debug, Clone, Default)]
pub struct UsbAspConfig {
    /// Device index (when multiple devices are connected)
    pub device_index: usize,
}

/// Information about a connected USBasp
#[derive(Debug, Clone)]
pub struct UsbAspDeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
}

/// Line settings of the UART bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartSettings {
    /// Baud rate in bits per second
    pub baud: u32,
    /// Parity
    pub parity: Parity,
    /// Character size
    pub data_bits: DataBits,
    /// Stop bits
    pub stop_bits: StopBits,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            baud: 9600,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
        }
    }
}

impl UartSettings {
    /// Wire form for UART_CONFIG: divisor in `wValue`, flags in `wIndex`
    pub fn to_wire(&self) -> Result<UartConfig> {
        let divisor = baud_divisor(self.baud).ok_or_else(|| {
            UsbAspError::InvalidParameter(format!("baud rate {} out of range", self.baud))
        })?;
        Ok(UartConfig {
            baud_divisor: divisor,
            parity: self.parity,
            stop_bits: self.stop_bits,
            data_bits: self.data_bits,
        })
    }
}

/// USBasp with the UART bridge firmware
pub struct UsbAsp {
    interface: Interface,
    capabilities: Capabilities,
}

impl UsbAsp {
    /// Open the first available USBasp
    pub fn open() -> Result<Self> {
        Self::open_with_config(UsbAspConfig::default())
    }

    /// Open a USBasp with the specified configuration
    pub fn open_with_config(config: UsbAspConfig) -> Result<Self> {
        let devices = Self::matching_devices()?;
        let device_info = devices
            .get(config.device_index)
            .ok_or(UsbAspError::DeviceNotFound)?;

        log::info!(
            "Opening USBasp at bus {} address {}",
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbAspError::OpenFailed(e.to_string()))?;
        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| UsbAspError::ClaimFailed(e.to_string()))?;

        let mut usbasp = Self {
            interface,
            capabilities: Capabilities::empty(),
        };
        usbasp.capabilities = usbasp.query_capabilities()?;
        log::debug!("Capabilities: {:?}", usbasp.capabilities);

        Ok(usbasp)
    }

    /// List all connected USBasp devices
    pub fn list_devices() -> Result<Vec<UsbAspDeviceInfo>> {
        Ok(Self::matching_devices()?
            .iter()
            .map(|d| UsbAspDeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
            })
            .collect())
    }

    /// Devices with the shared V-USB IDs that identify as a USBasp
    fn matching_devices() -> Result<Vec<nusb::DeviceInfo>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| UsbAspError::OpenFailed(e.to_string()))?
            .filter(|d| {
                d.vendor_id() == USBASP_USB_VENDOR && d.product_id() == USBASP_USB_PRODUCT
            })
            .filter(|d| {
                let matches = d.manufacturer_string() == Some(USBASP_MANUFACTURER)
                    && d.product_string() == Some(USBASP_PRODUCT);
                if !matches {
                    log::debug!(
                        "Skipping {:?} / {:?} with shared VID/PID",
                        d.manufacturer_string(),
                        d.product_string()
                    );
                }
                matches
            })
            .collect();
        Ok(devices)
    }

    /// Capabilities reported when the device was opened
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Ask the device for its capability bitmask
    ///
    /// Firmware without GETCAPABILITIES answers with a short reply, which
    /// counts as no capabilities.
    pub fn query_capabilities(&self) -> Result<Capabilities> {
        let mut buf = [0u8; 4];
        let len = self.control_read(Opcode::GetCapabilities, 0, 0, &mut buf)?;
        Ok(parse_capabilities(&buf[..len]))
    }

    /// Configure and enable the UART
    pub fn uart_config(&self, settings: &UartSettings) -> Result<()> {
        if !self.capabilities.contains(Capabilities::UART) {
            return Err(UsbAspError::NoUartCapability(self.capabilities.bits()));
        }
        let config = settings.to_wire()?;
        log::debug!(
            "Baud divisor {} for {} baud, flags 0x{:02X}",
            config.baud_divisor,
            settings.baud,
            config.flags()
        );
        self.control_read(
            Opcode::UartConfig,
            config.baud_divisor,
            u16::from(config.flags()),
            &mut [],
        )?;
        Ok(())
    }

    /// Drop bytes received by the device but not yet read
    pub fn uart_flush_rx(&self) -> Result<()> {
        self.control_read(Opcode::UartFlushRx, 0, 0, &mut [])?;
        Ok(())
    }

    /// Drop bytes queued on the device for transmission
    pub fn uart_flush_tx(&self) -> Result<()> {
        self.control_read(Opcode::UartFlushTx, 0, 0, &mut [])?;
        Ok(())
    }

    /// Stop the UART
    pub fn uart_disable(&self) -> Result<()> {
        self.control_read(Opcode::UartDisable, 0, 0, &mut [])?;
        Ok(())
    }

    /// Read whatever the device has received, up to `buf.len()` bytes
    ///
    /// One call fetches at most 254 bytes. Returns 0 when nothing is pending.
    pub fn uart_read(&self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(MAX_UART_READ);
        self.control_read(Opcode::UartRx, 0, 0, &mut buf[..len])
    }

    /// Free space in the device's transmit ring
    pub fn uart_tx_free(&self) -> Result<u16> {
        let mut buf = [0u8; 2];
        let len = self.control_read(Opcode::UartTxFree, 0, 0, &mut buf)?;
        if len < 2 {
            return Err(UsbAspError::TransferFailed(format!(
                "short UART_TX_FREE reply ({} bytes)",
                len
            )));
        }
        Ok(u16::from_be_bytes(buf))
    }

    /// Send as much of `data` as the transmit ring can take right now
    ///
    /// Returns the number of bytes sent, 0 when the ring is full.
    pub fn uart_write(&self, data: &[u8]) -> Result<usize> {
        let free = self.uart_tx_free()?;
        let len = tx_chunk(data.len(), free);
        log::trace!("Free {} bytes, transmitting {}", free, len);
        if len == 0 {
            return Ok(0);
        }
        self.control_write(Opcode::UartTx, &data[..len])?;
        Ok(len)
    }

    /// Send all of `data`, polling the transmit ring until it has drained
    pub fn uart_write_all(&self, data: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < data.len() {
            sent += self.uart_write(&data[sent..])?;
        }
        Ok(())
    }

    /// Vendor IN request
    fn control_read(
        &self,
        opcode: Opcode,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: opcode as u8,
                    value,
                    index,
                    length: buf.len() as u16,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
            .map_err(|e| UsbAspError::TransferFailed(format!("{:?}: {}", opcode, e)))?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    /// Vendor OUT request
    fn control_write(&self, opcode: Opcode, data: &[u8]) -> Result<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: opcode as u8,
                    value: 0,
                    index: 0,
                    data,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
            .map_err(|e| UsbAspError::TransferFailed(format!("{:?}: {}", opcode, e)))?;
        Ok(())
    }
}

impl Drop for UsbAsp {
    fn drop(&mut self) {
        if self.capabilities.contains(Capabilities::UART) {
            if let Err(e) = self.uart_disable() {
                log::warn!("Failed to disable UART on close: {}", e);
            }
        }
    }
}

/// Decode a GETCAPABILITIES reply; anything but 4 bytes means none
fn parse_capabilities(reply: &[u8]) -> Capabilities {
    match <[u8; 4]>::try_from(reply) {
        Ok(bytes) => Capabilities::from_bits_retain(u32::from_le_bytes(bytes)),
        Err(_) => Capabilities::empty(),
    }
}

/// Bytes of a `len`-byte write that fit into `free` ring slots
fn tx_chunk(len: usize, free: u16) -> usize {
    len.min(usize::from(free))
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbasp_core::protocol::uart_flags;

    #[test]
    fn test_parse_capabilities() {
        assert_eq!(
            parse_capabilities(&[0x41, 0, 0, 0]),
            Capabilities::TPI | Capabilities::UART
        );
        assert_eq!(parse_capabilities(&[0x41, 0]), Capabilities::empty());
        assert_eq!(parse_capabilities(&[]), Capabilities::empty());
        // Reserved bits survive so they can be reported
        assert_eq!(parse_capabilities(&[0, 0, 0, 0x80]).bits(), 0x8000_0000);
    }

    #[test]
    fn test_tx_chunk() {
        assert_eq!(tx_chunk(10, 255), 10);
        assert_eq!(tx_chunk(300, 255), 255);
        assert_eq!(tx_chunk(10, 0), 0);
    }

    #[test]
    fn test_settings_wire_form() {
        let settings = UartSettings {
            baud: 115_200,
            parity: Parity::Even,
            data_bits: DataBits::Seven,
            stop_bits: StopBits::Two,
        };
        let config = settings.to_wire().unwrap();
        assert_eq!(config.baud_divisor, 12);
        assert_eq!(
            config.flags(),
            uart_flags::PARITY_EVEN | uart_flags::BYTES_7B | uart_flags::STOP_2BIT
        );

        let default = UartSettings::default().to_wire().unwrap();
        assert_eq!(default.baud_divisor, 155);
        assert_eq!(default.flags(), uart_flags::BYTES_8B);
    }

    #[test]
    fn test_settings_reject_bad_baud() {
        let settings = UartSettings {
            baud: 0,
            ..UartSettings::default()
        };
        assert!(matches!(
            settings.to_wire(),
            Err(UsbAspError::InvalidParameter(_))
        ));
    }
}
