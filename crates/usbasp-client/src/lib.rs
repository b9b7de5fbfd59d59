//! usbasp-client - Host side of the USBasp UART bridge
//!
//! Talks to a USBasp running the UART-capable firmware over vendor control
//! transfers on endpoint 0. Device discovery matches the shared V-USB
//! VID/PID and then the manufacturer and product strings, since many
//! unrelated gadgets reuse the same IDs.
//!
//! # Example
//!
//! ```no_run
//! use usbasp_client::{UartSettings, UsbAsp};
//!
//! let usbasp = UsbAsp::open()?;
//! usbasp.uart_config(&UartSettings { baud: 115_200, ..UartSettings::default() })?;
//! usbasp.uart_write_all(b"hello\r\n")?;
//!
//! let mut buf = [0u8; 254];
//! let n = usbasp.uart_read(&mut buf)?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;

pub use device::{UartSettings, UsbAsp, UsbAspConfig, UsbAspDeviceInfo};
pub use error::{Result, UsbAspError};
