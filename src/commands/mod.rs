//! CLI command implementations
//!
//! Every command except `list` and `caps` first configures the UART with the
//! line options from the command line.

pub mod bench;
pub mod info;
pub mod stream;

use crate::cli::UartArgs;
use usbasp_client::{UsbAsp, UsbAspConfig};

/// Open the device and configure its UART
pub fn open_uart(
    config: UsbAspConfig,
    args: &UartArgs,
) -> Result<UsbAsp, Box<dyn std::error::Error>> {
    let usbasp = UsbAsp::open_with_config(config)?;
    let settings = args.settings();
    usbasp.uart_config(&settings)?;
    log::info!(
        "UART {} baud, {} data bits, {:?} parity, {:?} stop",
        settings.baud,
        settings.data_bits.count(),
        settings.parity,
        settings.stop_bits
    );
    Ok(usbasp)
}
