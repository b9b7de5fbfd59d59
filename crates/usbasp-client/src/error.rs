//! Error types for the USBasp client

use thiserror::Error;

/// Result type for USBasp operations
pub type Result<T> = std::result::Result<T, UsbAspError>;

/// Errors that can occur while talking to a USBasp
#[derive(Debug, Error)]
pub enum UsbAspError {
    /// No matching device on the bus
    #[error("USBasp not found (VID:16C0 PID:05DC, \"www.fischl.de\" / \"USBasp\")")]
    DeviceNotFound,

    /// Failed to open the device
    #[error("Failed to open USBasp: {0}")]
    OpenFailed(String),

    /// Failed to claim interface 0
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// Control transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Firmware does not advertise the UART bridge
    #[error("USBasp has no UART capability (capabilities 0x{0:08X})")]
    NoUartCapability(u32),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
