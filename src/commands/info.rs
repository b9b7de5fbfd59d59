//! Device information commands

use usbasp_client::UsbAsp;
use usbasp_core::protocol::Capabilities;

/// Print connected USBasps
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = UsbAsp::list_devices()?;
    if devices.is_empty() {
        println!("No USBasp found");
        return Ok(());
    }
    for (index, dev) in devices.iter().enumerate() {
        println!("{}: bus {} address {}", index, dev.bus, dev.address);
    }
    Ok(())
}

/// Print the capability bitmask and what it means
pub fn print_capabilities(usbasp: &UsbAsp) -> Result<(), Box<dyn std::error::Error>> {
    let caps = usbasp.query_capabilities()?;
    println!("Capabilities: 0x{:08X}", caps.bits());
    println!(
        "  TPI:  {}",
        if caps.contains(Capabilities::TPI) { "yes" } else { "no" }
    );
    println!(
        "  UART: {}",
        if caps.contains(Capabilities::UART) { "yes" } else { "no" }
    );
    let unknown = caps.bits() & !Capabilities::all().bits();
    if unknown != 0 {
        println!("  unknown bits: 0x{:08X}", unknown);
    }
    Ok(())
}
