//! Copy data between stdio and the UART

use std::io::{self, Read, Write};

use usbasp_client::UsbAsp;

/// Largest chunk read from stdin at once
const STDIN_CHUNK: usize = 1024;

/// Copy UART to stdout until an error occurs
pub fn copy_to_stdout(usbasp: &UsbAsp) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout().lock();
    let mut buf = [0u8; 256];
    loop {
        let n = usbasp.uart_read(&mut buf)?;
        if n > 0 {
            stdout.write_all(&buf[..n])?;
            stdout.flush()?;
        }
    }
}

/// Copy stdin to UART until end of input
pub fn copy_from_stdin(usbasp: &UsbAsp) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; STDIN_CHUNK];
    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        usbasp.uart_write_all(&buf[..n])?;
    }
}

/// Run both directions at once
///
/// Closing stdin stops only the sending side; the receiving side keeps
/// running until it fails.
pub fn terminal(usbasp: &UsbAsp) -> Result<(), Box<dyn std::error::Error>> {
    std::thread::scope(|s| {
        let reader = s.spawn(|| copy_to_stdout(usbasp).map_err(|e| e.to_string()));
        let writer = s.spawn(|| copy_from_stdin(usbasp).map_err(|e| e.to_string()));

        if let Ok(Err(e)) = writer.join() {
            log::error!("write: {}", e);
        }
        match reader.join() {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err("reader thread panicked".into()),
        }
    })
}
