//! UART throughput tests

use std::io::{self, Write};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use usbasp_client::UsbAsp;

/// Repeating `a..z` test pattern
fn test_pattern(size: usize) -> Vec<u8> {
    (b'a'..=b'z').cycle().take(size).collect()
}

fn report(verb: &str, bytes: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    println!("{} bytes {} in {}ms", bytes, verb, elapsed.as_millis());
    if secs > 0.0 {
        println!("Average speed: {:.3} kB/s", bytes as f64 / 1000.0 / secs);
    }
}

fn progress_bar(size: usize) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(size as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Write `size` bytes and report the average speed
pub fn write_test(usbasp: &UsbAsp, size: usize) -> Result<(), Box<dyn std::error::Error>> {
    let data = test_pattern(size);
    eprintln!("Writing...");

    let pb = progress_bar(size)?;
    let start = Instant::now();
    let mut sent = 0;
    while sent < data.len() {
        sent += usbasp.uart_write(&data[sent..])?;
        pb.set_position(sent as u64);
    }
    let elapsed = start.elapsed();
    pb.finish_and_clear();

    report("sent", sent, elapsed);
    Ok(())
}

/// Read `size` bytes and report the average speed
///
/// The clock starts with the first byte received, so the time spent waiting
/// for the other side to start sending is not counted.
pub fn read_test(usbasp: &UsbAsp, size: usize) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Reading...");

    let pb = progress_bar(size)?;
    let mut received = Vec::with_capacity(size);
    let mut start = None;
    let mut buf = [0u8; 256];
    while received.len() < size {
        let n = usbasp.uart_read(&mut buf)?;
        if n == 0 {
            continue;
        }
        start.get_or_insert_with(Instant::now);
        received.extend_from_slice(&buf[..n]);
        pb.set_position(received.len() as u64);
    }
    let elapsed = start.map(|s| s.elapsed()).unwrap_or_default();
    pb.finish_and_clear();

    println!("Whole received text:");
    io::stdout().write_all(&received)?;
    println!();
    report("received", received.len(), elapsed);
    Ok(())
}
