//! usbasp-uart - UART terminal for USBasp programmers
//!
//! Talks to a USBasp running firmware with the UART bridge extension. The
//! programmer's RX/TX pins become a serial port that can be copied to and from
//! stdio, used as an interactive terminal, or benchmarked.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use usbasp_client::UsbAsp;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match &cli.command {
        Commands::List => commands::info::list_devices(),
        Commands::Caps => {
            let usbasp = UsbAsp::open_with_config(cli.device_config())?;
            commands::info::print_capabilities(&usbasp)
        }
        Commands::Read { uart } => {
            let usbasp = commands::open_uart(cli.device_config(), uart)?;
            commands::stream::copy_to_stdout(&usbasp)
        }
        Commands::Write { uart } => {
            let usbasp = commands::open_uart(cli.device_config(), uart)?;
            commands::stream::copy_from_stdin(&usbasp)
        }
        Commands::Terminal { uart } => {
            let usbasp = commands::open_uart(cli.device_config(), uart)?;
            commands::stream::terminal(&usbasp)
        }
        Commands::BenchRead { uart, size } => {
            let usbasp = commands::open_uart(cli.device_config(), uart)?;
            commands::bench::read_test(&usbasp, *size)
        }
        Commands::BenchWrite { uart, size } => {
            let usbasp = commands::open_uart(cli.device_config(), uart)?;
            commands::bench::write_test(&usbasp, *size)
        }
    }
}
