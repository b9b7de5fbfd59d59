//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use usbasp_client::{UartSettings, UsbAspConfig};
use usbasp_core::uart::{DataBits, Parity, StopBits};

/// Parse a byte count: decimal or hex, with an optional `k`/`K`/`KiB` suffix
fn parse_size(s: &str) -> Result<usize, String> {
    let (digits, scale) = match s
        .strip_suffix("KiB")
        .or_else(|| s.strip_suffix('K'))
        .or_else(|| s.strip_suffix('k'))
    {
        Some(rest) => (rest.trim(), 1024),
        None => (s, 1),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))?
    } else {
        digits
            .parse::<usize>()
            .map_err(|e| format!("Invalid number: {}", e))?
    };
    value
        .checked_mul(scale)
        .ok_or_else(|| format!("Size too large: {}", s))
}

#[derive(Parser)]
#[command(name = "usbasp-uart")]
#[command(author, version, about = "UART communication through a modified USBasp", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device index when several USBasps are connected
    #[arg(short, long, default_value_t = 0, global = true)]
    pub device: usize,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Device selection for the client
    pub fn device_config(&self) -> UsbAspConfig {
        UsbAspConfig {
            device_index: self.device,
        }
    }
}

/// Parity as given on the command line
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum ParityArg {
    #[default]
    None,
    Even,
    Odd,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Even => Parity::Even,
            ParityArg::Odd => Parity::Odd,
        }
    }
}

/// UART line options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct UartArgs {
    /// Baud rate
    #[arg(short, long, default_value_t = 9600)]
    pub baud: u32,

    /// Parity
    #[arg(short, long, value_enum, default_value_t = ParityArg::None)]
    pub parity: ParityArg,

    /// Character size in bits
    #[arg(short = 'B', long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=9))]
    pub data_bits: u8,

    /// Stop bit count
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stop_bits: u8,
}

impl UartArgs {
    /// Line settings for the client
    pub fn settings(&self) -> UartSettings {
        UartSettings {
            baud: self.baud,
            parity: self.parity.into(),
            data_bits: DataBits::from_count(self.data_bits).unwrap_or_default(),
            stop_bits: if self.stop_bits == 2 {
                StopBits::Two
            } else {
                StopBits::One
            },
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy UART to stdout
    Read {
        #[command(flatten)]
        uart: UartArgs,
    },

    /// Copy stdin to UART
    Write {
        #[command(flatten)]
        uart: UartArgs,
    },

    /// Interactive terminal: UART to stdout and stdin to UART at once
    Terminal {
        #[command(flatten)]
        uart: UartArgs,
    },

    /// Read a block from UART and report the average speed
    BenchRead {
        #[command(flatten)]
        uart: UartArgs,

        /// Test size in bytes (e.g. 10K, 0x2800)
        #[arg(short = 'S', long, default_value = "10K", value_parser = parse_size)]
        size: usize,
    },

    /// Write a block to UART and report the average speed
    BenchWrite {
        #[command(flatten)]
        uart: UartArgs,

        /// Test size in bytes (e.g. 10K, 0x2800)
        #[arg(short = 'S', long, default_value = "10K", value_parser = parse_size)]
        size: usize,
    },

    /// Show the capabilities reported by the device
    Caps,

    /// List connected USBasps
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10K"), Ok(10 * 1024));
        assert_eq!(parse_size("4KiB"), Ok(4096));
        assert_eq!(parse_size("0x2800"), Ok(0x2800));
        assert_eq!(parse_size("123"), Ok(123));
        assert!(parse_size("ten").is_err());
    }

    #[test]
    fn test_uart_defaults() {
        let cli = Cli::try_parse_from(["usbasp-uart", "terminal"]).unwrap();
        let Commands::Terminal { uart } = cli.command else {
            panic!("expected terminal");
        };
        assert_eq!(uart.settings(), UartSettings::default());
    }

    #[test]
    fn test_uart_options() {
        let cli = Cli::try_parse_from([
            "usbasp-uart",
            "read",
            "--baud",
            "115200",
            "--parity",
            "even",
            "--data-bits",
            "7",
            "--stop-bits",
            "2",
        ])
        .unwrap();
        let Commands::Read { uart } = cli.command else {
            panic!("expected read");
        };
        let settings = uart.settings();
        assert_eq!(settings.baud, 115_200);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.stop_bits, StopBits::Two);

        assert!(Cli::try_parse_from(["usbasp-uart", "read", "--data-bits", "4"]).is_err());
    }
}
