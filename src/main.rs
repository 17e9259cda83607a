use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::debug;

use tokscan::scan::{DEFAULT_BUFFER_SIZE, ScanConfig, ScanError, scan_file};

const DEFAULT_PATH: &str = "./FloridaBlue_GBO_in-network-rates.json";

const EXIT_READ_ERROR: u8 = 1;
const EXIT_OPEN_ERROR: u8 = 2;

/// Stream a JSON file token by token and report throughput.
#[derive(Parser, Debug)]
#[command(name = "tokscan", version)]
struct Args {
    /// JSON file to scan.
    #[arg(default_value = DEFAULT_PATH)]
    path: PathBuf,

    /// Read-ahead buffer size in bytes.
    #[arg(short = 'b', long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Print the total token count after a clean run.
    #[arg(long)]
    summary: bool,
}

fn main() -> ExitCode {
    tokscan::tracing_config::init_tracing();

    let args = Args::parse();
    let config = ScanConfig::new(args.path).with_buffer_size(args.buffer_size);

    match scan_file(&config, |progress| println!("{progress}")) {
        Ok(summary) => {
            if args.summary {
                println!("{summary}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{err}");
            match err {
                ScanError::Open { .. } => ExitCode::from(EXIT_OPEN_ERROR),
                ScanError::Read { tokens, .. } => {
                    debug!(tokens, "discarding partial count");
                    ExitCode::from(EXIT_READ_ERROR)
                }
            }
        }
    }
}
