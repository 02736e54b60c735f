mod capture;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iq-capture")]
#[command(about = "Capture complex baseband samples from a HackRF front end")]
struct Cli {
    /// Center frequency in Hz
    #[arg(short = 'c', long)]
    freq: f64,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value = "1000000")]
    sample_rate: f64,

    /// Number of complex samples to capture
    #[arg(short = 'n', long, default_value = "1000000")]
    samples: u64,

    /// Output file for interleaved little-endian f32 I/Q
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// RF amp gain (0 leaves the amp stage off)
    #[arg(long, default_value = "0")]
    amp_gain: u32,

    /// LNA gain in dB (quantized to multiples of 8, max 40)
    #[arg(long, default_value = "32")]
    lna_gain: u32,

    /// VGA gain in dB (quantized to multiples of 2, max 62)
    #[arg(long, default_value = "40")]
    vga_gain: u32,

    /// Frequency correction in ppm
    #[arg(long, default_value = "0")]
    ppm: i32,

    /// Device index
    #[arg(short = 'd', long, default_value = "0")]
    device: u32,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = capture::run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
