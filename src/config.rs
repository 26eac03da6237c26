//! Command-line surface and immutable session configuration.

use clap::Parser;
use tracing::warn;

use crate::decimate::DEFAULT_RATIO;

pub const DEFAULT_SAMPLE_RATE: u32 = 2_048_000;
pub const DEFAULT_BLOCK_SIZE: u32 = 16 * 16384;
pub const MIN_BLOCK_SIZE: u32 = 512;
pub const MAX_BLOCK_SIZE: u32 = 256 * 16384;

/// Handoff ring capacity in bytes (power of two).
pub const RING_CAPACITY: usize = 524_288;

/// rtl_jack, an I/Q streamer for RTL2832 based DVB-T receivers
#[derive(Parser, Debug)]
#[command(name = "rtl_jack")]
pub struct Cli {
    /// Frequency to tune to, in Hz (k/M/G suffixes accepted)
    #[arg(short = 'f', value_name = "FREQ", value_parser = parse_frequency)]
    pub frequency: u32,

    /// Device sample rate in Hz
    #[arg(short = 's', value_name = "RATE", default_value_t = DEFAULT_SAMPLE_RATE,
          value_parser = parse_frequency)]
    pub sample_rate: u32,

    /// RTL-SDR device index
    #[arg(short = 'd', value_name = "INDEX", default_value_t = 0)]
    pub device_index: u32,

    /// Tuner gain in dB (0 selects automatic gain)
    #[arg(short = 'g', value_name = "GAIN", default_value_t = 0.0)]
    pub gain_db: f32,

    /// Frequency correction in parts per million
    #[arg(short = 'p', value_name = "PPM", default_value_t = 0)]
    pub ppm_error: i32,

    /// Device read block size in bytes
    #[arg(short = 'b', value_name = "BYTES", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: u32,

    /// Stop after this many samples (0 = no limit)
    #[arg(short = 'n', value_name = "SAMPLES", default_value_t = 0)]
    pub num_samples: u64,

    /// Force synchronous output (reserved, async is always used)
    #[arg(short = 'S')]
    pub sync_mode: bool,

    /// JACK client name
    #[arg(value_name = "JACK-NAME")]
    pub client_name: String,
}

/// Everything the session needs, frozen at startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_index: u32,
    pub sample_rate: u32,
    pub frequency: u32,
    /// Tenths of a dB; 0 means automatic gain.
    pub gain: i32,
    pub ppm_error: i32,
    pub block_size: usize,
    /// Raw capture bytes before stopping; 0 means no limit.
    pub byte_limit: u64,
    pub sync_mode: bool,
    pub decimation: usize,
    pub client_name: String,
    pub rtl_sdr_path: String,
}

impl SessionConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let block_size = if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&cli.block_size) {
            warn!(
                "block size {} outside [{}, {}], falling back to {}",
                cli.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE, DEFAULT_BLOCK_SIZE
            );
            DEFAULT_BLOCK_SIZE
        } else {
            cli.block_size
        };

        Self {
            device_index: cli.device_index,
            sample_rate: cli.sample_rate,
            frequency: cli.frequency,
            gain: (cli.gain_db * 10.0).round() as i32,
            ppm_error: cli.ppm_error,
            block_size: block_size as usize,
            // one sample = one I byte + one Q byte
            byte_limit: cli.num_samples.saturating_mul(2),
            sync_mode: cli.sync_mode,
            decimation: DEFAULT_RATIO,
            client_name: cli.client_name.clone(),
            rtl_sdr_path: std::env::var("RTL_SDR_PATH")
                .unwrap_or_else(|_| "rtl_sdr".to_string()),
        }
    }
}

/// Parse a frequency or rate with an optional k/M/G suffix,
/// e.g. "144385000", "144.385M", "2048k".
pub fn parse_frequency(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1e3),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1e6),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1e9),
        _ => (s, 1.0),
    };

    let value: f64 = digits
        .parse()
        .map_err(|_| format!("invalid frequency value '{}'", s))?;
    let hz = value * multiplier;
    if !(0.0..=u32::MAX as f64).contains(&hz) {
        return Err(format!("frequency '{}' out of range", s));
    }
    Ok(hz as u32)
}
