use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rpcframe_demux::{DecoderConfig, DEFAULT_MAX_CONCURRENT_STREAMS, DEFAULT_MAX_FRAMES};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod inspect;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a framed response into text messages and raw streams.
    Decode(DecodeArgs),
    /// List the frame headers of a framed response.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Decoder ceilings shared by `decode` and `inspect`.
#[derive(Args, Debug, Clone)]
pub struct LimitArgs {
    /// Largest accepted frame payload (e.g. 16MiB, 4096).
    #[arg(long, env = "RPCFRAME_MAX_FRAME_PAYLOAD", default_value = "16MiB")]
    pub max_frame_payload: String,
    /// Most input bytes held while waiting for a frame to complete.
    #[arg(long, env = "RPCFRAME_MAX_BUFFERED", default_value = "32MiB")]
    pub max_buffered: String,
    /// Most raw streams one response may open.
    #[arg(long, env = "RPCFRAME_MAX_STREAMS", default_value_t = DEFAULT_MAX_CONCURRENT_STREAMS)]
    pub max_streams: usize,
    /// Most frames one response may carry (0 disables the check).
    #[arg(long, env = "RPCFRAME_MAX_FRAMES", default_value_t = DEFAULT_MAX_FRAMES)]
    pub max_frames: usize,
    /// Most unread bytes a single raw stream may queue. Unlimited if unset.
    #[arg(long, env = "RPCFRAME_MAX_STREAM_BUFFERED")]
    pub max_stream_buffered: Option<String>,
}

impl LimitArgs {
    pub fn decoder_config(&self) -> CliResult<DecoderConfig> {
        if self.max_streams == 0 {
            return Err(CliError::new(USAGE, "--max-streams must be greater than zero"));
        }
        Ok(DecoderConfig {
            max_frame_payload_bytes: parse_size(&self.max_frame_payload)?,
            max_buffered_bytes: parse_size(&self.max_buffered)?,
            max_concurrent_streams: self.max_streams,
            max_frames: (self.max_frames > 0).then_some(self.max_frames),
            max_stream_buffered_bytes: self
                .max_stream_buffered
                .as_deref()
                .map(parse_size)
                .transpose()?,
        })
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Framed response to decode, or `-` for stdin.
    pub input: PathBuf,
    /// Read size per input chunk (e.g. 8KiB).
    #[arg(long, default_value = "8KiB")]
    pub chunk_size: String,
    /// Write each raw stream to `<DIR>/stream-<id>.bin`.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
    /// Cancel the response if it has not finished in time (e.g. 30s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Framed response to inspect, or `-` for stdin.
    pub input: PathBuf,
    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a byte size: a plain count or one with a `B`, `KiB`, `MiB` or `GiB` suffix.
pub fn parse_size(input: &str) -> CliResult<usize> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "size must not be empty"));
    }

    let (number, multiplier) = if let Some(num) = input.strip_suffix("GiB") {
        (num, 1usize << 30)
    } else if let Some(num) = input.strip_suffix("MiB") {
        (num, 1 << 20)
    } else if let Some(num) = input.strip_suffix("KiB") {
        (num, 1 << 10)
    } else if let Some(num) = input.strip_suffix('B') {
        (num, 1)
    } else {
        (input, 1)
    };

    let value: usize = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid size value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "size must be greater than zero"));
    }

    value
        .checked_mul(multiplier)
        .ok_or_else(|| CliError::new(USAGE, format!("size too large: {input}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
