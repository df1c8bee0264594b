use std::fs;
use std::path::PathBuf;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Args, Subcommand};
use serialcmd_frame::{FrameConfig, OversizePolicy, TrailerPolicy};
use serialcmd_transport::{LineConfig, DEFAULT_BAUD};
#[cfg(unix)]
use serialcmd_transport::{SerialStream, UnixDomainSocket};

#[cfg(unix)]
use crate::exit::transport_error;
use crate::exit::{frame_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;
use crate::variant::Variant;

pub mod encode;
pub mod listen;
pub mod send;
#[cfg(unix)]
pub mod simulate;
pub mod version;

/// How often a bound socket is checked for a new link.
#[cfg(unix)]
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Wait for the next link on `socket`, giving up once `running` is cleared.
#[cfg(unix)]
pub(crate) fn accept_until_stopped(
    socket: &UnixDomainSocket,
    running: &AtomicBool,
) -> CliResult<Option<SerialStream>> {
    socket
        .set_nonblocking(true)
        .map_err(|err| transport_error("accept failed", err))?;
    while running.load(Ordering::SeqCst) {
        let accepted = socket
            .try_accept()
            .map_err(|err| transport_error("accept failed", err))?;
        if accepted.is_some() {
            return Ok(accepted);
        }
        std::thread::sleep(ACCEPT_POLL);
    }
    Ok(None)
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single command frame.
    Send(SendArgs),
    /// Print received frames.
    Listen(ListenArgs),
    /// Run a simulated network bridge on a Unix socket.
    Simulate(SimulateArgs),
    /// Print the wire encoding of a command frame.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Simulate(args) => run_simulate(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[cfg(unix)]
fn run_simulate(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    simulate::run(args, format)
}

#[cfg(not(unix))]
fn run_simulate(_args: SimulateArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(USAGE, "simulate requires Unix domain sockets"))
}

/// Line and framing options shared by commands that open a link.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Baud rate applied to tty devices.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Idle gap that abandons a partial frame (e.g. 10ms).
    #[arg(long, default_value = "10ms")]
    pub stale_timeout: String,
    /// Command field layout.
    #[arg(long, value_enum, default_value_t = Variant::Byte)]
    pub variant: Variant,
    /// Keep the first bytes of oversized frames instead of dropping them.
    #[arg(long)]
    pub clamp_oversize: bool,
    /// Skip stray bytes where the end sentinel belongs instead of aborting.
    #[arg(long)]
    pub wait_trailer: bool,
}

impl LinkArgs {
    pub fn frame_config(&self, read_timeout: Option<Duration>) -> CliResult<FrameConfig> {
        let config = FrameConfig {
            stale_timeout: parse_duration(&self.stale_timeout)?,
            oversize_policy: if self.clamp_oversize {
                OversizePolicy::Clamp
            } else {
                OversizePolicy::Reject
            },
            trailer_policy: if self.wait_trailer {
                TrailerPolicy::Wait
            } else {
                TrailerPolicy::Abort
            },
            read_timeout,
            ..FrameConfig::default()
        };
        config
            .validate()
            .map_err(|err| frame_error("invalid link options", err))?;
        Ok(config)
    }

    pub fn line_config(&self, read_timeout: Option<Duration>) -> LineConfig {
        LineConfig {
            baud: self.baud,
            read_timeout,
        }
    }
}

/// Payload sources; at most one may be given.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (e.g. "0a1b", "0x0a 1b").
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device node or Unix socket path.
    pub target: PathBuf,
    /// Command name or code (e.g. version, 0x02, VR with --variant pair).
    #[arg(long, short = 'c')]
    pub cmd: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device node or Unix socket path.
    pub target: PathBuf,
    /// Bind a Unix socket at TARGET and accept connections.
    #[arg(long)]
    pub bind: bool,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Name reported for get-device-name.
    #[arg(long, default_value = "serialcmd-sim")]
    pub device_name: String,
    /// Idle gap that abandons a partial frame (e.g. 10ms).
    #[arg(long, default_value = "10ms")]
    pub stale_timeout: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command name or code.
    #[arg(long, short = 'c')]
    pub cmd: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Command field layout.
    #[arg(long, value_enum, default_value_t = Variant::Byte)]
    pub variant: Variant,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn resolve_payload(args: &PayloadArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(text) = &args.hex {
        return parse_hex(text);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .split_whitespace()
        .map(|chunk| {
            chunk
                .strip_prefix("0x")
                .or_else(|| chunk.strip_prefix("0X"))
                .unwrap_or(chunk)
        })
        .collect();
    hex::decode(&digits)
        .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
