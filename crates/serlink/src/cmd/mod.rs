use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod decode;
pub mod parse;
pub mod port;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Call a command on the remote station and print its reply.
    Call(CallArgs),
    /// Answer commands from the remote station with built-in handlers.
    Serve(ServeArgs),
    /// Decode captured wire bytes into frames.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Serve(args) => serve::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the link runs and how it is tuned.
#[derive(Args, Debug)]
pub struct PortArgs {
    /// Serial device path (or Unix socket path with --socket).
    pub device: PathBuf,
    /// Treat DEVICE as a Unix socket instead of a tty.
    #[arg(long)]
    pub socket: bool,
    /// Line speed for tty devices.
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Packets allowed in flight before waiting for an acknowledgment (1-7).
    #[arg(long, default_value_t = 1)]
    pub window: usize,
    /// Escape bytes below 0x20 on transmit.
    #[arg(long)]
    pub escape_low: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Command id (0-255).
    pub cmd: u8,
    /// Arguments as TYPE:VALUE (u16:10, i8:-1, var:0a0b, str:hello, fixed:2:beef).
    pub args: Vec<String>,
    /// Return type to wait for. Without it the call completes once the
    /// packet is acknowledged.
    #[arg(long, short = 'r', value_name = "TYPE")]
    pub returns: Option<String>,
    /// How long to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Exit after handling N commands.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes as hex (whitespace allowed).
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw wire bytes from a capture file.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
    /// Largest unstuffed frame accepted.
    #[arg(long, default_value_t = serlink_frame::DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
