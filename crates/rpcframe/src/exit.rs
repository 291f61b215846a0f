use std::fmt;
use std::io;

use rpcframe_demux::DecodeError;
use rpcframe_frame::FrameError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
/// The input violated the framing protocol or one of its ceilings.
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => FAILURE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: &FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn decode_error(context: &str, err: &DecodeError) -> CliError {
    match err {
        DecodeError::Frame(err) => frame_error(context, err),
        DecodeError::Upstream(source) => match source.downcast_ref::<io::Error>() {
            Some(io_err) => io_error(context, io_err),
            None => CliError::new(FAILURE, format!("{context}: {err}")),
        },
        DecodeError::ReservedStreamId => CliError::new(USAGE, format!("{context}: {err}")),
        DecodeError::Cancelled | DecodeError::Remote { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other if other.is_protocol_violation() => {
            CliError::new(DATA_INVALID, format!("{context}: {other}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
