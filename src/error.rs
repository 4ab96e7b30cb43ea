//! Error types for the reader and the payload parser.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::thinkgear_client::ReaderState;

/// Fatal errors surfaced to the host application.
///
/// In-protocol anomalies (lost sync, bad checksums, unknown codes) are not
/// errors: the worker recovers from them on its own and only counts them in
/// [`crate::stats::DecodeStats`].
#[derive(Error, Debug)]
pub enum ThinkGearError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("byte source is not open")]
    NotOpen,
    #[error("byte source reached end of stream")]
    SourceClosed,
    #[error("no data received for {0:?}")]
    Stalled(Duration),
    #[error("cannot {action} while reader is {state:?}")]
    InvalidState {
        state: ReaderState,
        action: &'static str,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Reasons a checksum-valid payload is discarded without being applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The code has no known value shape, so the rest of the payload cannot
    /// be parsed reliably.
    #[error("unknown code 0x{code:02x} at offset {offset}")]
    UnknownCode { code: u8, offset: usize },
    /// A row needs more bytes than the payload has left.
    #[error("row 0x{code:02x} at offset {offset} needs {needed} bytes, {available} left")]
    Truncated {
        code: u8,
        offset: usize,
        needed: usize,
        available: usize,
    },
}
