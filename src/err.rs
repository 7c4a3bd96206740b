use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FatalError>;

/// The payload of a record could not be read as a well formed XML document.
#[derive(Debug, Error)]
#[error("malformed payload at byte {position}: {message}")]
pub struct MalformedPayload {
    pub position: u64,
    pub message: String,
}

impl MalformedPayload {
    pub(crate) fn new(position: u64, message: impl Into<String>) -> Self {
        MalformedPayload {
            position,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unable to open output `{}`: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write record {record_number}: {source}")]
    Write {
        record_number: u64,
        source: csv::Error,
    },

    #[error("failed to format the timestamp of record {record_number}: {source}")]
    Timestamp {
        record_number: u64,
        source: jiff::Error,
    },

    #[error("failed to write header row: {source}")]
    Header { source: csv::Error },

    #[error("failed to flush output: {source}")]
    Flush { source: io::Error },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream does not start with the EVTX file header signature.
    #[error("not an EVTX file (invalid signature): {message}")]
    InvalidSignature { message: String },

    #[error("an I/O error has occurred while decoding: {0}")]
    Io(#[from] io::Error),

    #[error("{message}")]
    Other { message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid timestamp `{value}`, expected `yyyy/MM/dd HH:mm`: {message}")]
    InvalidBoundary { value: String, message: String },

    #[error("`from` ({from}) is later than `to` ({to})")]
    InvertedTimeRange {
        from: jiff::Timestamp,
        to: jiff::Timestamp,
    },

    #[error("invalid timestamp format `{pattern}`: {message}")]
    TimestampFormat { pattern: String, message: String },
}

/// Errors which abort the entire run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("unable to create output: {0}")]
    SinkOpen(#[source] SinkError),

    #[error("`{}` is in use and administrator privileges were not found", path.display())]
    LockedWithoutPrivileges { path: PathBuf, source: io::Error },

    #[error("output failure: {0}")]
    Sink(#[source] SinkError),
}
