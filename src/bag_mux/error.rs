use camino::Utf8PathBuf;
use thiserror::Error;

use super::sensors::timestamp::{TimeOffset, Timestamp};

/// Everything that can stop a multiplexing run.
///
/// Only [`MuxError::EmptyStream`] is recoverable: the run skips that input and
/// carries on with the others. Every other variant aborts the run and the
/// output bag must be treated as unusable.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("{0}")]
    Usage(String),

    #[error("cannot read bag {path}: {reason}")]
    UnreadableFile { path: Utf8PathBuf, reason: String },

    #[error("bag {path} contains no messages")]
    EmptyStream { path: Utf8PathBuf },

    #[error("message {index} is out of range for {path} ({len} messages)")]
    IndexOutOfRange {
        path: Utf8PathBuf,
        index: usize,
        len: usize,
    },

    #[error("message {index} of {path} is corrupt: {reason}")]
    Corrupt {
        path: Utf8PathBuf,
        index: usize,
        reason: String,
    },

    #[error("shifting {time} by {offset} leaves the representable time range")]
    TimeOverflow { time: Timestamp, offset: TimeOffset },

    #[error("stamp {0} does not fit the message header")]
    StampOverflow(Timestamp),

    #[error("failed to write output bag {path}: {reason}")]
    Output { path: Utf8PathBuf, reason: String },

    #[error("run cancelled after {written} messages")]
    Cancelled { written: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MuxError {
    pub(crate) fn unreadable(path: impl Into<Utf8PathBuf>, reason: impl ToString) -> Self {
        MuxError::UnreadableFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<Utf8PathBuf>, index: usize, reason: impl ToString) -> Self {
        MuxError::Corrupt {
            path: path.into(),
            index,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn output(path: impl Into<Utf8PathBuf>, reason: impl ToString) -> Self {
        MuxError::Output {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = MuxError> = std::result::Result<T, E>;
