//! Durable session records
//!
//! A record is created when acquisition starts, receives one [`Entry`] per
//! transport read, and is closed exactly once: committed (kept on disk) or
//! discarded (deleted).

mod csv;
pub mod format;

pub use self::csv::{read_record, CsvRecord, CsvRecordStore};
pub use format::FormatError;

use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDateTime};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One timestamped chunk, exactly as delivered by one transport read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Time of receipt
    pub timestamp: DateTime<Local>,
    /// Raw bytes of the read
    pub payload: Bytes,
}

impl Entry {
    /// Create an entry with an explicit timestamp
    pub fn new(timestamp: DateTime<Local>, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
        }
    }

    /// Create an entry stamped with the current time
    pub fn now(payload: impl Into<Bytes>) -> Self {
        Self::new(Local::now(), payload)
    }
}

/// An entry read back from a committed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Local wall-clock time, millisecond precision
    pub timestamp: NaiveDateTime,
    /// Decoded payload bytes
    pub payload: Vec<u8>,
}

/// Record lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Accepting entries
    Open,
    /// Flushed, closed and kept
    Committed,
    /// Closed and deleted
    Discarded,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

/// What a closed record looked like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    /// Location of the artifact (no longer present if discarded)
    pub path: PathBuf,
    /// Entries appended
    pub entries: u64,
    /// Payload bytes appended
    pub bytes: u64,
}

/// Record error types
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record could not be created
    #[error("Storage unavailable: cannot create {}: {source}", path.display())]
    StorageUnavailable {
        /// Intended record path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// An append or flush was rejected by the medium
    #[error("Write failed on {}: {source}", path.display())]
    WriteFailed {
        /// Record path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Operation on a record that is no longer open
    #[error("Record {} is already {state}", path.display())]
    NotOpen {
        /// Record path
        path: PathBuf,
        /// Current state
        state: RecordState,
    },

    /// A line of a stored record could not be parsed
    #[error("Malformed record line {line}: {source}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// Parse failure
        #[source]
        source: FormatError,
    },

    /// I/O error while reading a record
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only writer over one record
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink: Send {
    /// Append one entry
    fn append(&mut self, entry: &Entry) -> Result<(), RecordError>;

    /// Make appended entries durable
    fn flush(&mut self) -> Result<(), RecordError>;

    /// Flush, close and keep the record
    fn commit(&mut self) -> Result<RecordSummary, RecordError>;

    /// Close without flushing and delete the record
    fn discard(&mut self) -> Result<RecordSummary, RecordError>;

    /// Where the record lives
    fn location(&self) -> PathBuf;

    /// Current lifecycle state
    fn state(&self) -> RecordState;
}

/// Creates new records
pub trait RecordStore {
    /// Create a new, uniquely named record in the Open state
    fn open(&self) -> Result<Box<dyn RecordSink>, RecordError>;
}

impl<F> RecordStore for F
where
    F: Fn() -> Result<Box<dyn RecordSink>, RecordError>,
{
    fn open(&self) -> Result<Box<dyn RecordSink>, RecordError> {
        self()
    }
}
