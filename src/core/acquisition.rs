//! Acquisition loop: transport reads to record entries

use crate::core::record::{Entry, RecordError, RecordSink};
use crate::core::transport::{ByteSource, TransportError, READ_BUFFER_SIZE};
use bytes::Bytes;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Slot holding the open record.
///
/// Appends and the final close go through the same mutex. Whoever closes the
/// record takes it out of the slot, so it can only be closed once.
pub type SharedRecord = Arc<Mutex<Option<Box<dyn RecordSink>>>>;

/// Callback invoked for every appended entry
pub type EntryObserver = Box<dyn FnMut(&Entry) + Send>;

/// Errors that end acquisition
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// The transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The record rejected an append
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Totals for one acquisition run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Reads appended to the record
    pub chunks: u64,
    /// Payload bytes appended
    pub bytes: u64,
}

/// Reads from a transport and appends each chunk to the shared record
pub struct Acquisition {
    record: SharedRecord,
    cancel: CancellationToken,
    observer: Option<EntryObserver>,
    last_timestamp: Option<DateTime<Local>>,
    stats: AcquisitionStats,
}

impl Acquisition {
    /// New loop writing into `record`
    pub fn new(record: SharedRecord, cancel: CancellationToken) -> Self {
        Self {
            record,
            cancel,
            observer: None,
            last_timestamp: None,
            stats: AcquisitionStats::default(),
        }
    }

    /// Observe every appended entry
    #[must_use]
    pub fn with_observer(mut self, observer: EntryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run until cancelled, the record is closed, or a read or append fails.
    ///
    /// Errors are returned without retrying.
    pub fn run(
        mut self,
        source: &mut dyn ByteSource,
    ) -> Result<AcquisitionStats, AcquisitionError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = source.read_chunk(&mut buf, &self.cancel).map_err(|e| {
                error!(source = %source.describe(), error = %e, "Transport read failed");
                e
            })?;
            if n == 0 {
                debug!("Acquisition cancelled");
                return Ok(self.stats);
            }

            let entry = Entry::new(self.stamp(), Bytes::copy_from_slice(&buf[..n]));

            {
                let mut slot = self.record.lock();
                let Some(record) = slot.as_mut() else {
                    debug!(len = n, "Record already closed; dropping chunk");
                    return Ok(self.stats);
                };
                record.append(&entry).map_err(|e| {
                    error!(error = %e, "Record append failed");
                    e
                })?;
            }

            self.stats.chunks += 1;
            self.stats.bytes += n as u64;
            trace!(len = n, total = self.stats.bytes, "Chunk recorded");

            if let Some(observer) = self.observer.as_mut() {
                observer(&entry);
            }
        }
    }

    /// Time of receipt, never earlier than the previous entry
    fn stamp(&mut self) -> DateTime<Local> {
        let now = Local::now();
        let stamped = match self.last_timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_timestamp = Some(stamped);
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{MockRecordSink, RecordState};
    use std::collections::VecDeque;
    use std::path::PathBuf;

    struct Chunks(VecDeque<Result<Vec<u8>, TransportError>>);

    impl ByteSource for Chunks {
        fn read_chunk(
            &mut self,
            buf: &mut [u8],
            _cancel: &CancellationToken,
        ) -> Result<usize, TransportError> {
            match self.0.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn describe(&self) -> String {
            "chunks".to_string()
        }
    }

    fn collecting_sink(seen: Arc<Mutex<Vec<Entry>>>) -> MockRecordSink {
        let mut sink = MockRecordSink::new();
        sink.expect_append().returning(move |entry| {
            seen.lock().push(entry.clone());
            Ok(())
        });
        sink.expect_state().return_const(RecordState::Open);
        sink
    }

    fn shared(sink: MockRecordSink) -> SharedRecord {
        Arc::new(Mutex::new(Some(Box::new(sink) as Box<dyn RecordSink>)))
    }

    #[test]
    fn test_each_read_becomes_one_entry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = shared(collecting_sink(seen.clone()));
        let mut source = Chunks(VecDeque::from(vec![
            Ok(b"A".to_vec()),
            Ok(b"BC".to_vec()),
            Ok(b"D".to_vec()),
        ]));

        let stats = Acquisition::new(record, CancellationToken::new())
            .run(&mut source)
            .unwrap();

        assert_eq!(stats, AcquisitionStats { chunks: 3, bytes: 4 });
        let seen = seen.lock();
        let payloads: Vec<&[u8]> = seen.iter().map(|e| e.payload.as_ref()).collect();
        assert_eq!(payloads, vec![&b"A"[..], &b"BC"[..], &b"D"[..]]);
        assert!(seen.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_read_error_is_fatal() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = shared(collecting_sink(seen.clone()));
        let mut source = Chunks(VecDeque::from(vec![
            Ok(b"x".to_vec()),
            Err(TransportError::Disconnected("COM3".into())),
            Ok(b"never".to_vec()),
        ]));

        let err = Acquisition::new(record, CancellationToken::new())
            .run(&mut source)
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::Transport(TransportError::Disconnected(_))));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_append_error_is_fatal() {
        let mut sink = MockRecordSink::new();
        sink.expect_append().times(1).returning(|_| {
            Err(RecordError::WriteFailed {
                path: PathBuf::from("full.csv"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        });
        let mut source = Chunks(VecDeque::from(vec![Ok(b"x".to_vec()), Ok(b"y".to_vec())]));

        let err = Acquisition::new(shared(sink), CancellationToken::new())
            .run(&mut source)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Record(RecordError::WriteFailed { .. })));
    }

    #[test]
    fn test_stops_quietly_when_record_taken() {
        let record: SharedRecord = Arc::new(Mutex::new(None));
        let mut source = Chunks(VecDeque::from(vec![Ok(b"late".to_vec())]));

        let stats = Acquisition::new(record, CancellationToken::new())
            .run(&mut source)
            .unwrap();
        assert_eq!(stats, AcquisitionStats::default());
    }

    #[test]
    fn test_observer_sees_entries() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sink_observed = observed.clone();
        let mut source = Chunks(VecDeque::from(vec![Ok(b"hi".to_vec())]));

        Acquisition::new(shared(collecting_sink(seen)), CancellationToken::new())
            .with_observer(Box::new(move |entry: &Entry| {
                sink_observed.lock().push(entry.payload.to_vec());
            }))
            .run(&mut source)
            .unwrap();

        assert_eq!(*observed.lock(), vec![b"hi".to_vec()]);
    }

    #[test]
    fn test_stamp_never_goes_backwards() {
        let mut acquisition =
            Acquisition::new(Arc::new(Mutex::new(None)), CancellationToken::new());
        let future = Local::now() + chrono::Duration::hours(1);
        acquisition.last_timestamp = Some(future);
        assert_eq!(acquisition.stamp(), future);
    }
}
