//! CSV-backed record store

use super::format::{self, HEADER};
use super::{Entry, RecordError, RecordSink, RecordState, RecordStore, RecordSummary, StoredEntry};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Creates timestamp-named CSV records in a directory
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    dir: PathBuf,
    prefix: String,
}

impl CsvRecordStore {
    /// Store writing `<prefix>_YYYYMMDD_HHMMSS.csv` files into `dir`
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
        }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecordStore for CsvRecordStore {
    fn open(&self) -> Result<Box<dyn RecordSink>, RecordError> {
        let path = self
            .dir
            .join(format::record_file_name(&self.prefix, &Local::now()));
        Ok(Box::new(CsvRecord::create(path)?))
    }
}

/// One CSV record file
pub struct CsvRecord {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    state: RecordState,
    entries: u64,
    bytes: u64,
}

impl CsvRecord {
    /// Create a new record at `path`. Never overwrites an existing file.
    pub fn create(path: PathBuf) -> Result<Self, RecordError> {
        let unavailable = |source| RecordError::StorageUnavailable {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(unavailable)?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", HEADER)
            .and_then(|()| writer.flush())
            .map_err(unavailable)?;

        info!(path = %path.display(), "Record created");

        Ok(Self {
            path,
            writer: Some(writer),
            state: RecordState::Open,
            entries: 0,
            bytes: 0,
        })
    }

    fn summary(&self) -> RecordSummary {
        RecordSummary {
            path: self.path.clone(),
            entries: self.entries,
            bytes: self.bytes,
        }
    }

    fn not_open(&self) -> RecordError {
        RecordError::NotOpen {
            path: self.path.clone(),
            state: self.state,
        }
    }

    fn write_failed(&self, source: std::io::Error) -> RecordError {
        RecordError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordSink for CsvRecord {
    fn append(&mut self, entry: &Entry) -> Result<(), RecordError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.not_open());
        };

        let result =
            writeln!(writer, "{}", format::format_row(entry)).and_then(|()| writer.flush());
        result.map_err(|e| self.write_failed(e))?;

        self.entries += 1;
        self.bytes += entry.payload.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecordError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.not_open());
        };
        writer.flush().map_err(|e| self.write_failed(e))
    }

    fn commit(&mut self) -> Result<RecordSummary, RecordError> {
        let Some(mut writer) = self.writer.take() else {
            return Err(self.not_open());
        };
        self.state = RecordState::Committed;

        writer
            .flush()
            .and_then(|()| writer.get_ref().sync_all())
            .map_err(|e| self.write_failed(e))?;
        drop(writer);

        info!(
            path = %self.path.display(),
            entries = self.entries,
            bytes = self.bytes,
            "Record committed"
        );
        Ok(self.summary())
    }

    fn discard(&mut self) -> Result<RecordSummary, RecordError> {
        let Some(writer) = self.writer.take() else {
            return Err(self.not_open());
        };
        self.state = RecordState::Discarded;

        // into_parts hands back the file without flushing what is still buffered
        let (file, unflushed) = writer.into_parts();
        drop(file);
        if let Ok(pending) = unflushed {
            debug!(pending = pending.len(), "Dropped unflushed record bytes");
        }

        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Record discarded"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Record discarded but the file could not be deleted"
            ),
        }
        Ok(self.summary())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }

    fn state(&self) -> RecordState {
        self.state
    }
}

impl Drop for CsvRecord {
    fn drop(&mut self) {
        if self.state == RecordState::Open {
            warn!(
                path = %self.path.display(),
                "Record dropped while still open; leaving it on disk"
            );
        }
    }
}

/// Read a committed record back into entries
pub fn read_record(path: &Path) -> Result<Vec<StoredEntry>, RecordError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if index == 0 && line == HEADER {
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let entry = format::parse_row(&line).map_err(|source| RecordError::Malformed {
            line: index + 1,
            source,
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data_20240908_123456.csv");
        let mut record = CsvRecord::create(path.clone()).unwrap();
        record.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "timestamp,payload\n");
        assert!(read_record(&path).unwrap().is_empty());
    }

    #[test]
    fn test_append_then_commit_keeps_entries_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.csv");
        let mut record = CsvRecord::create(path.clone()).unwrap();

        record.append(&Entry::now(&b"first"[..])).unwrap();
        record.append(&Entry::now(&b"\x00\x01second\r\n"[..])).unwrap();

        let summary = record.commit().unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.bytes, 15);
        assert_eq!(record.state(), RecordState::Committed);

        let stored = read_record(&path).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].payload, b"first");
        assert_eq!(stored[1].payload, b"\x00\x01second\r\n");
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taken.csv");
        fs::write(&path, "keep me").unwrap();

        let err = CsvRecord::create(path.clone()).err().unwrap();
        assert!(matches!(err, RecordError::StorageUnavailable { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_create_fails_when_dir_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();

        let store = CsvRecordStore::new(&blocker, "data");
        assert!(matches!(
            store.open().err().unwrap(),
            RecordError::StorageUnavailable { .. }
        ));
    }

    #[test]
    fn test_discard_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.csv");
        let mut record = CsvRecord::create(path.clone()).unwrap();
        for _ in 0..50 {
            record.append(&Entry::now(&b"payload"[..])).unwrap();
        }

        let summary = record.discard().unwrap();
        assert_eq!(summary.entries, 50);
        assert_eq!(record.state(), RecordState::Discarded);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_append_after_close_is_rejected() {
        let dir = tempdir().unwrap();
        let mut record = CsvRecord::create(dir.path().join("closed.csv")).unwrap();
        record.commit().unwrap();

        let err = record.append(&Entry::now(&b"late"[..])).unwrap_err();
        assert!(matches!(
            err,
            RecordError::NotOpen {
                state: RecordState::Committed,
                ..
            }
        ));
    }

    #[test]
    fn test_discard_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanished.csv");
        let mut record = CsvRecord::create(path.clone()).unwrap();
        record.append(&Entry::now(&b"x"[..])).unwrap();
        fs::remove_file(&path).unwrap();

        let summary = record.discard().unwrap();
        assert_eq!(summary.entries, 1);
        assert_eq!(record.state(), RecordState::Discarded);
    }

    #[test]
    fn test_flush_only_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flushed.csv");
        let mut record = CsvRecord::create(path.clone()).unwrap();
        record.append(&Entry::now(&b"ping"[..])).unwrap();

        record.flush().unwrap();
        assert_eq!(read_record(&path).unwrap().len(), 1);

        record.commit().unwrap();
        assert!(matches!(
            record.flush(),
            Err(RecordError::NotOpen {
                state: RecordState::Committed,
                ..
            })
        ));
    }

    #[test]
    fn test_second_close_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("once.csv");
        let mut record = CsvRecord::create(path.clone()).unwrap();
        record.commit().unwrap();

        assert!(matches!(record.discard(), Err(RecordError::NotOpen { .. })));
        assert!(matches!(record.commit(), Err(RecordError::NotOpen { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_store_names_file_from_start_time() {
        let dir = tempdir().unwrap();
        let store = CsvRecordStore::new(dir.path(), "bench");
        let mut record = store.open().unwrap();
        let name = record
            .location()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        record.discard().unwrap();

        assert!(name.starts_with("bench_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "bench_YYYYMMDD_HHMMSS.csv".len());
    }
}
