//! End-to-end recording sessions against the CSV store

use parking_lot::Mutex;
use serlog_core::core::simulator::{ScriptedDevice, ScriptedKeys};
use serlog_core::{
    read_record, ByteSource, CliResult, CsvRecordStore, ExitCodes, SerialConfig, SessionConfig,
    SessionController, SessionError, SessionOutcome, TransportError,
};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn opener(
    script: ScriptedDevice,
) -> impl Fn(&SerialConfig) -> Result<Box<dyn ByteSource>, TransportError> {
    let slot = Mutex::new(Some(script));
    move |config: &SerialConfig| {
        slot.lock()
            .take()
            .map(|d| Box::new(d) as Box<dyn ByteSource>)
            .ok_or_else(|| TransportError::PortInUse(config.port.clone()))
    }
}

fn controller() -> SessionController {
    let mut config = SessionConfig::new(SerialConfig::new("/dev/ttyUSB0", 9600));
    config.shutdown_grace = Duration::from_millis(200);
    SessionController::new(config)
}

fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[tokio::test]
async fn commit_keeps_every_read_as_one_entry() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "data");
    let script = ScriptedDevice::new("/dev/ttyUSB0").data("A").data("BC").data("D");
    let keys = ScriptedKeys::new(b"\x1bc").after(script.drained());

    let outcome = controller().run(&opener(script), &store, Box::new(keys)).await;

    let SessionOutcome::Committed(summary) = &outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert_eq!(summary.entries, 3);
    assert_eq!(CliResult::from(&outcome).code(), ExitCodes::SUCCESS);

    let entries = read_record(&summary.path).unwrap();
    let payloads: Vec<&[u8]> = entries.iter().map(|e| e.payload.as_slice()).collect();
    assert_eq!(payloads, vec![&b"A"[..], &b"BC"[..], &b"D"[..]]);
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(files_in(dir.path()), vec![summary.path.clone()]);
}

#[tokio::test]
async fn binary_payloads_survive_the_file_format() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "bin");
    let awkward: Vec<u8> = vec![0x00, b'"', b',', b'\\', b'\r', b'\n', 0x7F, 0xFF];
    let script = ScriptedDevice::new("COM3").data(awkward.clone()).data("plain text");
    let keys = ScriptedKeys::new(b"\x1bC").after(script.drained());

    let outcome = controller().run(&opener(script), &store, Box::new(keys)).await;

    let summary = outcome.kept_record().expect("record kept");
    let entries = read_record(&summary.path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].payload, awkward);
    assert_eq!(entries[1].payload, b"plain text");
}

#[tokio::test]
async fn timestamps_mark_arrival_time() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "data");
    let script = ScriptedDevice::new("COM3")
        .data("early")
        .delay(Duration::from_millis(120))
        .data("late");
    let keys = ScriptedKeys::new(b"\x1bc").after(script.drained());

    let outcome = controller().run(&opener(script), &store, Box::new(keys)).await;

    let summary = outcome.kept_record().expect("record kept");
    let entries = read_record(&summary.path).unwrap();
    assert_eq!(entries.len(), 2);
    let gap = entries[1].timestamp - entries[0].timestamp;
    assert!(gap >= chrono::Duration::milliseconds(100), "gap was {gap}");
}

#[tokio::test]
async fn discard_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "data");
    let script = ScriptedDevice::new("/dev/ttyUSB0").data("A");
    let keys = ScriptedKeys::new(&[0x18]).after(script.drained());

    let outcome = controller().run(&opener(script), &store, Box::new(keys)).await;

    assert!(matches!(outcome, SessionOutcome::Discarded(_)));
    assert_eq!(CliResult::from(&outcome).code(), ExitCodes::SUCCESS);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn escape_then_other_letter_does_not_end_session() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "data");
    let script = ScriptedDevice::new("COM3").data("A");
    let keys = ScriptedKeys::new(b"\x1bxq\x1b\x1bc").after(script.drained());

    let outcome = controller().run(&opener(script), &store, Box::new(keys)).await;

    let SessionOutcome::Committed(summary) = outcome else {
        panic!("expected commit");
    };
    assert_eq!(read_record(&summary.path).unwrap().len(), 1);
}

#[tokio::test]
async fn disconnect_keeps_partial_record_and_fails() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "data");
    let script = ScriptedDevice::new("/dev/ttyUSB0").data("A").data("B").disconnect();

    let outcome = controller()
        .run(&opener(script), &store, Box::new(ScriptedKeys::new(b"")))
        .await;

    let SessionOutcome::Failed { error, record } = &outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(matches!(error, SessionError::Transport(TransportError::Disconnected(_))));
    let kept = record.as_ref().expect("partial record kept");
    assert_eq!(read_record(&kept.path).unwrap().len(), 2);

    let result = CliResult::from(&outcome);
    assert_eq!(result.code(), ExitCodes::DEVICE_LOST);
    assert!(!result.is_success());
}

#[tokio::test]
async fn missing_port_creates_no_file() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path().join("out"), "data");
    let missing = |config: &SerialConfig| -> Result<Box<dyn ByteSource>, TransportError> {
        Err(TransportError::PortNotFound(config.port.clone()))
    };

    let outcome = controller()
        .run(&missing, &store, Box::new(ScriptedKeys::new(b"")))
        .await;

    assert_eq!(CliResult::from(&outcome).code(), ExitCodes::PORT_NOT_FOUND);
    assert!(files_in(&dir.path().join("out")).is_empty());
}

#[tokio::test]
async fn interrupt_commits_and_reports_cancelled() {
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path(), "data");
    let script = ScriptedDevice::new("COM3").data("one").data("two");
    let drained = script.drained();
    let interrupt = CancellationToken::new();

    let trigger = interrupt.clone();
    tokio::spawn(async move {
        while !drained.is_set() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        trigger.cancel();
    });

    let outcome = controller()
        .with_interrupt(interrupt)
        .run(&opener(script), &store, Box::new(ScriptedKeys::new(b"")))
        .await;

    let SessionOutcome::Interrupted(summary) = &outcome else {
        panic!("expected interrupt, got {outcome:?}");
    };
    assert_eq!(read_record(&summary.path).unwrap().len(), 2);
    assert_eq!(CliResult::from(&outcome).code(), ExitCodes::CANCELLED);
}

#[tokio::test]
async fn racing_disconnect_and_discard_close_once() {
    for _ in 0..10 {
        let dir = TempDir::new().unwrap();
        let store = CsvRecordStore::new(dir.path(), "data");
        let script = ScriptedDevice::new("COM3").data("x").disconnect();

        let outcome = controller()
            .run(&opener(script), &store, Box::new(ScriptedKeys::new(&[0x18])))
            .await;

        let files = files_in(dir.path());
        match outcome {
            SessionOutcome::Discarded(_) => assert!(files.is_empty()),
            SessionOutcome::Failed { record: Some(kept), .. } => {
                assert_eq!(files, vec![kept.path]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
