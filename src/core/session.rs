//! Session controller
//!
//! A session opens the transport, creates the record, runs the acquisition
//! loop and the key watcher side by side, and closes the record exactly once
//! when the first terminal signal arrives:
//!
//! | First signal            | Record     | Outcome                  |
//! |-------------------------|------------|--------------------------|
//! | Alt+C                   | committed  | [`SessionOutcome::Committed`]   |
//! | Ctrl+X                  | discarded  | [`SessionOutcome::Discarded`]   |
//! | external interrupt      | committed  | [`SessionOutcome::Interrupted`] |
//! | transport/append error  | committed  | [`SessionOutcome::Failed`]      |
//!
//! A fatal error keeps what was received so far: those bytes are valid data
//! and the failure is not a request to throw them away.

use crate::core::acquisition::{
    Acquisition, AcquisitionError, AcquisitionStats, EntryObserver, SharedRecord,
};
use crate::core::input::KeySource;
use crate::core::intent::{Intent, SessionIntent};
use crate::core::keys::{watch_keys, WatchEnd};
use crate::core::record::{RecordError, RecordStore, RecordSummary};
use crate::core::transport::{SerialConfig, TransportError, TransportOpener};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Opening the transport
    AwaitingPort,
    /// Recording data and watching keys
    Acquiring,
    /// Closing the record
    Terminating,
    /// Done
    Ended,
}

/// Phase change
#[derive(Debug, Clone)]
pub struct PhaseTransition {
    /// Previous phase
    pub from: SessionPhase,
    /// New phase
    pub to: SessionPhase,
    /// When it happened
    pub timestamp: DateTime<Local>,
}

/// Fatal session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Transport could not be opened or failed mid-session
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Record could not be created, written or closed
    #[error(transparent)]
    Record(#[from] RecordError),

    /// A worker thread could not be started or died
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AcquisitionError> for SessionError {
    fn from(err: AcquisitionError) -> Self {
        match err {
            AcquisitionError::Transport(e) => Self::Transport(e),
            AcquisitionError::Record(e) => Self::Record(e),
        }
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Operator committed; record kept
    Committed(RecordSummary),
    /// Operator discarded; record deleted
    Discarded(RecordSummary),
    /// Stopped by an external interrupt; record kept
    Interrupted(RecordSummary),
    /// Fatal error. `record` is the partial record that was kept, if any.
    Failed {
        /// What went wrong
        error: SessionError,
        /// Committed partial record
        record: Option<RecordSummary>,
    },
}

impl SessionOutcome {
    /// Ended through a commit or discard request
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Committed(_) | Self::Discarded(_))
    }

    /// The record left on disk, if any
    pub fn kept_record(&self) -> Option<&RecordSummary> {
        match self {
            Self::Committed(summary) | Self::Interrupted(summary) => Some(summary),
            Self::Failed { record, .. } => record.as_ref(),
            Self::Discarded(_) => None,
        }
    }
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device to record from
    pub serial: SerialConfig,
    /// How long to wait for the workers to release their devices after the record is closed
    pub shutdown_grace: Duration,
}

impl SessionConfig {
    /// Settings for `serial` with the default shutdown grace
    pub fn new(serial: SerialConfig) -> Self {
        Self {
            serial,
            shutdown_grace: Duration::from_millis(500),
        }
    }
}

/// First terminal signal observed while acquiring
enum Stop {
    Intent(Intent),
    Interrupted,
    Fatal(SessionError),
}

/// Runs one recording session
pub struct SessionController {
    id: Uuid,
    config: SessionConfig,
    phase: SessionPhase,
    transitions: Vec<PhaseTransition>,
    intent: Arc<SessionIntent>,
    cancel: CancellationToken,
    interrupt: CancellationToken,
    observer: Option<EntryObserver>,
    stats: AcquisitionStats,
}

impl SessionController {
    /// New controller in [`SessionPhase::AwaitingPort`]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            phase: SessionPhase::AwaitingPort,
            transitions: Vec::new(),
            intent: Arc::new(SessionIntent::new()),
            cancel: CancellationToken::new(),
            interrupt: CancellationToken::new(),
            observer: None,
            stats: AcquisitionStats::default(),
        }
    }

    /// End the session (committing) when `token` is cancelled
    #[must_use]
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    /// Observe every recorded entry
    #[must_use]
    pub fn with_observer(mut self, observer: EntryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Phase history
    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Acquisition totals, available once the session has ended
    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    fn transition(&mut self, to: SessionPhase) {
        debug!(from = ?self.phase, to = ?to, "Session phase change");
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Local::now(),
        });
        self.phase = to;
    }

    fn fail_early(&mut self, error: SessionError) -> SessionOutcome {
        error!(error = %error, phase = ?self.phase, "Session failed");
        self.transition(SessionPhase::Ended);
        SessionOutcome::Failed {
            error,
            record: None,
        }
    }

    /// Run the session to completion
    #[tracing::instrument(name = "session", skip_all, fields(id = %self.id))]
    pub async fn run(
        &mut self,
        transport: &dyn TransportOpener,
        records: &dyn RecordStore,
        keys: Box<dyn KeySource>,
    ) -> SessionOutcome {
        if self.phase != SessionPhase::AwaitingPort {
            return SessionOutcome::Failed {
                error: SessionError::Internal("session has already run".into()),
                record: None,
            };
        }

        let mut source = match transport.open(&self.config.serial) {
            Ok(source) => source,
            Err(e) => return self.fail_early(e.into()),
        };
        info!(device = %source.describe(), "Transport open");

        self.transition(SessionPhase::Acquiring);

        let record: SharedRecord = match records.open() {
            Ok(sink) => Arc::new(Mutex::new(Some(sink))),
            Err(e) => return self.fail_early(e.into()),
        };

        let (acq_tx, mut acq_rx) = oneshot::channel();
        let mut acquisition = Acquisition::new(record.clone(), self.cancel.clone());
        if let Some(observer) = self.observer.take() {
            acquisition = acquisition.with_observer(observer);
        }
        let spawned = std::thread::Builder::new()
            .name("serlog-acquire".into())
            .spawn(move || {
                let result = acquisition.run(&mut *source);
                let _ = acq_tx.send(result);
            });
        let mut acquisition_done = false;
        let mut early_stop = None;
        if let Err(e) = spawned {
            acquisition_done = true;
            early_stop = Some(Stop::Fatal(SessionError::Internal(format!(
                "cannot start acquisition thread: {e}"
            ))));
        }

        let (keys_tx, keys_rx) = oneshot::channel::<()>();
        let intent = self.intent.clone();
        let cancel = self.cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("serlog-keys".into())
            .spawn(move || {
                let mut keys = keys;
                match watch_keys(&mut *keys, &intent, &cancel) {
                    WatchEnd::InputFailed(e) => {
                        warn!(
                            error = %e,
                            "Keyboard control unavailable; stop with an interrupt instead"
                        );
                    }
                    end => debug!(?end, "Key watcher finished"),
                }
                let _ = keys_tx.send(());
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Cannot start key watcher; stop with an interrupt instead");
        }

        let stop = match early_stop {
            Some(stop) => stop,
            None => loop {
                tokio::select! {
                    decided = self.intent.decided() => break Stop::Intent(decided),
                    () = self.interrupt.cancelled() => break Stop::Interrupted,
                    result = &mut acq_rx, if !acquisition_done => {
                        acquisition_done = true;
                        match result {
                            Ok(Ok(stats)) => {
                                warn!("Transport stopped delivering data");
                                self.stats = stats;
                            }
                            Ok(Err(e)) => break Stop::Fatal(e.into()),
                            Err(_) => break Stop::Fatal(SessionError::Internal(
                                "acquisition thread exited unexpectedly".into(),
                            )),
                        }
                    }
                }
            },
        };

        self.transition(SessionPhase::Terminating);
        let outcome = Self::close_record(&record, stop);

        self.cancel.cancel();
        let grace = self.config.shutdown_grace;
        let workers = async {
            if !acquisition_done {
                if let Ok(Ok(stats)) = acq_rx.await {
                    self.stats = stats;
                }
            }
            let _ = keys_rx.await;
        };
        if tokio::time::timeout(grace, workers).await.is_err() {
            debug!(?grace, "Workers still blocked after shutdown grace; leaving them");
        }

        self.transition(SessionPhase::Ended);
        info!(
            chunks = self.stats.chunks,
            bytes = self.stats.bytes,
            clean = outcome.is_clean(),
            "Session ended"
        );
        outcome
    }

    /// Take the record out of the shared slot and close it according to `stop`
    fn close_record(record: &SharedRecord, stop: Stop) -> SessionOutcome {
        let Some(mut sink) = record.lock().take() else {
            return SessionOutcome::Failed {
                error: SessionError::Internal("record was already closed".into()),
                record: None,
            };
        };

        match stop {
            Stop::Intent(Intent::Discard) => match sink.discard() {
                Ok(summary) => SessionOutcome::Discarded(summary),
                Err(e) => SessionOutcome::Failed {
                    error: e.into(),
                    record: None,
                },
            },
            Stop::Intent(_) => match sink.commit() {
                Ok(summary) => SessionOutcome::Committed(summary),
                Err(e) => SessionOutcome::Failed {
                    error: e.into(),
                    record: None,
                },
            },
            Stop::Interrupted => match sink.commit() {
                Ok(summary) => SessionOutcome::Interrupted(summary),
                Err(e) => SessionOutcome::Failed {
                    error: e.into(),
                    record: None,
                },
            },
            Stop::Fatal(error) => {
                error!(error = %error, "Acquisition failed; keeping partial record");
                match sink.commit() {
                    Ok(summary) => SessionOutcome::Failed {
                        error,
                        record: Some(summary),
                    },
                    Err(e) => {
                        error!(
                            error = %e,
                            path = %sink.location().display(),
                            "Partial record could not be committed"
                        );
                        SessionOutcome::Failed {
                            error,
                            record: None,
                        }
                    }
                }
            }
        }
    }
}
