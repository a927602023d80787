//! # Serlog Core Library
//!
//! Records a serial byte stream to a timestamped CSV file while the operator
//! decides, from the keyboard, whether to keep it:
//!
//! - **Alt+C** commits the record and exits
//! - **Ctrl+X** discards the record (the file is deleted) and exits
//!
//! Each transport read becomes one entry; entries keep arrival order and
//! carry the time of receipt with millisecond precision.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serlog_core::{
//!     CsvRecordStore, SerialConfig, SerialOpener, SessionConfig, SessionController, TerminalKeys,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::new(SerialConfig::new("/dev/ttyUSB0", 115200));
//!     let store = CsvRecordStore::new(".", "data");
//!     let keys = TerminalKeys::new()?;
//!
//!     let outcome = SessionController::new(config)
//!         .run(&SerialOpener, &store, Box::new(keys))
//!         .await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, EchoMode, ExitCodes};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::input::{InputError, KeySource, TerminalKeys};
pub use crate::core::intent::{Intent, SessionIntent};
pub use crate::core::record::{
    read_record, CsvRecordStore, Entry, RecordError, RecordSink, RecordState, RecordStore,
    RecordSummary, StoredEntry,
};
pub use crate::core::session::{
    SessionConfig, SessionController, SessionError, SessionOutcome, SessionPhase,
};
pub use crate::core::transport::{
    ByteSource, SerialConfig, SerialOpener, TransportError, TransportOpener,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
