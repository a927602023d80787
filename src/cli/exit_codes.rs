//! CLI Exit Codes
//!
//! Commit and discard both exit with 0. Anything else that ends a session
//! exits non-zero with one of the codes below.

use crate::core::record::RecordError;
use crate::core::session::{SessionError, SessionOutcome};
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success (record committed or discarded)
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Stopped by an interrupt signal (record kept)
    pub const CANCELLED: u8 = 11;

    /// Device disappeared mid-session
    pub const DEVICE_LOST: u8 = 12;

    /// Device busy
    pub const DEVICE_BUSY: u8 = 13;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Record could not be created
    pub const STORAGE_UNAVAILABLE: u8 = 18;

    /// Record write failed mid-session
    pub const WRITE_FAILED: u8 = 19;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the operator
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Exit code for a fatal session error
pub fn error_code(error: &SessionError) -> u8 {
    match error {
        SessionError::Transport(e) => match e {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::PortInUse(_) => ExitCodes::DEVICE_BUSY,
            TransportError::ConnectionFailed(_) => ExitCodes::CONNECTION_FAILED,
            TransportError::Disconnected(_) | TransportError::IoError(_) => ExitCodes::DEVICE_LOST,
        },
        SessionError::Record(e) => match e {
            RecordError::StorageUnavailable { .. } => ExitCodes::STORAGE_UNAVAILABLE,
            _ => ExitCodes::WRITE_FAILED,
        },
        SessionError::Internal(_) => ExitCodes::INTERNAL_ERROR,
    }
}

impl From<&SessionOutcome> for CliResult {
    fn from(outcome: &SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Committed(summary) => Self::success_with_message(format!(
                "Saved {} entries to {}",
                summary.entries,
                summary.path.display()
            )),
            SessionOutcome::Discarded(_) => {
                Self::success_with_message("Recording discarded.".to_string())
            }
            SessionOutcome::Interrupted(summary) => Self::error(
                ExitCodes::CANCELLED,
                format!(
                    "Interrupted; kept {} entries in {}",
                    summary.entries,
                    summary.path.display()
                ),
            ),
            SessionOutcome::Failed { error, record } => {
                let kept = record
                    .as_ref()
                    .map(|r| {
                        format!(
                            " (partial record with {} entries kept in {})",
                            r.entries,
                            r.path.display()
                        )
                    })
                    .unwrap_or_default();
                Self::error(error_code(error), format!("{error}{kept}"))
            }
        }
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success (committed or discarded)",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        7 => "Permission denied",
        8 => "Configuration error",
        11 => "Interrupted (record kept)",
        12 => "Device lost",
        13 => "Device busy",
        14 => "Port not found",
        18 => "Storage unavailable",
        19 => "Write failed",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 7, 8, 11, 12, 13, 14, 18, 19, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
