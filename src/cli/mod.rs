//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Interactive device selection
//! - Live echo of received data

pub mod exit_codes;
pub mod monitor;
pub mod prompt;

pub use exit_codes::{error_code, exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use monitor::{format_echo, stdout_echo, EchoMode};
pub use prompt::choose_device;
