//! Core module containing the recording engine
//!
//! This module provides:
//! - Transport layer for the serial device
//! - Raw keyboard input
//! - Durable, timestamped records (CSV)
//! - Acquisition loop (transport reads to record entries)
//! - Key watcher recognizing the commit and discard sequences
//! - Session controller tying them together
//! - Virtual devices for demos and tests

pub mod acquisition;
pub mod input;
pub mod intent;
pub mod keys;
pub mod record;
pub mod session;
pub mod simulator;
pub mod transport;
