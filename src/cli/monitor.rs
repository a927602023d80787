//! Live echo of received data

use crate::core::acquisition::EntryObserver;
use crate::core::record::format::{encode_payload, format_timestamp};
use crate::core::record::Entry;
use std::io::Write;

/// Echo display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoMode {
    /// Escaped text, as stored in the record
    #[default]
    Text,
    /// Space-separated hex bytes
    Hex,
}

/// One echo line for `entry` (no trailing newline)
pub fn format_echo(entry: &Entry, mode: EchoMode) -> String {
    let body = match mode {
        EchoMode::Text => encode_payload(&entry.payload),
        EchoMode::Hex => entry
            .payload
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" "),
    };
    format!("[{}] {}", format_timestamp(&entry.timestamp), body)
}

/// Observer printing each recorded entry to stdout
pub fn stdout_echo(mode: EchoMode) -> EntryObserver {
    Box::new(move |entry: &Entry| {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", format_echo(entry, mode));
        let _ = out.flush();
    })
}
