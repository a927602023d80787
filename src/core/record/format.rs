//! Artifact text format
//!
//! One header line, then one line per entry:
//!
//! ```text
//! timestamp,payload
//! 2024-09-08 12:34:56.789,"OK\x0D\x0A"
//! ```
//!
//! The payload field is always quoted (RFC 4180, `"` doubled). Inside it,
//! printable ASCII except `\` is written as-is, `\` becomes `\\`, and every
//! other byte becomes `\xHH`. A line therefore never contains a raw newline
//! and the original bytes can be recovered exactly.

use super::{Entry, StoredEntry};
use chrono::{DateTime, Local, NaiveDateTime};
use std::fmt::Write as _;
use thiserror::Error;

/// Timestamp layout used in the artifact (millisecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// First line of every record
pub const HEADER: &str = "timestamp,payload";

/// File extension of a record
pub const EXTENSION: &str = "csv";

/// Row parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// No separator between timestamp and payload
    #[error("missing payload field")]
    MissingField,

    /// Timestamp did not match the artifact layout
    #[error("invalid timestamp {0:?}")]
    BadTimestamp(String),

    /// Payload field is not enclosed in quotes
    #[error("payload field is not quoted")]
    Unquoted,

    /// Unknown or truncated escape sequence
    #[error("invalid escape at offset {0}")]
    BadEscape(usize),
}

/// Escape raw bytes into the payload text form
pub fn encode_payload(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02X}", b);
            }
        }
    }
    out
}

/// Reverse of [`encode_payload`]
pub fn decode_payload(text: &str) -> Result<Vec<u8>, FormatError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            Some(b'x') => {
                let hex_digits = bytes.get(i + 2..i + 4).ok_or(FormatError::BadEscape(i))?;
                let mut value = [0u8; 1];
                hex::decode_to_slice(hex_digits, &mut value)
                    .map_err(|_| FormatError::BadEscape(i))?;
                out.push(value[0]);
                i += 4;
            }
            _ => return Err(FormatError::BadEscape(i)),
        }
    }

    Ok(out)
}

/// Format a timestamp the way it appears in the artifact
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Render one entry as a record line (without trailing newline)
pub fn format_row(entry: &Entry) -> String {
    let payload = encode_payload(&entry.payload).replace('"', "\"\"");
    format!("{},\"{}\"", format_timestamp(&entry.timestamp), payload)
}

/// Parse one record line
pub fn parse_row(line: &str) -> Result<StoredEntry, FormatError> {
    let (timestamp, payload) = line.split_once(',').ok_or(FormatError::MissingField)?;

    let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| FormatError::BadTimestamp(timestamp.to_string()))?;

    let inner = payload
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .ok_or(FormatError::Unquoted)?;

    Ok(StoredEntry {
        timestamp,
        payload: decode_payload(&inner.replace("\"\"", "\""))?,
    })
}

/// Record file name for a session started at `started`, e.g. `data_20240908_123456.csv`
pub fn record_file_name(prefix: &str, started: &DateTime<Local>) -> String {
    format!("{}_{}.{}", prefix, started.format("%Y%m%d_%H%M%S"), EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 9, 8, h, m, s)
            .single()
            .unwrap()
            + chrono::Duration::milliseconds(i64::from(ms))
    }

    #[test]
    fn test_printable_text_is_kept() {
        assert_eq!(encode_payload(b"Temp=21.5 C"), "Temp=21.5 C");
    }

    #[test]
    fn test_control_and_high_bytes_are_escaped() {
        assert_eq!(encode_payload(b"OK\r\n"), "OK\\x0D\\x0A");
        assert_eq!(encode_payload(&[0x00, 0xFF, b'\\']), "\\x00\\xFF\\\\");
    }

    #[test]
    fn test_decode_rejects_bad_escapes() {
        assert_eq!(decode_payload("abc\\q"), Err(FormatError::BadEscape(3)));
        assert_eq!(decode_payload("\\x4"), Err(FormatError::BadEscape(0)));
        assert_eq!(decode_payload("\\xZZ"), Err(FormatError::BadEscape(0)));
    }

    #[test]
    fn test_every_byte_value_survives() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(decode_payload(&encode_payload(&all)).unwrap(), all);
    }

    #[test]
    fn test_row_quotes_embedded_delimiters() {
        let entry = Entry::new(at(12, 34, 56, 789), &b"a,\"b\"\n"[..]);
        let row = format_row(&entry);
        assert_eq!(row, "2024-09-08 12:34:56.789,\"a,\"\"b\"\"\\x0A\"");
        assert!(!row.contains('\n'));

        let parsed = parse_row(&row).unwrap();
        assert_eq!(parsed.payload, b"a,\"b\"\n");
        assert_eq!(
            parsed.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            "2024-09-08 12:34:56.789"
        );
    }

    #[test]
    fn test_parse_row_errors() {
        assert_eq!(parse_row("no separator"), Err(FormatError::MissingField));
        assert!(matches!(parse_row("yesterday,\"x\""), Err(FormatError::BadTimestamp(_))));
        assert_eq!(
            parse_row("2024-09-08 12:34:56.789,x"),
            Err(FormatError::Unquoted)
        );
    }

    #[test]
    fn test_record_file_name() {
        assert_eq!(
            record_file_name("data", &at(9, 5, 7, 0)),
            "data_20240908_090507.csv"
        );
    }
}
