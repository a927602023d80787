//! Interactive device selection

use crate::config::AppConfig;
use std::io::{self, BufRead, Write};

/// Ask which device to record from.
///
/// Offers the previously used device first; otherwise (or when declined)
/// asks for a device name, listing `available` ports as a hint. Blank
/// answers are asked again. End of input is an `UnexpectedEof` error.
pub fn choose_device<R: BufRead, W: Write>(
    config: &AppConfig,
    available: &[String],
    input: &mut R,
    output: &mut W,
) -> io::Result<String> {
    if let Ok(previous) = config.load_last_device() {
        writeln!(output, "Previously used device: {previous}")?;
        write!(output, "Use this device? (Y/N): ")?;
        output.flush()?;

        let answer = read_answer(input)?;
        if matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes") {
            return Ok(previous);
        }
    }

    if !available.is_empty() {
        writeln!(output, "Available ports: {}", available.join(", "))?;
    }

    loop {
        write!(output, "Enter the serial device (e.g. COM3 or /dev/ttyUSB0): ")?;
        output.flush()?;

        let answer = read_answer(input)?;
        if !answer.is_empty() {
            return Ok(answer);
        }
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no device entered",
        ));
    }
    Ok(line.trim().to_string())
}
