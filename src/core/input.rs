//! Raw keyboard input
//!
//! [`TerminalKeys`] reads single bytes from the controlling terminal with echo
//! and line buffering switched off. Raw mode is held only for the duration of
//! one [`KeySource::next_key`] call and is restored by a guard on every exit
//! path, including cancellation and unwinding.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Keyboard input errors
#[derive(Error, Debug)]
pub enum InputError {
    /// Standard input is not an interactive terminal
    #[error("Standard input is not a terminal")]
    NotATerminal,

    /// Input reached end of file
    #[error("Input closed")]
    Closed,

    /// I/O error
    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),
}

/// A blocking source of raw key bytes
pub trait KeySource: Send {
    /// Next byte, or `None` once `cancel` fires
    fn next_key(&mut self, cancel: &CancellationToken) -> Result<Option<u8>, InputError>;
}

/// Stand-in used when no terminal is attached; every read reports the reason
#[derive(Debug, Default)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn next_key(&mut self, _cancel: &CancellationToken) -> Result<Option<u8>, InputError> {
        Err(InputError::NotATerminal)
    }
}

#[cfg(unix)]
pub use self::unix::TerminalKeys;

#[cfg(not(unix))]
pub use self::fallback::TerminalKeys;

#[cfg(unix)]
mod unix {
    use super::{InputError, KeySource};
    use nix::errno::Errno;
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    use nix::sys::termios::{self, LocalFlags, OutputFlags, SetArg, Termios};
    use std::fs::File;
    use std::io::{ErrorKind, Read};
    use std::os::fd::{AsFd, BorrowedFd};
    use tokio_util::sync::CancellationToken;
    use tracing::warn;

    /// Milliseconds between cancellation checks while waiting for a key
    const POLL_MS: u16 = 100;

    /// Restores the saved terminal mode when dropped
    struct RawModeGuard<'a> {
        fd: BorrowedFd<'a>,
        saved: Termios,
    }

    impl<'a> RawModeGuard<'a> {
        fn enter(fd: BorrowedFd<'a>) -> Result<Self, InputError> {
            let saved = termios::tcgetattr(fd).map_err(std::io::Error::from)?;
            let raw = raw_attributes(&saved);
            termios::tcsetattr(fd, SetArg::TCSANOW, &raw).map_err(std::io::Error::from)?;
            Ok(Self { fd, saved })
        }
    }

    /// Unbuffered, unechoed input. Output processing stays on so received data
    /// still prints line by line, and ISIG stays on so Ctrl+C raises SIGINT.
    fn raw_attributes(saved: &Termios) -> Termios {
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        raw.output_flags.insert(OutputFlags::OPOST);
        raw.local_flags.insert(LocalFlags::ISIG);
        raw
    }

    impl Drop for RawModeGuard<'_> {
        fn drop(&mut self) {
            if let Err(e) = termios::tcsetattr(self.fd, SetArg::TCSANOW, &self.saved) {
                warn!(error = %e, "Failed to restore terminal mode");
            }
        }
    }

    /// Raw single-byte reader over the process's standard input terminal
    pub struct TerminalKeys {
        tty: File,
    }

    impl TerminalKeys {
        /// Attach to standard input. Fails if it is not a terminal.
        pub fn new() -> Result<Self, InputError> {
            let owned = std::io::stdin().as_fd().try_clone_to_owned()?;
            let tty = File::from(owned);
            match termios::tcgetattr(&tty) {
                Ok(_) => Ok(Self { tty }),
                Err(Errno::ENOTTY) => Err(InputError::NotATerminal),
                Err(e) => Err(InputError::Io(e.into())),
            }
        }
    }

    impl KeySource for TerminalKeys {
        fn next_key(&mut self, cancel: &CancellationToken) -> Result<Option<u8>, InputError> {
            let fd = self.tty.as_fd();
            let _raw = RawModeGuard::enter(fd)?;

            loop {
                if cancel.is_cancelled() {
                    return Ok(None);
                }

                let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
                match poll(&mut fds, PollTimeout::from(POLL_MS)) {
                    Ok(0) | Err(Errno::EINTR) => continue,
                    Ok(_) => {}
                    Err(e) => return Err(InputError::Io(e.into())),
                }

                let mut byte = [0u8; 1];
                match (&self.tty).read(&mut byte) {
                    Ok(0) => return Err(InputError::Closed),
                    Ok(_) => return Ok(Some(byte[0])),
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

}

#[cfg(not(unix))]
mod fallback {
    use super::{InputError, KeySource};
    use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
    use std::io::Read;
    use tokio_util::sync::CancellationToken;
    use tracing::warn;

    struct RawModeGuard;

    impl RawModeGuard {
        fn enter() -> Result<Self, InputError> {
            enable_raw_mode()?;
            Ok(Self)
        }
    }

    impl Drop for RawModeGuard {
        fn drop(&mut self) {
            if let Err(e) = disable_raw_mode() {
                warn!(error = %e, "Failed to restore terminal mode");
            }
        }
    }

    /// Raw single-byte reader over standard input.
    ///
    /// A read in progress cannot be interrupted here; cancellation is only
    /// observed between keys.
    pub struct TerminalKeys;

    impl TerminalKeys {
        /// Attach to standard input. Fails if it is not a terminal.
        pub fn new() -> Result<Self, InputError> {
            if atty::is(atty::Stream::Stdin) {
                Ok(Self)
            } else {
                Err(InputError::NotATerminal)
            }
        }
    }

    impl KeySource for TerminalKeys {
        fn next_key(&mut self, cancel: &CancellationToken) -> Result<Option<u8>, InputError> {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let _raw = RawModeGuard::enter()?;
            let mut byte = [0u8; 1];
            match std::io::stdin().read(&mut byte)? {
                0 => Err(InputError::Closed),
                _ => Ok(Some(byte[0])),
            }
        }
    }
}
