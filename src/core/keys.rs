//! Keyboard control sequences
//!
//! Two sequences end a session:
//!
//! | Keys   | Bytes       | Intent  |
//! |--------|-------------|---------|
//! | Ctrl+X | `0x18`      | Discard |
//! | Alt+C  | `0x1B` `c`  | Commit  |
//!
//! Alt is recognized the way terminals send it: an escape lead-in followed
//! by the letter. When the byte after the lead-in is not the commit letter,
//! that byte is replayed from the idle state, so `ESC ESC c` still commits
//! and `ESC Ctrl+X` still discards.

use crate::core::input::{InputError, KeySource};
use crate::core::intent::{Intent, SessionIntent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Discard control code (Ctrl+X)
pub const DISCARD_KEY: u8 = 0x18;

/// Escape lead-in sent before an Alt-modified key
pub const ESCAPE: u8 = 0x1B;

/// Commit letter following the escape lead-in (either case)
pub const COMMIT_LETTER: u8 = b'c';

/// Recognizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyState {
    /// Waiting for the start of a sequence
    #[default]
    Idle,
    /// Escape lead-in seen, waiting for the commit letter
    SawEscape,
}

/// Byte-at-a-time recognizer for the control sequences
#[derive(Debug, Clone, Default)]
pub struct KeyRecognizer {
    state: KeyState,
}

impl KeyRecognizer {
    /// New recognizer in the idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> KeyState {
        self.state
    }

    /// Feed one byte; returns the intent it completes, if any
    pub fn feed(&mut self, byte: u8) -> Option<Intent> {
        match self.state {
            KeyState::Idle => self.dispatch_idle(byte),
            KeyState::SawEscape => {
                if byte.eq_ignore_ascii_case(&COMMIT_LETTER) {
                    self.state = KeyState::Idle;
                    Some(Intent::Commit)
                } else {
                    debug!(byte, "Escape not followed by commit letter; replaying byte");
                    self.state = KeyState::Idle;
                    self.dispatch_idle(byte)
                }
            }
        }
    }

    fn dispatch_idle(&mut self, byte: u8) -> Option<Intent> {
        match byte {
            DISCARD_KEY => Some(Intent::Discard),
            ESCAPE => {
                self.state = KeyState::SawEscape;
                None
            }
            _ => None,
        }
    }
}

/// Why the key watcher stopped
#[derive(Debug)]
pub enum WatchEnd {
    /// This watcher decided the intent
    Decided(Intent),
    /// The intent had already been decided elsewhere
    AlreadyDecided,
    /// The session was cancelled before a sequence arrived
    Cancelled,
    /// Keyboard input is not available
    InputFailed(InputError),
}

/// Read keys until a control sequence decides the session intent.
///
/// Stops consuming input as soon as the intent is set.
pub fn watch_keys(
    keys: &mut dyn KeySource,
    intent: &SessionIntent,
    cancel: &CancellationToken,
) -> WatchEnd {
    let mut recognizer = KeyRecognizer::new();

    loop {
        let byte = match keys.next_key(cancel) {
            Ok(Some(byte)) => byte,
            Ok(None) => return WatchEnd::Cancelled,
            Err(e) => return WatchEnd::InputFailed(e),
        };

        if let Some(decision) = recognizer.feed(byte) {
            return if intent.set(decision) {
                info!(intent = ?decision, "Control sequence received");
                WatchEnd::Decided(decision)
            } else {
                WatchEnd::AlreadyDecided
            };
        }
    }
}
