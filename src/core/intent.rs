//! Single-assignment session intent
//!
//! The intent starts as [`Intent::Running`] and can be decided exactly once.
//! Later attempts are ignored and report `false`.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;

/// How the operator wants the session to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Not decided yet
    Running,
    /// Keep the record
    Commit,
    /// Delete the record
    Discard,
}

impl Intent {
    fn to_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Commit => 1,
            Self::Discard => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Commit,
            2 => Self::Discard,
            _ => Self::Running,
        }
    }
}

/// Set-once, read-many intent shared between the key watcher and the controller
#[derive(Debug)]
pub struct SessionIntent {
    value: AtomicU8,
    decided: Notify,
}

impl Default for SessionIntent {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIntent {
    /// New undecided intent
    pub fn new() -> Self {
        Self {
            value: AtomicU8::new(Intent::Running.to_u8()),
            decided: Notify::new(),
        }
    }

    /// Current value
    pub fn get(&self) -> Intent {
        Intent::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Whether a decision has been made
    pub fn is_decided(&self) -> bool {
        self.get() != Intent::Running
    }

    /// Decide the intent. Returns `true` only for the call that made the decision.
    pub fn set(&self, intent: Intent) -> bool {
        if intent == Intent::Running {
            return false;
        }

        let won = self
            .value
            .compare_exchange(
                Intent::Running.to_u8(),
                intent.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            self.decided.notify_one();
        }
        won
    }

    /// Wait until the intent has been decided
    pub async fn decided(&self) -> Intent {
        loop {
            let notified = self.decided.notified();
            let current = self.get();
            if current != Intent::Running {
                return current;
            }
            notified.await;
        }
    }
}
