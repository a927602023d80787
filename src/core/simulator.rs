//! Virtual devices and keyboards
//!
//! Scriptable stand-ins for the serial port and the terminal, used for demo
//! runs without hardware and for exercising the session controller.

use crate::core::input::{InputError, KeySource};
use crate::core::transport::{ByteSource, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Granularity of simulated blocking
const IDLE_TICK: Duration = Duration::from_millis(2);

/// Set once a scripted device has delivered (and seen appended) every chunk
#[derive(Debug, Clone, Default)]
pub struct DrainFlag(Arc<AtomicBool>);

impl DrainFlag {
    /// Whether the device has run out of script
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// One step of a device script
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver these bytes as a single read
    Data(Vec<u8>),
    /// Block for this long before the next step
    Delay(Duration),
    /// Fail the next read as if the device was unplugged
    Disconnect,
}

/// A device that replays a fixed script, then stays silent
pub struct ScriptedDevice {
    name: String,
    steps: VecDeque<Step>,
    drained: DrainFlag,
}

impl ScriptedDevice {
    /// Device named `name` with an empty script
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: VecDeque::new(),
            drained: DrainFlag::default(),
        }
    }

    /// Queue one read worth of data
    #[must_use]
    pub fn data(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push_back(Step::Data(bytes.into()));
        self
    }

    /// Queue a pause
    #[must_use]
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push_back(Step::Delay(duration));
        self
    }

    /// Queue a disconnect
    #[must_use]
    pub fn disconnect(mut self) -> Self {
        self.steps.push_back(Step::Disconnect);
        self
    }

    /// Flag raised when the read after the last scripted chunk begins.
    ///
    /// Reads are sequential, so by then every chunk has been appended.
    pub fn drained(&self) -> DrainFlag {
        self.drained.clone()
    }
}

impl ByteSource for ScriptedDevice {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize, TransportError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(0);
            }

            match self.steps.pop_front() {
                Some(Step::Data(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.steps.push_front(Step::Data(bytes[n..].to_vec()));
                    }
                    if n > 0 {
                        return Ok(n);
                    }
                }
                Some(Step::Delay(duration)) => sleep_unless_cancelled(duration, cancel),
                Some(Step::Disconnect) => {
                    return Err(TransportError::Disconnected(self.name.clone()));
                }
                None => {
                    self.drained.set();
                    std::thread::sleep(IDLE_TICK);
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} (simulated)", self.name)
    }
}

/// A device that emits a numbered line at a fixed interval, forever
pub struct TickerDevice {
    interval: Duration,
    counter: u64,
}

impl TickerDevice {
    /// Emit `SIM <n>\r\n` every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            counter: 0,
        }
    }
}

impl ByteSource for TickerDevice {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize, TransportError> {
        sleep_unless_cancelled(self.interval, cancel);
        if cancel.is_cancelled() {
            return Ok(0);
        }

        self.counter += 1;
        let line = format!("SIM {}\r\n", self.counter);
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line.as_bytes()[..n]);
        Ok(n)
    }

    fn describe(&self) -> String {
        format!("ticker every {:?} (simulated)", self.interval)
    }
}

/// A keyboard that types a fixed sequence of bytes
pub struct ScriptedKeys {
    bytes: VecDeque<u8>,
    wait_for: Option<DrainFlag>,
}

impl ScriptedKeys {
    /// Type `bytes` immediately
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().collect(),
            wait_for: None,
        }
    }

    /// Hold the first key until `flag` is set
    #[must_use]
    pub fn after(mut self, flag: DrainFlag) -> Self {
        self.wait_for = Some(flag);
        self
    }
}

impl KeySource for ScriptedKeys {
    fn next_key(&mut self, cancel: &CancellationToken) -> Result<Option<u8>, InputError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let gated = self.wait_for.as_ref().is_some_and(|flag| !flag.is_set());
            if !gated {
                if let Some(byte) = self.bytes.pop_front() {
                    return Ok(Some(byte));
                }
            }
            std::thread::sleep(IDLE_TICK);
        }
    }
}

fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) {
    let deadline = std::time::Instant::now() + duration;
    while !cancel.is_cancelled() {
        let now = std::time::Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(IDLE_TICK.min(deadline - now));
    }
}
