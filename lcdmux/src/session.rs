//! Per-device exclusive sessions.
//!
//! Each device owns its pending-content buffer. While a [Session] is open the buffer lives in
//! the session itself, so "the device is open" and "the buffer is checked out" are the same
//! state. Closing the session hands the buffer back and wakes one waiter.
use crate::command::Command;
use crate::error::{LcdError, LcdResult};
use crate::subsystem::Subsystem;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What [Subsystem::open] does when the device is already open.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Wait for as long as it takes.
    #[default]
    Blocking,
    /// Fail right away with [LcdError::Busy].
    Try,
    /// Wait up to `millis` milliseconds, then fail with [LcdError::TimedOut].
    Timeout { millis: u64 },
}

impl Display for AccessPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessPolicy::Blocking => write!(f, "blocking"),
            AccessPolicy::Try => write!(f, "try"),
            AccessPolicy::Timeout { millis } => write!(f, "timeout:{}", millis),
        }
    }
}

impl FromStr for AccessPolicy {
    type Err = LcdError;

    /// Parses `blocking`, `try` or `timeout:<ms>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LcdError::InvalidSetting {
            name: "access policy",
            value: s.to_string(),
        };

        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(AccessPolicy::Blocking),
            "try" => Ok(AccessPolicy::Try),
            other => {
                let millis = other
                    .strip_prefix("timeout:")
                    .ok_or_else(invalid)?
                    .trim()
                    .parse()
                    .map_err(|_| invalid())?;
                Ok(AccessPolicy::Timeout { millis })
            }
        }
    }
}

/// Bookkeeping for one logical device.
#[derive(Debug)]
pub(crate) struct DeviceSlot {
    index: usize,
    /// `None` while a session has the buffer checked out.
    buffer: Mutex<Option<Vec<u8>>>,
    released: Condvar,
}

impl DeviceSlot {
    pub(crate) fn new(index: usize, capacity: usize) -> LcdResult<Self> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| LcdError::ResourceExhausted(index + 1))?;

        Ok(DeviceSlot {
            index,
            buffer: Mutex::new(Some(buffer)),
            released: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the buffer out of the slot, waiting according to `policy`.
    pub(crate) fn acquire(&self, policy: AccessPolicy) -> LcdResult<Vec<u8>> {
        let mut slot = self.lock();

        match policy {
            AccessPolicy::Blocking => {
                slot = self
                    .released
                    .wait_while(slot, |buffer| buffer.is_none())
                    .unwrap_or_else(PoisonError::into_inner);
            }
            AccessPolicy::Try => {}
            AccessPolicy::Timeout { millis } => {
                let timeout = Duration::from_millis(millis);
                let (guard, _) = self
                    .released
                    .wait_timeout_while(slot, timeout, |buffer| buffer.is_none())
                    .unwrap_or_else(PoisonError::into_inner);
                slot = guard;
            }
        }

        slot.take().ok_or_else(|| match policy {
            AccessPolicy::Try => LcdError::Busy(self.index),
            _ => LcdError::TimedOut(self.index),
        })
    }

    /// Puts the buffer back and wakes one waiter.
    fn restore(&self, buffer: Vec<u8>) {
        let mut slot = self.lock();
        if slot.is_some() {
            warn!("Device {} released twice", self.index);
        }
        *slot = Some(buffer);
        drop(slot);
        self.released.notify_one();
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.lock().is_none()
    }
}

/// An open device. Only one session per device exists at a time.
///
/// Dropping the session closes it.
#[derive(Debug)]
pub struct Session<'s, 'd> {
    subsystem: &'s Subsystem<'d>,
    slot: &'s DeviceSlot,
    buffer: Vec<u8>,
}

impl<'s, 'd> Session<'s, 'd> {
    pub(crate) fn new(subsystem: &'s Subsystem<'d>, slot: &'s DeviceSlot, buffer: Vec<u8>) -> Self {
        Session {
            subsystem,
            slot,
            buffer,
        }
    }

    pub fn index(&self) -> usize {
        self.slot.index
    }

    /// The bytes accepted by the last successful [Self::write].
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Replaces the pending content with `bytes` and redraws the display from line 1.
    ///
    /// Returns the number of bytes accepted.
    ///
    /// # Errors
    /// - `LcdError::BufferOverflow` if `bytes` is longer than the buffer. The buffer and the
    ///   display are left untouched.
    pub fn write(&mut self, bytes: &[u8]) -> LcdResult<usize> {
        let capacity = self.subsystem.buffer_capacity();
        if bytes.len() > capacity {
            warn!(
                "Device {}: rejected write of {} bytes, buffer holds {}",
                self.index(),
                bytes.len(),
                capacity
            );
            return Err(LcdError::BufferOverflow {
                len: bytes.len(),
                capacity,
            });
        }

        self.buffer.clear();
        self.buffer.extend_from_slice(bytes);
        debug!("Device {}: writing {:?}", self.index(), String::from_utf8_lossy(&self.buffer));

        let buffer = &self.buffer;
        self.subsystem.with_display(|display| display.render(buffer, 1))?;

        Ok(bytes.len())
    }

    /// Reading is not supported by the panel. Reports `size` bytes as consumed without
    /// transferring anything.
    pub fn read(&self, size: usize) -> usize {
        debug!("Device {}: ignoring read of {} bytes, display is write-only", self.index(), size);
        size
    }

    pub fn control(&mut self, command: Command) -> LcdResult<()> {
        debug!("Device {}: {:?}", self.index(), command);

        self.subsystem.with_display(|display| match command {
            Command::Clear => display.clear(),
            Command::ShiftLeft(count) => (0..count).try_for_each(|_| display.shift_left()),
            Command::ShiftRight(count) => (0..count).try_for_each(|_| display.shift_right()),
        })
    }

    /// Decodes and runs a raw ioctl request, see [Command::from_ioctl].
    pub fn ioctl(&mut self, code: u32, param: u64) -> LcdResult<()> {
        let command = Command::from_ioctl(code, param).inspect_err(|err| {
            warn!("Device {}: {}", self.index(), err);
        })?;
        self.control(command)
    }

    /// Closes the session, making the device available to the next caller.
    pub fn close(self) {
        debug!("Device {}: closing", self.index());
    }
}

impl Drop for Session<'_, '_> {
    fn drop(&mut self) {
        self.slot.restore(std::mem::take(&mut self.buffer));
        info!("Device {} closed", self.slot.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn parse_access_policy() {
        assert_eq!("blocking".parse(), Ok(AccessPolicy::Blocking));
        assert_eq!(" Try ".parse(), Ok(AccessPolicy::Try));
        assert_eq!("timeout:250".parse(), Ok(AccessPolicy::Timeout { millis: 250 }));
        assert!("timeout:".parse::<AccessPolicy>().is_err());
        assert!("forever".parse::<AccessPolicy>().is_err());
    }

    #[test]
    fn access_policy_display_parses_back() {
        let policies = [
            AccessPolicy::Blocking,
            AccessPolicy::Try,
            AccessPolicy::Timeout { millis: 7 },
        ];
        for policy in policies {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }

    #[test]
    fn slot_is_exclusive() {
        let slot = DeviceSlot::new(3, 8).unwrap();

        let buffer = slot.acquire(AccessPolicy::Try).unwrap();
        assert!(buffer.capacity() >= 8);
        assert!(slot.is_open());
        assert_eq!(slot.acquire(AccessPolicy::Try), Err(LcdError::Busy(3)));

        slot.restore(buffer);
        assert!(!slot.is_open());
        assert!(slot.acquire(AccessPolicy::Try).is_ok());
    }

    #[test]
    fn timed_acquire_gives_up() {
        let slot = DeviceSlot::new(0, 8).unwrap();
        let _held = slot.acquire(AccessPolicy::Blocking).unwrap();

        let start = Instant::now();
        assert_eq!(
            slot.acquire(AccessPolicy::Timeout { millis: 20 }),
            Err(LcdError::TimedOut(0))
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn blocking_acquire_waits_for_restore() {
        let slot = DeviceSlot::new(0, 8).unwrap();
        let held = slot.acquire(AccessPolicy::Blocking).unwrap();

        thread::scope(|scope| {
            let waiter = scope.spawn(|| slot.acquire(AccessPolicy::Blocking));
            thread::sleep(Duration::from_millis(20));
            assert!(!waiter.is_finished());

            slot.restore(held);
            assert!(waiter.join().unwrap().is_ok());
        });
    }
}
