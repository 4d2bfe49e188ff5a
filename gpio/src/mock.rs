//! In-memory GPIO driver that records every level change.
//!
//! Used as the test double for everything above the signal level. Besides the plain
//! [GpioDriver] behaviour it can replay the recorded signals as the HD44780 controller would
//! see them: [MockGpioDriver::transfers] latches the data lines on each falling edge of the
//! enable strobe, and [frames] pairs the resulting nibbles back into bytes.
use crate::lcd::hd44780::LineAssignment;
use crate::{GpioDriver, GpioError, GpioResult};
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A single recorded level change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignalEvent {
    pub at: Instant,
    pub line: usize,
    pub high: bool,
}

/// One nibble latched by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    /// When the enable strobe went high.
    pub at: Instant,
    /// Time between the last data/RS change and the rising edge of the strobe.
    pub setup: Duration,
    /// How long the strobe stayed high.
    pub pulse: Duration,
    /// `true` for display data, `false` for an instruction.
    pub register_select: bool,
    /// Levels of D7..D4, as the upper nibble shifted down.
    pub nibble: u8,
}

/// A full byte reassembled from two consecutive transfers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    Command(u8),
    Data(u8),
}

#[derive(Default)]
struct MockState {
    claimed: BTreeSet<usize>,
    levels: Vec<Option<bool>>,
    events: Vec<SignalEvent>,
    releases: Vec<usize>,
}

pub struct MockGpioDriver {
    count: usize,
    foreign: BTreeSet<usize>,
    state: Mutex<MockState>,
}

impl MockGpioDriver {
    /// Creates a driver exposing `count` lines, none of them claimed.
    pub fn new(count: usize) -> Self {
        MockGpioDriver {
            count,
            foreign: BTreeSet::new(),
            state: Mutex::new(MockState {
                levels: vec![None; count],
                ..MockState::default()
            }),
        }
    }

    /// Marks lines as held by some other consumer. Claiming them always fails with
    /// [GpioError::LineBusy].
    pub fn with_foreign_lines(mut self, lines: &[usize]) -> Self {
        self.foreign.extend(lines.iter().copied());
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_foreign(&self, line: usize) -> bool {
        self.foreign.contains(&line)
    }

    /// Lines currently claimed through this driver, sorted.
    pub fn claimed(&self) -> Vec<usize> {
        self.state().claimed.iter().copied().collect()
    }

    /// Lines that were actually released, in release order.
    pub fn releases(&self) -> Vec<usize> {
        self.state().releases.clone()
    }

    /// Last level driven on `line`, if it was ever configured.
    pub fn level(&self, line: usize) -> Option<bool> {
        self.state().levels.get(line).copied().flatten()
    }

    pub fn events(&self) -> Vec<SignalEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Decodes the recorded signals into the nibbles the controller would have latched.
    pub fn transfers(&self, lines: &LineAssignment) -> Vec<Transfer> {
        decode_transfers(&self.state().events, lines)
    }
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({})", self.count)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> usize {
        self.count
    }

    fn claim(&self, line: usize, _label: &str) -> GpioResult<()> {
        if !self.is_valid(line) {
            return Err(GpioError::InvalidLine(line));
        }
        if self.foreign.contains(&line) {
            return Err(GpioError::LineBusy(line));
        }

        let mut state = self.state();
        if !state.claimed.insert(line) {
            return Err(GpioError::LineBusy(line));
        }
        state.levels[line] = Some(false);
        Ok(())
    }

    fn release(&self, line: usize) {
        let mut state = self.state();
        if state.claimed.remove(&line) {
            state.releases.push(line);
        }
    }

    fn set_level(&self, line: usize, high: bool) -> GpioResult<()> {
        let mut state = self.state();
        if !state.claimed.contains(&line) {
            return Err(GpioError::NotClaimed(line));
        }
        state.levels[line] = Some(high);
        state.events.push(SignalEvent {
            at: Instant::now(),
            line,
            high,
        });
        Ok(())
    }
}

fn decode_transfers(events: &[SignalEvent], lines: &LineAssignment) -> Vec<Transfer> {
    let data = [lines.d4, lines.d5, lines.d6, lines.d7];
    let mut levels = [false; 4];
    let mut rs = false;
    let mut en = false;
    let mut last_change: Option<Instant> = None;
    let mut rise: Option<(Instant, Duration)> = None;
    let mut transfers = Vec::new();

    for event in events {
        if event.line == lines.en {
            match (en, event.high) {
                (false, true) => {
                    let setup = last_change.map_or(Duration::MAX, |at| event.at - at);
                    rise = Some((event.at, setup));
                }
                (true, false) => {
                    if let Some((at, setup)) = rise.take() {
                        let nibble = levels
                            .iter()
                            .enumerate()
                            .fold(0u8, |acc, (bit, &high)| acc | (u8::from(high) << bit));
                        transfers.push(Transfer {
                            at,
                            setup,
                            pulse: event.at - at,
                            register_select: rs,
                            nibble,
                        });
                    }
                }
                _ => {}
            }
            en = event.high;
        } else if event.line == lines.rs {
            rs = event.high;
            last_change = Some(event.at);
        } else if let Some(bit) = data.iter().position(|&line| line == event.line) {
            levels[bit] = event.high;
            last_change = Some(event.at);
        }
    }

    transfers
}

/// Pairs consecutive transfers into bytes, high nibble first. A trailing odd transfer is
/// dropped, so only feed this traffic that was sent a byte at a time.
pub fn frames(transfers: &[Transfer]) -> Vec<Frame> {
    transfers
        .chunks_exact(2)
        .map(|pair| {
            let byte = (pair[0].nibble << 4) | pair[1].nibble;
            if pair[0].register_select {
                Frame::Data(byte)
            } else {
                Frame::Command(byte)
            }
        })
        .collect()
}
