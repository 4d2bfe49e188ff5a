//! GpiodDriver implementation for driving lines through the Linux GPIO character device.
//!
//! Works on any board whose GPIO controller is exposed as `/dev/gpiochipN`, so it is the backend
//! to use outside of the Raspberry Pi.
use crate::{GpioDriver, GpioError, GpioResult};
use log::{trace, warn};
use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO lines.
///
/// Every claimed line keeps its own kernel line request, which is dropped on release.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    requests: Mutex<Vec<Option<gpiod::Lines<gpiod::Output>>>>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        Self {
            chip,
            requests: Mutex::new((0..n).map(|_| None).collect()),
        }
    }

    /// Opens the chip at `path`, usually `/dev/gpiochip0`.
    pub fn open(path: &Path) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path)?))
    }

    fn requests(&self) -> MutexGuard<'_, Vec<Option<gpiod::Lines<gpiod::Output>>>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> usize {
        self.chip.num_lines() as usize
    }

    fn claim(&self, line: usize, label: &str) -> GpioResult<()> {
        if !self.is_valid(line) {
            return Err(GpioError::InvalidLine(line));
        }

        let mut requests = self.requests();
        if requests[line].is_some() {
            return Err(GpioError::LineBusy(line));
        }

        let lines = self
            .chip
            .request_lines(gpiod::Options::output([line as u32]).consumer(label))
            .map_err(|err| match err.kind() {
                // The kernel refuses lines requested by another consumer with EBUSY.
                ErrorKind::ResourceBusy => GpioError::LineBusy(line),
                _ => GpioError::from(err),
            })?;
        lines.set_values([false])?;
        trace!("{:?}: line {} requested as {}", self, line, label);

        requests[line] = Some(lines);
        Ok(())
    }

    fn release(&self, line: usize) {
        if let Some(slot) = self.requests().get_mut(line) {
            if slot.take().is_some() {
                trace!("{:?}: line {} released", self, line);
            }
        }
    }

    fn set_level(&self, line: usize, high: bool) -> GpioResult<()> {
        let requests = self.requests();
        let Some(Some(lines)) = requests.get(line) else {
            return Err(GpioError::NotClaimed(line));
        };

        lines.set_values([high]).inspect_err(|err| {
            warn!("{:?}: unable to drive line {}: {}", self, line, err);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn open_missing_chip_fails() {
        let path = PathBuf::from("/dev/lcdmux-no-such-gpiochip");

        assert!(GpiodDriver::open(&path).is_err());
        assert!(GpiodDriver::open(Path::new("/nonexistent/gpiochip0")).is_err());
    }
}
