pub mod gpiod;
pub mod lcd;
pub mod mock;
pub mod raw;

use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("line {0} is not a valid line on this host")]
    InvalidLine(usize),
    #[error("line {0} already in use")]
    LineBusy(usize),
    #[error("line {0} was never claimed")]
    NotClaimed(usize),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A source of output lines.
///
/// Drivers are shared between every user of the lines, so all methods take `&self` and the
/// implementations keep their own claim bookkeeping.
pub trait GpioDriver: Debug + Send + Sync {
    /// Gets the amount of GPIO lines available.
    fn count(&self) -> usize;

    /// Checks whether `line` exists on this host.
    fn is_valid(&self, line: usize) -> bool {
        line < self.count()
    }

    /// Claims a single line for exclusive use and configures it as an output driven low.
    ///
    /// # Errors
    /// - `GpioError::InvalidLine` if the line does not exist.
    /// - `GpioError::LineBusy` if the line is already claimed, by us or by another consumer.
    fn claim(&self, line: usize, label: &str) -> GpioResult<()>;

    /// Gives a line back. Lines that are unknown or were never claimed are ignored.
    fn release(&self, line: usize);

    /// Drives a claimed line high or low.
    fn set_level(&self, line: usize, high: bool) -> GpioResult<()>;
}

/// A set of lines claimed together, all or nothing.
///
/// The lines are released in reverse acquisition order when the reservation is dropped.
pub struct Reservation<'a> {
    driver: &'a dyn GpioDriver,
    lines: Vec<usize>,
}

impl<'a> Reservation<'a> {
    /// Validates and claims every requested `(line, label)` pair in order.
    ///
    /// If any line is invalid or busy, the lines claimed so far are released (last one first)
    /// before the error is returned, so a failed call leaves nothing claimed.
    pub fn acquire(driver: &'a dyn GpioDriver, requests: &[(usize, &str)]) -> GpioResult<Self> {
        let mut reservation = Reservation {
            driver,
            lines: Vec::with_capacity(requests.len()),
        };

        for &(line, label) in requests {
            if !driver.is_valid(line) {
                debug!("{:?}: line {} ({}) is invalid", driver, line, label);
                return Err(GpioError::InvalidLine(line));
            }
            if let Err(err) = driver.claim(line, label) {
                debug!("{:?}: unable to claim line {} ({}): {}", driver, line, label, err);
                return Err(err);
            }
            trace!("{:?}: claimed line {} ({})", driver, line, label);
            reservation.lines.push(line);
        }

        Ok(reservation)
    }

    /// The claimed lines, in acquisition order.
    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    /// Drives one of the reserved lines.
    ///
    /// # Errors
    /// - `GpioError::NotClaimed` if `line` is not part of this reservation.
    pub fn set_level(&self, line: usize, high: bool) -> GpioResult<()> {
        if !self.lines.contains(&line) {
            return Err(GpioError::NotClaimed(line));
        }
        self.driver.set_level(line, high)
    }

    /// Releases every line now instead of at drop.
    pub fn release(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        while let Some(line) = self.lines.pop() {
            trace!("{:?}: releasing line {}", self.driver, line);
            self.driver.release(line);
        }
    }
}

impl Debug for Reservation<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.lines)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpioDriver;

    #[test]
    fn acquire_claims_all_lines_in_order() {
        let driver = MockGpioDriver::new(8);
        let reservation = Reservation::acquire(&driver, &[(3, "a"), (1, "b"), (5, "c")]).unwrap();

        assert_eq!(reservation.lines(), &[3, 1, 5]);
        assert_eq!(driver.claimed(), vec![1, 3, 5]);
    }

    #[test]
    fn invalid_line_rolls_back_in_reverse_order() {
        let driver = MockGpioDriver::new(8);
        let result = Reservation::acquire(&driver, &[(0, "a"), (1, "b"), (2, "c"), (42, "d")]);

        assert_eq!(result.unwrap_err(), GpioError::InvalidLine(42));
        assert!(driver.claimed().is_empty());
        assert_eq!(driver.releases(), vec![2, 1, 0]);
    }

    #[test]
    fn foreign_line_is_busy_and_left_alone() {
        let driver = MockGpioDriver::new(8).with_foreign_lines(&[4]);
        let result = Reservation::acquire(&driver, &[(0, "a"), (4, "b"), (5, "c")]);

        assert_eq!(result.unwrap_err(), GpioError::LineBusy(4));
        assert!(driver.claimed().is_empty());
        assert_eq!(driver.releases(), vec![0]);
        assert!(driver.is_foreign(4));
    }

    #[test]
    fn duplicate_line_is_busy() {
        let driver = MockGpioDriver::new(8);
        let result = Reservation::acquire(&driver, &[(2, "a"), (2, "b")]);

        assert_eq!(result.unwrap_err(), GpioError::LineBusy(2));
        assert!(driver.claimed().is_empty());
    }

    #[test]
    fn drop_releases_lines_last_first() {
        let driver = MockGpioDriver::new(8);
        {
            let _reservation =
                Reservation::acquire(&driver, &[(6, "a"), (2, "b"), (7, "c")]).unwrap();
        }

        assert!(driver.claimed().is_empty());
        assert_eq!(driver.releases(), vec![7, 2, 6]);
    }

    #[test]
    fn release_is_idempotent_at_driver_level() {
        let driver = MockGpioDriver::new(8);
        let reservation = Reservation::acquire(&driver, &[(1, "a")]).unwrap();
        reservation.release();

        driver.release(1);
        driver.release(5);
        driver.release(100);

        assert!(driver.claimed().is_empty());
    }

    #[test]
    fn set_level_outside_reservation_is_rejected() {
        let driver = MockGpioDriver::new(8);
        let reservation = Reservation::acquire(&driver, &[(1, "a")]).unwrap();

        assert_eq!(reservation.set_level(2, true), Err(GpioError::NotClaimed(2)));
        assert_eq!(reservation.set_level(1, true), Ok(()));
        assert_eq!(driver.level(1), Some(true));
    }
}
