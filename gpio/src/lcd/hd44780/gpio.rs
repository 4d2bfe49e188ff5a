use crate::lcd::hd44780::{CursorDirection, HD44780Driver, LineAssignment};
use crate::{GpioDriver, GpioResult, Reservation};
use log::{debug, trace};
use std::thread::sleep;
use std::time::Duration;

/// Wait before every transfer, in place of polling the busy flag.
const SETTLE_DELAY: Duration = Duration::from_millis(2);
/// Data and RS setup time before the enable strobe rises.
const SETUP_DELAY: Duration = Duration::from_micros(5);
/// Hold time on each edge of the enable strobe.
const PULSE_DELAY: Duration = Duration::from_micros(5);

const POWER_ON_DELAY: Duration = Duration::from_millis(41);
const FIRST_PROBE_DELAY: Duration = Duration::from_millis(5);
const COMMAND_DELAY: Duration = Duration::from_micros(100);
const FUNCTION_SET_DELAY: Duration = Duration::from_millis(41);

/// HD44780 driver on a write-only 4-bit bus made of GPIO lines.
///
/// Every transfer waits [SETTLE_DELAY] (2 ms), puts the nibble on D7..D4, sets RS, waits 5 µs and
/// strobes E high then low with 5 µs on each edge. All delays are minimums, the thread may
/// sleep longer.
#[derive(Debug)]
pub struct GpioHD44780Driver<'a> {
    lines: Reservation<'a>,
    assignment: LineAssignment,
}

impl<'a> GpioHD44780Driver<'a> {
    /// Reserves the six lines of `assignment` on `driver`.
    ///
    /// Either all lines are claimed or, on error, none are. The panel itself is not touched
    /// until [HD44780Driver::init] is called.
    pub fn new(driver: &'a dyn GpioDriver, assignment: LineAssignment) -> GpioResult<Self> {
        let lines = Reservation::acquire(driver, &assignment.requests())?;
        debug!("{:?}: LCD lines reserved", lines);
        Ok(GpioHD44780Driver { lines, assignment })
    }

    /// Releases the lines, last one first.
    pub fn release(self) {
        debug!("{:?}: releasing LCD lines", self.lines);
        self.lines.release();
    }

    fn write_nibble(&self, nibble: u8) -> GpioResult<()> {
        self.lines.set_level(self.assignment.d7, nibble & 0b1000 != 0)?;
        self.lines.set_level(self.assignment.d6, nibble & 0b0100 != 0)?;
        self.lines.set_level(self.assignment.d5, nibble & 0b0010 != 0)?;
        self.lines.set_level(self.assignment.d4, nibble & 0b0001 != 0)?;
        Ok(())
    }

    fn pulse_e(&self) -> GpioResult<()> {
        self.lines.set_level(self.assignment.en, true)?;
        sleep(PULSE_DELAY);
        // Falling edge latches the nibble
        self.lines.set_level(self.assignment.en, false)?;
        sleep(PULSE_DELAY);
        Ok(())
    }

    /// One transfer cycle of bits 7–4 of `byte`.
    fn transfer(&self, byte: u8, rs: bool) -> GpioResult<()> {
        sleep(SETTLE_DELAY);

        let nibble = (byte >> 4) & 0x0F;
        trace!("Writing nibble: {:04b}, RS: {}", nibble, rs);
        self.write_nibble(nibble)?;
        self.lines.set_level(self.assignment.rs, rs)?;
        sleep(SETUP_DELAY);

        self.pulse_e()
    }
}

impl HD44780Driver for GpioHD44780Driver<'_> {
    fn init(&mut self) -> GpioResult<()> {
        debug!("{:?}: initializing HD44780", self.lines);
        sleep(POWER_ON_DELAY);

        // Synchronize: three 8-bit function sets bring the controller into a known state,
        // whichever interface width it woke up in.
        self.send_instruction(0b00110000)?;
        sleep(FIRST_PROBE_DELAY);
        self.send_instruction(0b00110000)?;
        sleep(COMMAND_DELAY);
        self.send_instruction(0b00110000)?;
        sleep(COMMAND_DELAY);

        // Switch to the 4-bit interface. From here on every command takes two transfers.
        self.send_instruction(0b00100000)?;
        sleep(COMMAND_DELAY);

        self.function_set(false, true, false)?;
        sleep(FUNCTION_SET_DELAY);

        self.set_display_control(false, false, false)?;
        sleep(COMMAND_DELAY);
        self.clear_display()?;
        sleep(COMMAND_DELAY);
        self.set_entry_mode(CursorDirection::Right, false)?;
        sleep(COMMAND_DELAY);
        self.set_display_control(true, true, true)?;
        sleep(COMMAND_DELAY);

        debug!("{:?}: HD44780 initialized", self.lines);
        Ok(())
    }

    fn send_instruction(&mut self, instruction: u8) -> GpioResult<()> {
        trace!("Sending instruction: {:08b}", instruction);
        self.transfer(instruction, false)
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        trace!("Sending data: {:08b}", data);
        self.transfer(data, true)?;
        self.transfer(data << 4, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioError;
    use crate::mock::{Frame, MockGpioDriver, frames};
    use std::time::Instant;

    fn assignment() -> LineAssignment {
        LineAssignment {
            rs: 1,
            en: 2,
            d4: 3,
            d5: 4,
            d6: 5,
            d7: 6,
        }
    }

    #[test]
    fn new_reserves_all_six_lines() {
        let mock = MockGpioDriver::new(8);
        let driver = GpioHD44780Driver::new(&mock, assignment()).unwrap();

        assert_eq!(mock.claimed(), vec![1, 2, 3, 4, 5, 6]);
        // Reserving does not talk to the panel.
        assert!(mock.events().is_empty());

        driver.release();
        assert!(mock.claimed().is_empty());
        assert_eq!(mock.releases(), vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn new_with_invalid_line_claims_nothing() {
        let mock = MockGpioDriver::new(8);
        let lines = LineAssignment { d6: 99, ..assignment() };

        assert_eq!(GpioHD44780Driver::new(&mock, lines).unwrap_err(), GpioError::InvalidLine(99));
        assert!(mock.claimed().is_empty());
        assert_eq!(mock.releases(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn new_with_busy_line_claims_nothing() {
        let mock = MockGpioDriver::new(8).with_foreign_lines(&[2]);

        assert_eq!(
            GpioHD44780Driver::new(&mock, assignment()).unwrap_err(),
            GpioError::LineBusy(2)
        );
        assert!(mock.claimed().is_empty());
    }

    #[test]
    fn instruction_is_a_single_transfer() {
        let mock = MockGpioDriver::new(8);
        let mut driver = GpioHD44780Driver::new(&mock, assignment()).unwrap();

        driver.send_instruction(0xA7).unwrap();

        let transfers = mock.transfers(&assignment());
        assert_eq!(transfers.len(), 1);
        assert!(!transfers[0].register_select);
        assert_eq!(transfers[0].nibble, 0xA);
    }

    #[test]
    fn data_is_two_transfers_with_settle() {
        let mock = MockGpioDriver::new(8);
        let mut driver = GpioHD44780Driver::new(&mock, assignment()).unwrap();

        let start = Instant::now();
        driver.send_data(b'H').unwrap();

        let transfers = mock.transfers(&assignment());
        assert_eq!(transfers.len(), 2);
        assert!(transfers.iter().all(|t| t.register_select));
        assert_eq!(frames(&transfers), vec![Frame::Data(b'H')]);

        assert!(transfers[0].at - start >= SETTLE_DELAY);
        assert!(transfers[1].at - transfers[0].at >= SETTLE_DELAY);
        for transfer in &transfers {
            assert!(transfer.setup >= SETUP_DELAY);
            assert!(transfer.pulse >= PULSE_DELAY);
        }
    }

    #[test]
    fn init_sequence_order_and_minimum_delays() {
        let mock = MockGpioDriver::new(8);
        let mut driver = GpioHD44780Driver::new(&mock, assignment()).unwrap();

        let start = Instant::now();
        driver.init().unwrap();

        let transfers = mock.transfers(&assignment());
        let nibbles: Vec<u8> = transfers.iter().map(|t| t.nibble).collect();
        assert_eq!(
            nibbles,
            vec![
                0x3, 0x3, 0x3, 0x2, // synchronize, switch to 4-bit
                0x2, 0x8, // function set: 2 lines, 5x8
                0x0, 0x8, // display off
                0x0, 0x1, // clear
                0x0, 0x6, // entry mode: increment
                0x0, 0xF, // display, cursor and blink on
            ]
        );
        assert!(transfers.iter().all(|t| !t.register_select));

        // Minimum gap before each transfer, on top of the per-transfer settle.
        let extra = [
            POWER_ON_DELAY,
            FIRST_PROBE_DELAY,
            COMMAND_DELAY,
            COMMAND_DELAY,
            COMMAND_DELAY,
            Duration::ZERO,
            FUNCTION_SET_DELAY,
            Duration::ZERO,
            COMMAND_DELAY,
            Duration::ZERO,
            COMMAND_DELAY,
            Duration::ZERO,
            COMMAND_DELAY,
            Duration::ZERO,
        ];
        let mut previous = start;
        for (transfer, extra) in transfers.iter().zip(extra) {
            assert!(transfer.at >= previous);
            assert!(transfer.at - previous >= SETTLE_DELAY + extra);
            previous = transfer.at;
        }

        assert!(transfers[0].at - start >= Duration::from_millis(40));
        assert!(transfers[1].at - transfers[0].at >= Duration::from_micros(4100));
        assert!(transfers[6].at - transfers[5].at >= Duration::from_millis(40));
    }
}
