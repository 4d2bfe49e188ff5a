//! HD44780 LCD module.
//!
//! The [HD44780Driver] trait carries the instruction set of the controller as bit-pattern
//! builders on top of two raw primitives, [HD44780Driver::send_instruction] and
//! [HD44780Driver::send_data]. [GpioHD44780Driver] implements those primitives over a 4-bit
//! parallel bus made of six GPIO lines.
//!
//! The bus is write-only (R/W is tied to ground), so the busy flag can't be polled and every
//! transfer is preceded by a fixed settle delay instead.
mod gpio;

use crate::{GpioError, GpioResult};
pub use gpio::*;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Binds each signal of the 4-bit interface to a GPIO line number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LineAssignment {
    /// Register select. Low for instructions, high for display data.
    pub rs: usize,
    /// Enable strobe. The controller latches the data lines on its falling edge.
    pub en: usize,
    pub d4: usize,
    pub d5: usize,
    pub d6: usize,
    pub d7: usize,
}

impl LineAssignment {
    /// The six lines with their consumer labels, in reservation order.
    pub fn requests(&self) -> [(usize, &'static str); 6] {
        [
            (self.rs, "LCD_RS"),
            (self.en, "LCD_EN"),
            (self.d4, "LCD_D4"),
            (self.d5, "LCD_D5"),
            (self.d6, "LCD_D6"),
            (self.d7, "LCD_D7"),
        ]
    }
}

impl Default for LineAssignment {
    fn default() -> Self {
        LineAssignment {
            rs: 22,
            en: 17,
            d4: 26,
            d5: 16,
            d6: 20,
            d7: 21,
        }
    }
}

/// Low-level interface of an HD44780 controller.
///
/// Every command is a single byte. On the 4-bit bus it goes out as two instruction transfers,
/// high nibble first, see [HD44780Driver::send_command].
pub trait HD44780Driver: Debug + Send {
    /// Runs the power-on initialization sequence, leaving the controller in 4-bit, 2-line mode
    /// with the display on.
    fn init(&mut self) -> GpioResult<()>;

    /// Sends the upper nibble (bits 7–4) of `instruction` as a single instruction transfer.
    /// The lower nibble is ignored.
    fn send_instruction(&mut self, instruction: u8) -> GpioResult<()>;

    /// Sends a full byte of display data as two transfers.
    fn send_data(&mut self, data: u8) -> GpioResult<()>;

    /// Sends a full command byte as two instruction transfers.
    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send_instruction(command & 0xF0)?;
        self.send_instruction(command << 4)
    }

    /// Clears the display and sets the cursor to the home position.
    ///
    /// Command: `00000001`.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets how the cursor moves after each character and whether the display follows it.
    ///
    /// Command: `000001IS`.
    /// `I` is `1` to move right (increment), `0` to move left.
    /// `S` is `1` to shift the display along with the cursor.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> GpioResult<()> {
        let mut command = 0b00000100;
        if cursor_direction == CursorDirection::Right {
            command |= 0b00000010;
        }
        if shift {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Turns the display on or off, and controls the cursor and its blinking.
    ///
    /// Command: `00001DCB`.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> GpioResult<()> {
        let mut command = 0b00001000;
        if display_on {
            command |= 0b00000100;
        }
        if cursor_on {
            command |= 0b00000010;
        }
        if blink_on {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Moves the cursor or shifts the whole display by one position.
    ///
    /// Command: `0001SR??`.
    /// `S` is `1` to shift the display, `0` to move the cursor.
    /// `R` is `1` for right, `0` for left.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> GpioResult<()> {
        let mut command = 0b00010000;
        if display_shift {
            command |= 0b00001000;
        }
        if direction == CursorDirection::Right {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the interface width, the number of display lines and the font.
    ///
    /// Command: `001DNF??`.
    /// `D` is `1` for the 8-bit interface, `0` for 4-bit.
    /// `N` is `1` for two lines.
    /// `F` is `1` for the 5×10 font, `0` for 5×8.
    fn function_set(&mut self, data_length: bool, two_lines: bool, font: bool) -> GpioResult<()> {
        let mut command = 0b00100000;
        if data_length {
            command |= 0b00010000;
        }
        if two_lines {
            command |= 0b00001000;
        }
        if font {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the DDRAM address, which is where the next character will be written.
    ///
    /// Command: `1AAAAAAA`.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b01111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing data.
    Left,
    /// Moves the cursor to the right after writing data.
    Right,
}
