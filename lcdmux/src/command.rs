//! Control commands and their ioctl numbers.
//!
//! The numbers are the ones the character-device version of this driver answered to, built the
//! same way as Linux's `_IO`/`_IOW` macros with the `'x'` magic.
use crate::error::{LcdError, LcdResult};

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;

const fn ioc(direction: u32, kind: u8, number: u8, size: usize) -> u32 {
    (direction << 30) | ((size as u32) << 16) | ((kind as u32) << 8) | number as u32
}

/// `_IO('x', 1)`: clear the display, parameter ignored.
pub const LCD_CLEAR: u32 = ioc(IOC_NONE, b'x', 1, 0);
/// `_IOW('x', 2, int)`: shift the display left, parameter is the repeat count.
pub const LCD_SHIFT_LEFT: u32 = ioc(IOC_WRITE, b'x', 2, size_of::<i32>());
/// `_IOW('x', 3, int)`: shift the display right, parameter is the repeat count.
pub const LCD_SHIFT_RIGHT: u32 = ioc(IOC_WRITE, b'x', 3, size_of::<i32>());

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Clear,
    ShiftLeft(u32),
    ShiftRight(u32),
}

impl Command {
    /// Decodes an ioctl request.
    ///
    /// The repeat count is truncated to 32 bits, the width of the `int` argument.
    ///
    /// # Errors
    /// - `LcdError::InvalidCommand` for any code other than the three above.
    pub fn from_ioctl(code: u32, param: u64) -> LcdResult<Command> {
        match code {
            LCD_CLEAR => Ok(Command::Clear),
            LCD_SHIFT_LEFT => Ok(Command::ShiftLeft(param as u32)),
            LCD_SHIFT_RIGHT => Ok(Command::ShiftRight(param as u32)),
            other => Err(LcdError::InvalidCommand(other)),
        }
    }

    /// The ioctl request for this command, as `(code, param)`.
    pub fn to_ioctl(self) -> (u32, u64) {
        match self {
            Command::Clear => (LCD_CLEAR, 0),
            Command::ShiftLeft(count) => (LCD_SHIFT_LEFT, count.into()),
            Command::ShiftRight(count) => (LCD_SHIFT_RIGHT, count.into()),
        }
    }
}
