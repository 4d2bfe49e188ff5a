//! Text-level operations on a two-line character display.
use crate::GpioResult;
use crate::lcd::hd44780::{CursorDirection, HD44780Driver};
use log::{debug, warn};
use std::thread::sleep;
use std::time::Duration;

/// Characters drawn on a line before wrapping to the next one.
pub const DEFAULT_CHARS_PER_LINE: usize = 32;

/// Minimum settle time after each shift instruction.
pub const SHIFT_DELAY: Duration = Duration::from_micros(10);

/// A display line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Line {
    One,
    Two,
}

impl Line {
    /// Maps a 1-based line number to a [Line]. Anything other than `2` falls back to the
    /// first line.
    pub fn coerce(line: usize) -> Line {
        match line {
            1 => Line::One,
            2 => Line::Two,
            other => {
                debug!("Invalid line number {}, using line 1", other);
                Line::One
            }
        }
    }

    /// DDRAM address of the first character of the line.
    pub fn address(self) -> u8 {
        match self {
            Line::One => 0x00,
            Line::Two => 0x40,
        }
    }
}

/// Display controller: clear, position, shift and render text through an [HD44780Driver].
///
/// Every render starts from a cleared display, so nothing about the controller's cursor or
/// shift state has to be tracked here.
#[derive(Debug)]
pub struct Display<D> {
    driver: D,
    chars_per_line: usize,
}

impl<D: HD44780Driver> Display<D> {
    pub fn new(driver: D) -> Self {
        Display {
            driver,
            chars_per_line: DEFAULT_CHARS_PER_LINE,
        }
    }

    pub fn with_chars_per_line(mut self, chars_per_line: usize) -> Self {
        self.chars_per_line = chars_per_line;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_inner(self) -> D {
        self.driver
    }

    pub fn init(&mut self) -> GpioResult<()> {
        self.driver.init()
    }

    pub fn clear(&mut self) -> GpioResult<()> {
        debug!("Clearing display");
        self.driver.clear_display()
    }

    /// Moves the cursor to the start of `line` (1 or 2, anything else means 1).
    pub fn set_line_position(&mut self, line: usize) -> GpioResult<()> {
        self.move_to(Line::coerce(line))
    }

    pub fn shift_left(&mut self) -> GpioResult<()> {
        self.shift(CursorDirection::Left)
    }

    pub fn shift_right(&mut self) -> GpioResult<()> {
        self.shift(CursorDirection::Right)
    }

    fn shift(&mut self, direction: CursorDirection) -> GpioResult<()> {
        debug!("Shifting display {:?}", direction);
        self.driver.cursor_shift(true, direction)?;
        sleep(SHIFT_DELAY);
        Ok(())
    }

    fn move_to(&mut self, line: Line) -> GpioResult<()> {
        self.driver.set_ddram_address(line.address())
    }

    fn draw(&mut self, line: Line, text: &[u8]) -> GpioResult<()> {
        self.move_to(line)?;
        for &byte in text {
            self.driver.send_data(byte)?;
        }
        Ok(())
    }

    /// Clears the display and draws `text` from the start of `start_line`.
    ///
    /// Text starting on line 1 wraps to line 2 after [Self::chars_per_line] characters. Whatever
    /// doesn't fit is dropped. Returns the number of characters drawn.
    pub fn render(&mut self, text: &[u8], start_line: usize) -> GpioResult<usize> {
        let start = Line::coerce(start_line);
        self.clear()?;

        if text.is_empty() {
            return Ok(0);
        }

        let (first, rest) = text.split_at(text.len().min(self.chars_per_line));
        self.draw(start, first)?;
        let mut drawn = first.len();

        if !rest.is_empty() && start == Line::One {
            let second = &rest[..rest.len().min(self.chars_per_line)];
            self.draw(Line::Two, second)?;
            drawn += second.len();
        }

        if drawn < text.len() {
            warn!("{} bytes did not fit on the display and were dropped", text.len() - drawn);
        }

        Ok(drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Op {
        Command(u8),
        Data(u8),
    }

    /// Pairs instruction nibbles back into commands.
    #[derive(Debug, Default)]
    struct Recorder {
        ops: Vec<Op>,
        pending: Option<u8>,
        last_sent: Option<Instant>,
    }

    impl HD44780Driver for Recorder {
        fn init(&mut self) -> GpioResult<()> {
            Ok(())
        }

        fn send_instruction(&mut self, instruction: u8) -> GpioResult<()> {
            self.last_sent = Some(Instant::now());
            match self.pending.take() {
                Some(high) => self.ops.push(Op::Command(high | (instruction >> 4))),
                None => self.pending = Some(instruction & 0xF0),
            }
            Ok(())
        }

        fn send_data(&mut self, data: u8) -> GpioResult<()> {
            assert!(self.pending.is_none(), "data in the middle of a command");
            self.ops.push(Op::Data(data));
            Ok(())
        }
    }

    const CLEAR: Op = Op::Command(0x01);
    const LINE_ONE: Op = Op::Command(0x80);
    const LINE_TWO: Op = Op::Command(0xC0);

    fn data(text: &[u8]) -> Vec<Op> {
        text.iter().map(|&b| Op::Data(b)).collect()
    }

    fn ops(display: &Display<Recorder>) -> Vec<Op> {
        assert!(display.driver().pending.is_none());
        display.driver().ops.clone()
    }

    #[test]
    fn render_short_text_on_line_one() {
        let mut display = Display::new(Recorder::default());

        assert_eq!(display.render(b"HELLO", 1).unwrap(), 5);

        let mut expected = vec![CLEAR, LINE_ONE];
        expected.extend(data(b"HELLO"));
        assert_eq!(ops(&display), expected);
    }

    #[test]
    fn render_wraps_to_line_two() {
        let mut display = Display::new(Recorder::default());
        let text: Vec<u8> = (0..40).map(|i| b'A' + (i % 26) as u8).collect();

        assert_eq!(display.render(&text, 1).unwrap(), 40);

        let mut expected = vec![CLEAR, LINE_ONE];
        expected.extend(data(&text[..32]));
        expected.push(LINE_TWO);
        expected.extend(data(&text[32..]));
        assert_eq!(ops(&display), expected);
    }

    #[test]
    fn render_drops_what_does_not_fit() {
        let mut display = Display::new(Recorder::default()).with_chars_per_line(4);

        assert_eq!(display.render(b"abcdefghij", 1).unwrap(), 8);

        let mut expected = vec![CLEAR, LINE_ONE];
        expected.extend(data(b"abcd"));
        expected.push(LINE_TWO);
        expected.extend(data(b"efgh"));
        assert_eq!(ops(&display), expected);
    }

    #[test]
    fn render_from_line_two_does_not_wrap() {
        let mut display = Display::new(Recorder::default()).with_chars_per_line(4);

        assert_eq!(display.render(b"abcdef", 2).unwrap(), 4);

        let mut expected = vec![CLEAR, LINE_TWO];
        expected.extend(data(b"abcd"));
        assert_eq!(ops(&display), expected);
    }

    #[test]
    fn invalid_start_line_falls_back_to_line_one() {
        let mut display = Display::new(Recorder::default());

        display.render(b"x", 7).unwrap();
        display.set_line_position(0).unwrap();

        assert_eq!(ops(&display), vec![CLEAR, LINE_ONE, Op::Data(b'x'), LINE_ONE]);
    }

    #[test]
    fn render_empty_text_only_clears() {
        let mut display = Display::new(Recorder::default());

        assert_eq!(display.render(b"", 1).unwrap(), 0);
        assert_eq!(ops(&display), vec![CLEAR]);
    }

    #[test]
    fn shifts() {
        let mut display = Display::new(Recorder::default());

        display.shift_left().unwrap();
        display.shift_right().unwrap();

        assert_eq!(ops(&display), vec![Op::Command(0x18), Op::Command(0x1C)]);
    }

    #[test]
    fn shift_waits_after_the_instruction() {
        let mut display = Display::new(Recorder::default());

        display.shift_left().unwrap();
        let returned = Instant::now();

        let sent = display.driver().last_sent.unwrap();
        assert!(returned - sent >= SHIFT_DELAY);
    }
}
