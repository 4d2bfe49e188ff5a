use lcdmux_gpio::GpioError;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError {
    /// The LCD lines could not be reserved at startup. Nothing is left claimed.
    #[error("LCD line assignment rejected: {0}")]
    Configuration(GpioError),
    #[error("invalid value `{value}` for {name}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("unable to allocate {0} device sessions")]
    ResourceExhausted(usize),
    #[error("device {0} does not exist")]
    NotFound(usize),
    #[error("{len} bytes do not fit in the {capacity}-byte buffer")]
    BufferOverflow { len: usize, capacity: usize },
    #[error("invalid command {0:#x}")]
    InvalidCommand(u32),
    #[error("device {0} is busy")]
    Busy(usize),
    #[error("timed out waiting for device {0}")]
    TimedOut(usize),
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
}

pub type LcdResult<T> = Result<T, LcdError>;
