//! A two-line HD44780 character display on a 4-bit GPIO bus, shared between a fixed number of
//! logical devices.
//!
//! A [Subsystem] owns the bus. Callers [open](Subsystem::open) a device to get a [Session],
//! write text to it and issue [Command]s. Each device can be open by one caller at a time.
pub mod command;
pub mod config;
pub mod error;
pub mod session;
pub mod subsystem;

pub use command::Command;
pub use config::Config;
pub use error::{LcdError, LcdResult};
pub use session::{AccessPolicy, Session};
pub use subsystem::Subsystem;
