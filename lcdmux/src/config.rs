use crate::error::{LcdError, LcdResult};
use crate::session::AccessPolicy;
use lcdmux_gpio::lcd::display::DEFAULT_CHARS_PER_LINE;
use lcdmux_gpio::lcd::hd44780::LineAssignment;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env::var_os;
use std::ffi::OsStr;
use std::path::Path;
use std::str::FromStr;

/// Length of one DDRAM line of the HD44780.
pub const MAX_CHARS_PER_LINE: usize = 40;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of logical devices sharing the display.
    pub devices: usize,
    pub lines: LineAssignment,
    /// Size of each device's content buffer, in bytes.
    pub buffer_capacity: usize,
    pub chars_per_line: usize,
    pub access: AccessPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            devices: 1,
            lines: LineAssignment::default(),
            buffer_capacity: 32,
            chars_per_line: DEFAULT_CHARS_PER_LINE,
            access: AccessPolicy::default(),
        }
    }
}

/// Parses a list of four line numbers separated by commas, semicolons or spaces.
pub fn parse_line_list(list: &str) -> LcdResult<[usize; 4]> {
    let invalid = || LcdError::InvalidSetting {
        name: "data lines",
        value: list.to_string(),
    };

    list.split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?
        .try_into()
        .map_err(|_| invalid())
}

fn parse_setting<T: FromStr>(name: &'static str, value: &str) -> LcdResult<T> {
    value.trim().parse().map_err(|_| LcdError::InvalidSetting {
        name,
        value: value.to_string(),
    })
}

impl Config {
    /// Reads the JSON config file named by `LCDMUX_CONFIG`, or `lcdmux.json`.
    ///
    /// Returns `None` if the file is missing or can't be parsed.
    pub fn try_load() -> Option<Self> {
        let config_str = var_os("LCDMUX_CONFIG");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("lcdmux.json"));
        Self::from_file(Path::new(config_str))
    }

    /// Reads a JSON config file. A file that exists but doesn't parse is reported with a warning,
    /// since the caller then falls back to other line numbers.
    pub fn from_file(config_path: &Path) -> Option<Self> {
        if !config_path.exists() {
            return None;
        }
        let file = std::fs::File::open(config_path).ok()?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .inspect_err(|err| warn!("Ignoring malformed {:?}: {}", config_path, err))
            .ok()
    }

    /// Defaults overridden by the `LCDMUX_*` environment variables (and `.env`).
    pub fn from_env() -> LcdResult<Self> {
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `LCDMUX_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LcdResult<Self> {
        let mut config = Config::default();

        if let Some(value) = lookup("LCDMUX_DEVICES") {
            config.devices = parse_setting("device count", &value)?;
        }
        if let Some(value) = lookup("LCDMUX_PIN_RS") {
            config.lines.rs = parse_setting("RS line", &value)?;
        }
        if let Some(value) = lookup("LCDMUX_PIN_EN") {
            config.lines.en = parse_setting("EN line", &value)?;
        }
        if let Some(value) = lookup("LCDMUX_PINS_DATA") {
            let [d4, d5, d6, d7] = parse_line_list(&value)?;
            config.lines = LineAssignment {
                d4,
                d5,
                d6,
                d7,
                ..config.lines
            };
        }
        if let Some(value) = lookup("LCDMUX_BUFFER_SIZE") {
            config.buffer_capacity = parse_setting("buffer size", &value)?;
        }
        if let Some(value) = lookup("LCDMUX_CHARS_PER_LINE") {
            config.chars_per_line = parse_setting("characters per line", &value)?;
        }
        if let Some(value) = lookup("LCDMUX_ACCESS") {
            config.access = value.parse()?;
        }

        Ok(config)
    }

    /// The config file if there is one, the environment otherwise.
    pub fn load() -> LcdResult<Self> {
        match Self::try_load() {
            Some(config) => {
                debug!("Config loaded from file");
                Ok(config)
            }
            None => {
                debug!("No config file, reading environment");
                Self::from_env()
            }
        }
    }

    pub fn validate(&self) -> LcdResult<()> {
        if self.devices == 0 {
            return Err(LcdError::InvalidSetting {
                name: "device count",
                value: self.devices.to_string(),
            });
        }
        if self.buffer_capacity == 0 {
            return Err(LcdError::InvalidSetting {
                name: "buffer size",
                value: self.buffer_capacity.to_string(),
            });
        }
        if !(1..=MAX_CHARS_PER_LINE).contains(&self.chars_per_line) {
            return Err(LcdError::InvalidSetting {
                name: "characters per line",
                value: self.chars_per_line.to_string(),
            });
        }
        Ok(())
    }
}
