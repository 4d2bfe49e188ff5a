use crate::config::Config;
use crate::error::{LcdError, LcdResult};
use crate::session::{AccessPolicy, DeviceSlot, Session};
use lcdmux_gpio::GpioDriver;
use lcdmux_gpio::lcd::display::Display;
use lcdmux_gpio::lcd::hd44780::GpioHD44780Driver;
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The LCD subsystem: one display on a shared bus, multiplexed between a fixed set of logical
/// devices.
///
/// Devices are independent of each other except for the bus: every render goes through the same
/// lock, so traffic of two devices never interleaves on the wire.
#[derive(Debug)]
pub struct Subsystem<'d> {
    display: Mutex<Display<GpioHD44780Driver<'d>>>,
    devices: Vec<DeviceSlot>,
    buffer_capacity: usize,
    access: AccessPolicy,
}

impl<'d> Subsystem<'d> {
    /// Brings the subsystem up: allocates the device table, reserves the LCD lines and runs the
    /// controller initialization.
    ///
    /// # Errors
    /// - `LcdError::InvalidSetting` if `config` doesn't validate.
    /// - `LcdError::ResourceExhausted` if the device table can't be allocated.
    /// - `LcdError::Configuration` if any LCD line can't be reserved. No line stays claimed.
    /// - `LcdError::Gpio` if the initialization sequence fails.
    pub fn new(driver: &'d dyn GpioDriver, config: &Config) -> LcdResult<Self> {
        config.validate()?;
        info!("Initializing LCD subsystem with {} device(s)", config.devices);

        let mut devices = Vec::new();
        devices
            .try_reserve_exact(config.devices)
            .map_err(|_| LcdError::ResourceExhausted(config.devices))?;
        for index in 0..config.devices {
            devices.push(DeviceSlot::new(index, config.buffer_capacity)?);
        }
        debug!("Allocated {} device slot(s), {} bytes each", devices.len(), config.buffer_capacity);

        let engine = GpioHD44780Driver::new(driver, config.lines).map_err(|err| {
            warn!("Failed to reserve LCD lines {:?}: {}", config.lines, err);
            LcdError::Configuration(err)
        })?;
        info!("LCD lines reserved: {:?}", config.lines);

        let mut display = Display::new(engine).with_chars_per_line(config.chars_per_line);
        // On failure the display drops here, giving the lines back.
        display.init()?;
        info!("LCD initialized");

        Ok(Subsystem {
            display: Mutex::new(display),
            devices,
            buffer_capacity: config.buffer_capacity,
            access: config.access,
        })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Opens device `index` with the configured [AccessPolicy].
    pub fn open(&self, index: usize) -> LcdResult<Session<'_, 'd>> {
        self.open_with(index, self.access)
    }

    /// Opens device `index`, waiting for the current holder as `policy` says.
    ///
    /// # Errors
    /// - `LcdError::NotFound` if there is no such device.
    /// - `LcdError::Busy` / `LcdError::TimedOut` if the device stays open elsewhere.
    pub fn open_with(&self, index: usize, policy: AccessPolicy) -> LcdResult<Session<'_, 'd>> {
        let slot = self.devices.get(index).ok_or(LcdError::NotFound(index))?;
        let buffer = slot.acquire(policy)?;
        info!("Device {} opened", index);
        Ok(Session::new(self, slot, buffer))
    }

    /// Runs `f` with exclusive access to the bus.
    pub(crate) fn with_display<T>(
        &self,
        f: impl FnOnce(&mut Display<GpioHD44780Driver<'d>>) -> lcdmux_gpio::GpioResult<T>,
    ) -> LcdResult<T> {
        let mut display = self.lock_display();
        Ok(f(&mut *display)?)
    }

    fn lock_display(&self) -> MutexGuard<'_, Display<GpioHD44780Driver<'d>>> {
        self.display.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("LCD bus lock poisoned, continuing");
            poisoned.into_inner()
        })
    }

    /// Tears the subsystem down, releasing the LCD lines last to first.
    ///
    /// No session can outlive this call, they all borrow the subsystem.
    pub fn shutdown(self) {
        let Subsystem { display, devices, .. } = self;

        let display = display.into_inner().unwrap_or_else(PoisonError::into_inner);
        display.into_inner().release();
        drop(devices);

        info!("LCD subsystem shut down");
    }
}
