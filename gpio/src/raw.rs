//! Register-level GPIO driver for the BCM283x family, mapped through `/dev/gpiomem` or `/dev/mem`.
use crate::{GpioDriver, GpioError, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000
    // #[cfg(target_pointer_width = "64")]
    // const GPIO_BASE: u32 = 0xFE200000;
    // #[cfg(target_pointer_width = "32")]
    const GPIO_BASE: u32 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    const FUNCTION_INPUT: u8 = 0b000;
    const FUNCTION_OUTPUT: u8 = 0b001;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
                .offset(offset)
                .len(4096)
                .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    /// Maps the GPIO block through `/dev/gpiomem`, which exposes only the GPIO registers and
    /// does not need root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block out of physical memory. Needs root.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE as u64)
    }

    fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidLine(pin_index));
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift); // Clear the bits for this pin
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidLine(pin_index));
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPSETn/GPCLRn register
        let register = if high { 0x1c / 4 } else { 0x28 / 4 };
        let register_ptr = unsafe { mmap.add(register + pin_index / 32) };
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> usize {
        Self::PIN_COUNT
    }

    fn claim(&self, line: usize, label: &str) -> GpioResult<()> {
        if !self.is_valid(line) {
            return Err(GpioError::InvalidLine(line));
        }

        if self.used_pins[line] {
            return Err(GpioError::LineBusy(line));
        }

        self.used_pins.set_aliased(line, true);
        // Drive low before switching to output so the line never glitches high.
        self.raw_set_pin_output(line, false)?;
        self.raw_set_pin_function(line, Self::FUNCTION_OUTPUT)?;
        trace!("{:?}: line {} claimed as {}", self, line, label);

        Ok(())
    }

    fn release(&self, line: usize) {
        if !self.is_valid(line) || !self.used_pins[line] {
            return;
        }

        // Leave the line floating, the way we found it.
        _ = self.raw_set_pin_function(line, Self::FUNCTION_INPUT);
        self.used_pins.set_aliased(line, false);
    }

    fn set_level(&self, line: usize, high: bool) -> GpioResult<()> {
        if !self.is_valid(line) || !self.used_pins[line] {
            return Err(GpioError::NotClaimed(line));
        }

        self.raw_set_pin_output(line, high)
    }
}
