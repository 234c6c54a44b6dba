use core::time::Duration;
use std::path::Path;

use log::{debug, trace, warn};

use super::i2c::I2cInterface;
use super::pause::Nanosleep;
use super::{
    write_measurement_time, Error, Functionality, Interface, InvalidArgument, Mode, Pause,
    DEFAULT_MEASUREMENT_TIME, MAX_MEASUREMENT_TIME, MIN_MEASUREMENT_TIME, POWER_DOWN, POWER_UP,
    RESET,
};

/// A BH1750 bound to one bus and one acquisition mode.
///
/// The bus is released by [`Bh1750::destroy`], which also returns the device
/// to power-down with the default measurement time.
pub struct Bh1750<IF, P>
where
    IF: Interface,
    P: Pause,
{
    interface: IF,
    pause: P,
    address: u8,
    mode: Mode,
    measurement_time: u8,
    factor: f32,
    wait: Duration,
    armed: bool,
}

impl Bh1750<I2cInterface, Nanosleep> {
    /// Opens `path` (a Linux `i2c-dev` node) and binds the sensor at `address`.
    pub fn create<M>(
        path: impl AsRef<Path>,
        address: u8,
        mode: M,
    ) -> Result<Self, Error<std::io::Error>>
    where
        M: TryInto<Mode>,
        InvalidArgument: From<M::Error>,
    {
        let mode = mode.try_into().map_err(InvalidArgument::from)?;
        let interface = I2cInterface::open(path, address).map_err(Error::Io)?;
        Self::with_mode(interface, Nanosleep, address, mode)
    }
}

impl<IF, P> Bh1750<IF, P>
where
    IF: Interface,
    P: Pause,
{
    /// Takes ownership of an open bus. On failure the bus is closed before
    /// the error is returned.
    pub fn new<M>(
        interface: IF,
        pause: P,
        address: u8,
        mode: M,
    ) -> Result<Self, Error<IF::Error>>
    where
        M: TryInto<Mode>,
        InvalidArgument: From<M::Error>,
    {
        match mode.try_into() {
            Ok(mode) => Self::with_mode(interface, pause, address, mode),
            Err(err) => {
                abandon(interface);
                Err(InvalidArgument::from(err).into())
            }
        }
    }

    fn with_mode(
        mut interface: IF,
        pause: P,
        address: u8,
        mode: Mode,
    ) -> Result<Self, Error<IF::Error>> {
        if let Err(err) = interface.bind(address) {
            abandon(interface);
            return Err(Error::Io(err));
        }
        let missing = Functionality::REQUIRED.difference(interface.functionality());
        if !missing.is_empty() {
            abandon(interface);
            return Err(Error::UnsupportedBus { missing });
        }

        let mut sensor = Self {
            interface,
            pause,
            address,
            mode,
            measurement_time: DEFAULT_MEASUREMENT_TIME,
            factor: mode.scale_factor(DEFAULT_MEASUREMENT_TIME),
            wait: mode.wait_duration(DEFAULT_MEASUREMENT_TIME),
            armed: false,
        };
        if let Err(err) = sensor.configure(DEFAULT_MEASUREMENT_TIME) {
            abandon(sensor.interface);
            return Err(err);
        }
        debug!("bh1750@{:#04x}: created in {:?}", address, mode);
        Ok(sensor)
    }

    /// Sets the measurement time register.
    ///
    /// Longer times raise sensitivity and the conversion wait. The register is
    /// only rewritten, with a power cycle, when the value actually changes.
    pub fn configure(&mut self, measurement_time: u8) -> Result<(), Error<IF::Error>> {
        if !(MIN_MEASUREMENT_TIME..=MAX_MEASUREMENT_TIME).contains(&measurement_time) {
            return Err(InvalidArgument::MeasurementTime(measurement_time).into());
        }
        let factor = self.mode.scale_factor(measurement_time);
        let wait = self.mode.wait_duration(measurement_time);

        if measurement_time != self.measurement_time {
            write_measurement_time(&mut self.interface, measurement_time).map_err(Error::Io)?;
            self.measurement_time = measurement_time;
            // The power cycle stopped any free-running measurement.
            self.armed = false;
            debug!(
                "bh1750@{:#04x}: measurement time {}",
                self.address, measurement_time
            );
        }
        self.factor = factor;
        self.wait = wait;
        Ok(())
    }

    /// Triggers (when needed) and reads one measurement, in lux.
    pub fn read(&mut self) -> Result<f32, Error<IF::Error>> {
        if self.mode.is_one_shot() || !self.armed {
            self.interface
                .write_byte(self.mode.opcode())
                .map_err(Error::Io)?;
            if self.mode.is_continuous() {
                self.armed = true;
            }
        }

        self.wait_for_conversion();

        let raw = self.interface.read_word().map_err(Error::Io)?;
        let counts = raw.swap_bytes();
        trace!("bh1750@{:#04x}: raw {:#06x}", self.address, counts);
        Ok(f32::from(counts) * self.factor)
    }

    /// Clears the data register. Powers the device up first, since reset is
    /// ignored in power-down.
    pub fn reset(&mut self) -> Result<(), Error<IF::Error>> {
        self.interface.write_byte(POWER_UP).map_err(Error::Io)?;
        self.interface.write_byte(RESET).map_err(Error::Io)
    }

    /// Stops the device. A continuous mode is re-armed by the next read.
    pub fn power_down(&mut self) -> Result<(), Error<IF::Error>> {
        self.interface.write_byte(POWER_DOWN).map_err(Error::Io)?;
        self.armed = false;
        Ok(())
    }

    /// Best-effort return to power-down and default timing, then
    /// closes the bus. Only the close failure is reported.
    pub fn destroy(self) -> Result<(), Error<IF::Error>> {
        self.release().close().map_err(Error::Io)
    }

    /// Same device cleanup as [`Bh1750::destroy`], but hands the still open
    /// bus back instead of closing it.
    pub fn release(self) -> IF {
        let Self {
            mut interface,
            address,
            measurement_time,
            armed,
            ..
        } = self;

        if armed {
            if let Err(err) = interface.write_byte(POWER_DOWN) {
                warn!("bh1750@{:#04x}: power down failed: {:?}", address, err);
            }
        }
        if measurement_time != DEFAULT_MEASUREMENT_TIME {
            if let Err(err) = write_measurement_time(&mut interface, DEFAULT_MEASUREMENT_TIME) {
                warn!(
                    "bh1750@{:#04x}: restoring measurement time failed: {:?}",
                    address, err
                );
            }
        }
        interface
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn measurement_time(&self) -> u8 {
        self.measurement_time
    }

    pub fn scale_factor(&self) -> f32 {
        self.factor
    }

    pub fn wait_duration(&self) -> Duration {
        self.wait
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn wait_for_conversion(&mut self) {
        let mut remaining = self.wait;
        while !remaining.is_zero() {
            remaining = self.pause.pause(remaining).min(remaining);
        }
    }
}

fn abandon<IF: Interface>(interface: IF) {
    if let Err(err) = interface.close() {
        warn!("bh1750: closing bus failed: {:?}", err);
    }
}
