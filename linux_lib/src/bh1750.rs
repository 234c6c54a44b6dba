//! BH1750 ambient light sensor.
//!
//! The sensor has no addressable registers: every instruction is a single
//! command byte and a measurement is a bare 16-bit big-endian word. The
//! driver in [`driver`] talks to it through an [`Interface`], so the same
//! state machine runs on Linux `i2c-dev` ([`i2c::I2cInterface`]) or on any
//! `embedded-hal` bus ([`i2c::HalInterface`]).

pub mod driver;
pub mod i2c;
pub mod pause;

pub use driver::Bh1750;

use core::convert::Infallible;
use core::fmt;
use core::ops::BitOr;
use core::time::Duration;

pub const DEVICE_ADDRESS: u8 = 0x23; // ADDR pin low
pub const DEVICE_ADDRESS_ALT: u8 = 0x5c; // ADDR pin high

const POWER_DOWN: u8 = 0x00;
const POWER_UP: u8 = 0x01;
const RESET: u8 = 0x07;

const MEASUREMENT_TIME_HIGH: u8 = 0x40; // | MT[7:5]
const MEASUREMENT_TIME_LOW: u8 = 0x60; // | MT[4:0]

pub const MIN_MEASUREMENT_TIME: u8 = 31;
pub const DEFAULT_MEASUREMENT_TIME: u8 = 69;
pub const MAX_MEASUREMENT_TIME: u8 = 254;

// Typical conversion time at the default measurement time, in ms.
const LOW_RES_WAIT_MS: u64 = 24;
const HIGH_RES_WAIT_MS: u64 = 180;

// Counts per lux at the default measurement time.
const COUNTS_PER_LUX: f32 = 1.2;

const CONTINUOUS_BIT: u8 = 0x10;
const ONE_SHOT_BIT: u8 = 0x20;
const LOW_RES_BITS: u8 = 0x03;
const HALF_LUX_BIT: u8 = 0x01;

/// Acquisition mode. The discriminant is the command byte that starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// 4 lx resolution, free running.
    ContinuousLow = 0x13,
    /// 1 lx resolution, free running.
    ContinuousHigh = 0x10,
    /// 0.5 lx resolution, free running.
    ContinuousHigh2 = 0x11,
    /// 4 lx resolution, powers down after each measurement.
    OneShotLow = 0x23,
    /// 1 lx resolution, powers down after each measurement.
    OneShotHigh = 0x20,
    /// 0.5 lx resolution, powers down after each measurement.
    OneShotHigh2 = 0x21,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::ContinuousLow,
        Mode::ContinuousHigh,
        Mode::ContinuousHigh2,
        Mode::OneShotLow,
        Mode::OneShotHigh,
        Mode::OneShotHigh2,
    ];

    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// The device keeps measuring after a single start command.
    pub const fn is_continuous(self) -> bool {
        self.opcode() & CONTINUOUS_BIT != 0
    }

    /// Every measurement needs its own start command.
    pub const fn is_one_shot(self) -> bool {
        self.opcode() & ONE_SHOT_BIT != 0
    }

    /// 4 lx per count.
    pub const fn is_low_resolution(self) -> bool {
        self.opcode() & LOW_RES_BITS == LOW_RES_BITS
    }

    /// 0.5 lx per count.
    pub const fn is_half_lux(self) -> bool {
        !self.is_low_resolution() && self.opcode() & HALF_LUX_BIT != 0
    }

    /// Lux per raw count for the given measurement time.
    pub fn scale_factor(self, measurement_time: u8) -> f32 {
        let factor = 1.0 / COUNTS_PER_LUX
            * (f32::from(DEFAULT_MEASUREMENT_TIME) / f32::from(measurement_time));
        if self.is_half_lux() {
            factor / 2.0
        } else {
            factor
        }
    }

    /// Worst-case conversion time for the given measurement time.
    pub fn wait_duration(self, measurement_time: u8) -> Duration {
        let base_ms = if self.is_low_resolution() {
            LOW_RES_WAIT_MS
        } else {
            HIGH_RES_WAIT_MS
        };
        Duration::from_nanos(
            base_ms * 1_000_000 * u64::from(measurement_time) / u64::from(DEFAULT_MEASUREMENT_TIME),
        )
    }
}

impl TryFrom<u8> for Mode {
    type Error = InvalidArgument;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.opcode() == value)
            .ok_or(InvalidArgument::Mode(value))
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        mode.opcode()
    }
}

/// Adapter capability flags, numbered as Linux `I2C_FUNC_*`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Functionality(u64);

impl Functionality {
    pub const I2C: Self = Self(0x0000_0001);
    pub const SMBUS_WRITE_BYTE: Self = Self(0x0004_0000);

    /// What the driver needs from a bus.
    pub const REQUIRED: Self = Self(Self::I2C.0 | Self::SMBUS_WRITE_BYTE.0);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags set in `self` but not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for Functionality {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Functionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Functionality({:#x})", self.0)
    }
}

/// A request rejected before any bus traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidArgument {
    #[error("unknown acquisition mode {0:#04x}")]
    Mode(u8),
    #[error(
        "measurement time {0} outside {min}..={max}",
        min = MIN_MEASUREMENT_TIME,
        max = MAX_MEASUREMENT_TIME
    )]
    MeasurementTime(u8),
}

impl From<Infallible> for InvalidArgument {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Driver error, generic over the transport's error type.
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error("bus I/O failed: {0}")]
    Io(#[source] E),
    #[error("bus adapter lacks required functionality {missing:?}")]
    UnsupportedBus { missing: Functionality },
}

/// Transactions the driver needs from a bus, bound to one device.
pub trait Interface {
    type Error: fmt::Debug;

    fn bind(&mut self, address: u8) -> Result<(), Self::Error>;
    fn functionality(&mut self) -> Functionality;
    fn write_byte(&mut self, value: u8) -> Result<(), Self::Error>;
    /// Two bytes packed SMBus style: first byte on the wire in bits 0..8.
    fn read_word(&mut self) -> Result<u16, Self::Error>;
    fn close(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}

/// Blocking wait that may return early.
pub trait Pause {
    /// Sleeps for up to `duration` and returns the part not slept.
    fn pause(&mut self, duration: Duration) -> Duration;
}

fn write_measurement_time<IF: Interface>(interface: &mut IF, value: u8) -> Result<(), IF::Error> {
    interface.write_byte(POWER_DOWN)?;
    interface.write_byte(MEASUREMENT_TIME_HIGH | ((value & 0xe0) >> 5))?;
    interface.write_byte(MEASUREMENT_TIME_LOW | (value & 0x1f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_partitions() {
        use Mode::*;

        for mode in Mode::ALL {
            assert_ne!(mode.is_continuous(), mode.is_one_shot(), "{mode:?}");
        }
        assert!(ContinuousLow.is_low_resolution() && OneShotLow.is_low_resolution());
        assert!(!ContinuousLow.is_half_lux() && !OneShotLow.is_half_lux());
        assert!(ContinuousHigh2.is_half_lux() && OneShotHigh2.is_half_lux());
        assert!(!ContinuousHigh.is_half_lux() && !ContinuousHigh.is_low_resolution());
        assert!(OneShotHigh.is_one_shot() && ContinuousHigh.is_continuous());
    }

    #[test]
    fn mode_from_command_byte() {
        for mode in Mode::ALL {
            assert_eq!(Mode::try_from(mode.opcode()), Ok(mode));
        }
        for value in [0x00, 0x01, 0x07, 0x12, 0x22, 0x30, 0x33, 0xff] {
            assert_eq!(Mode::try_from(value), Err(InvalidArgument::Mode(value)));
        }
    }

    #[test]
    fn timing_at_default_measurement_time() {
        assert_eq!(
            Mode::ContinuousHigh.wait_duration(DEFAULT_MEASUREMENT_TIME),
            Duration::from_millis(180)
        );
        assert_eq!(
            Mode::OneShotLow.wait_duration(DEFAULT_MEASUREMENT_TIME),
            Duration::from_millis(24)
        );
        assert!((Mode::ContinuousHigh.scale_factor(69) - 1.0 / 1.2).abs() < 1e-6);
        assert!((Mode::OneShotLow.scale_factor(69) - 1.0 / 1.2).abs() < 1e-6);
        assert!((Mode::OneShotHigh2.scale_factor(69) - 1.0 / 2.4).abs() < 1e-6);
    }

    #[test]
    fn timing_scales_with_measurement_time() {
        assert_eq!(
            Mode::ContinuousHigh.wait_duration(MAX_MEASUREMENT_TIME),
            Duration::from_nanos(662_608_695)
        );
        assert_eq!(
            Mode::ContinuousLow.wait_duration(MIN_MEASUREMENT_TIME),
            Duration::from_nanos(10_782_608)
        );
        let factor = Mode::ContinuousHigh2.scale_factor(31);
        assert!((factor - (1.0 / 1.2) * (69.0 / 31.0) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn required_functionality() {
        let full = Functionality::from_bits(0x0eff_0001);
        assert!(full.contains(Functionality::REQUIRED));
        assert!(Functionality::REQUIRED.difference(full).is_empty());

        let plain = Functionality::I2C;
        assert_eq!(
            Functionality::REQUIRED.difference(plain),
            Functionality::SMBUS_WRITE_BYTE
        );
        assert_eq!(
            Functionality::I2C | Functionality::SMBUS_WRITE_BYTE,
            Functionality::REQUIRED
        );
    }

    #[test]
    fn error_messages() {
        let err: Error<std::io::Error> = InvalidArgument::MeasurementTime(255).into();
        assert_eq!(err.to_string(), "measurement time 255 outside 31..=254");
        assert_eq!(
            InvalidArgument::Mode(0x12).to_string(),
            "unknown acquisition mode 0x12"
        );
    }

    #[test]
    fn bus_error_is_shown_and_chained() {
        use std::error::Error as _;
        use std::io;

        let err = Error::Io(io::Error::new(io::ErrorKind::TimedOut, "no ack from 0x23"));
        assert_eq!(err.to_string(), "bus I/O failed: no ack from 0x23");
        let source = err.source().expect("bus error kept as source");
        assert_eq!(source.to_string(), "no ack from 0x23");

        let err: Error<io::Error> = InvalidArgument::MeasurementTime(30).into();
        assert!(err.source().is_none());
    }
}
