use super::{Functionality, Interface, DEVICE_ADDRESS};

use core::fmt::Debug;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use embedded_hal::blocking::i2c::{Read as I2cRead, Write as I2cWrite};
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use log::{trace, warn};
use nix::libc::c_ulong;

// <linux/i2c-dev.h>; not exposed by i2cdev.
const I2C_FUNCS: c_ulong = 0x0705;

nix::ioctl_read_bad!(i2c_funcs, I2C_FUNCS, c_ulong);

/// Linux `i2c-dev` character device.
pub struct I2cInterface {
    device: LinuxI2CDevice,
    path: String,
}

impl I2cInterface {
    /// Opens `path` with `address` as the slave address.
    pub fn open(path: impl AsRef<Path>, address: u8) -> io::Result<Self> {
        let path = path.as_ref();
        let device = LinuxI2CDevice::new(path, u16::from(address)).map_err(io::Error::from)?;
        Ok(Self {
            device,
            path: path.display().to_string(),
        })
    }
}

impl Interface for I2cInterface {
    type Error = io::Error;

    fn bind(&mut self, address: u8) -> io::Result<()> {
        self.device
            .set_slave_address(u16::from(address))
            .map_err(io::Error::from)
    }

    fn functionality(&mut self) -> Functionality {
        let mut funcs: c_ulong = 0;
        match unsafe { i2c_funcs(self.device.as_raw_fd(), &mut funcs) } {
            Ok(_) => Functionality::from_bits(u64::from(funcs)),
            Err(errno) => {
                warn!("{}: I2C_FUNCS failed: {}", self.path, errno);
                Functionality::empty()
            }
        }
    }

    fn write_byte(&mut self, value: u8) -> io::Result<()> {
        trace!("{}: write {:#04x}", self.path, value);
        self.device.smbus_write_byte(value).map_err(io::Error::from)
    }

    fn read_word(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.device.read(&mut buf).map_err(io::Error::from)?;
        Ok(u16::from_le_bytes(buf))
    }

    // The descriptor is closed when the device drops.
    fn close(self) -> io::Result<()> {
        trace!("{}: close", self.path);
        Ok(())
    }
}

/// Any `embedded-hal` blocking I2C bus.
pub struct HalInterface<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> HalInterface<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: DEVICE_ADDRESS,
        }
    }

    /// Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> Interface for HalInterface<I2C>
where
    I2C: I2cWrite<Error = E> + I2cRead<Error = E>,
    E: Debug,
{
    type Error = E;

    fn bind(&mut self, address: u8) -> Result<(), E> {
        self.address = address;
        Ok(())
    }

    // A plain I2C master can issue any single-byte write.
    fn functionality(&mut self) -> Functionality {
        Functionality::REQUIRED
    }

    fn write_byte(&mut self, value: u8) -> Result<(), E> {
        self.i2c.write(self.address, &[value])
    }

    fn read_word(&mut self) -> Result<u16, E> {
        let mut buf = [0u8; 2];
        self.i2c.read(self.address, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn close(self) -> Result<(), E> {
        Ok(())
    }
}
