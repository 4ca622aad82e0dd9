//! SPI motion sensors: LIS3LV02DL accelerometer, L3G4200D gyroscope

use embedded_hal::spi::{Operation, SpiDevice};

use crate::capture::SensorKind;
use crate::config::{AccelConfig, GyroConfig};
use crate::csv::CsvHeader;
use crate::error::{Error, Result};

const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const CTRL_REG2: u8 = 0x21;
const CTRL_REG3: u8 = 0x22;
const CTRL_REG4: u8 = 0x23;
const CTRL_REG5: u8 = 0x24;
const OUT_X_L: u8 = 0x28;
const FIFO_CTRL_REG: u8 = 0x2E;

const READ: u8 = 0x80;
/// Address auto-increment for burst reads
const MULTI: u8 = 0x40;

/// One axis sensor as the session controller sees it.
pub trait Sensor {
    fn kind(&self) -> SensorKind;
    /// Check identity; a mismatch means the part is absent.
    fn identify(&mut self) -> Result<()>;
    /// Apply range and rate, enable all axes.
    fn configure(&mut self) -> Result<()>;
    fn read_axes(&mut self) -> Result<[i16; 3]>;
    fn power_down(&mut self) -> Result<()>;
    fn header(&self) -> CsvHeader;
}

/// Register access shared by both parts (same SPI framing).
struct Regs<SPI>(SPI);

impl<SPI: SpiDevice> Regs<SPI> {
    fn write(&mut self, reg: u8, value: u8) -> Result<()> {
        self.0.write(&[reg, value]).map_err(|_| Error::Transport)
    }

    fn read(&mut self, reg: u8) -> Result<u8> {
        let mut v = [0u8];
        self.0
            .transaction(&mut [Operation::Write(&[reg | READ]), Operation::Read(&mut v)])
            .map_err(|_| Error::Transport)?;
        Ok(v[0])
    }

    fn read_axes(&mut self) -> Result<[i16; 3]> {
        let mut raw = [0u8; 6];
        self.0
            .transaction(&mut [
                Operation::Write(&[OUT_X_L | READ | MULTI]),
                Operation::Read(&mut raw),
            ])
            .map_err(|_| Error::Transport)?;
        Ok([
            i16::from_le_bytes([raw[0], raw[1]]),
            i16::from_le_bytes([raw[2], raw[3]]),
            i16::from_le_bytes([raw[4], raw[5]]),
        ])
    }

    fn identify(&mut self, expected: u8) -> Result<()> {
        let id = self.read(WHO_AM_I)?;
        if id != expected {
            warn!("WHO_AM_I {} (expected {})", id, expected);
            return Err(Error::DeviceNotReady);
        }
        Ok(())
    }
}

pub struct Lis3lv02dl<SPI> {
    regs: Regs<SPI>,
    config: AccelConfig,
    dt_units: &'static str,
}

impl<SPI: SpiDevice> Lis3lv02dl<SPI> {
    pub const ID: u8 = 0x3A;

    pub fn new(spi: SPI, config: AccelConfig, dt_units: &'static str) -> Self {
        Self {
            regs: Regs(spi),
            config,
            dt_units,
        }
    }

    pub fn release(self) -> SPI {
        self.regs.0
    }
}

impl<SPI: SpiDevice> Sensor for Lis3lv02dl<SPI> {
    fn kind(&self) -> SensorKind {
        SensorKind::Accel
    }

    fn identify(&mut self) -> Result<()> {
        self.regs.identify(Self::ID)
    }

    fn configure(&mut self) -> Result<()> {
        // power on, decimation, XYZ enabled
        self.regs
            .write(CTRL_REG1, (self.config.rate.bits() << 4) | 0xC7)?;
        // full scale, block data update, data-ready on RDY pin
        self.regs
            .write(CTRL_REG2, (self.config.range.bits() << 7) | 0x05)?;
        debug!("accelerometer configured: {:?}", self.config);
        Ok(())
    }

    fn read_axes(&mut self) -> Result<[i16; 3]> {
        self.regs.read_axes()
    }

    fn power_down(&mut self) -> Result<()> {
        self.regs.write(CTRL_REG1, 0)
    }

    fn header(&self) -> CsvHeader {
        CsvHeader {
            range: self.config.range.value(),
            unit: "g",
            dt_units: self.dt_units,
        }
    }
}

pub struct L3g4200d<SPI> {
    regs: Regs<SPI>,
    config: GyroConfig,
    dt_units: &'static str,
}

impl<SPI: SpiDevice> L3g4200d<SPI> {
    pub const ID: u8 = 0xD3;

    pub fn new(spi: SPI, config: GyroConfig, dt_units: &'static str) -> Self {
        Self {
            regs: Regs(spi),
            config,
            dt_units,
        }
    }

    pub fn release(self) -> SPI {
        self.regs.0
    }
}

impl<SPI: SpiDevice> Sensor for L3g4200d<SPI> {
    fn kind(&self) -> SensorKind {
        SensorKind::Gyro
    }

    fn identify(&mut self) -> Result<()> {
        self.regs.identify(Self::ID)
    }

    fn configure(&mut self) -> Result<()> {
        // data rate, max bandwidth, normal mode, XYZ enabled
        self.regs
            .write(CTRL_REG1, (self.config.rate.bits() << 6) | 0x3F)?;
        // data-ready on INT2
        self.regs.write(CTRL_REG3, 0x08)?;
        self.regs.write(CTRL_REG4, self.config.range.bits() << 4)?;
        self.regs.write(CTRL_REG5, 0x00)?;
        self.regs.write(FIFO_CTRL_REG, 0x00)?;
        debug!("gyroscope configured: {:?}", self.config);
        Ok(())
    }

    fn read_axes(&mut self) -> Result<[i16; 3]> {
        self.regs.read_axes()
    }

    fn power_down(&mut self) -> Result<()> {
        self.regs.write(CTRL_REG1, 0)
    }

    fn header(&self) -> CsvHeader {
        CsvHeader {
            range: self.config.range.value(),
            unit: "dps",
            dt_units: self.dt_units,
        }
    }
}
