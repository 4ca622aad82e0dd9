//! Byte-level full-duplex exchange with chip-select control

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::{Error, Result};

/// One byte out, one byte in, on a bus whose device is selected manually.
///
/// No timeouts at this layer: a wedged peripheral hangs the caller.
pub trait Transport {
    fn exchange(&mut self, byte: u8) -> Result<u8>;
    /// Assert chip-select (drive low).
    fn select(&mut self) -> Result<()>;
    /// Release chip-select (drive high).
    fn deselect(&mut self) -> Result<()>;

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.exchange(b)?;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<u8> {
        self.exchange(0xFF)
    }

    /// Clock out `n` idle bytes (0xFF).
    fn clock_idle(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.exchange(0xFF)?;
        }
        Ok(())
    }
}

/// [`Transport`] over an `embedded-hal` SPI bus and a GPIO chip-select.
pub struct SpiTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI: SpiBus, CS: OutputPin> SpiTransport<SPI, CS> {
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Access the bus, e.g. to raise the clock after init.
    pub fn bus_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI: SpiBus, CS: OutputPin> Transport for SpiTransport<SPI, CS> {
    fn exchange(&mut self, byte: u8) -> Result<u8> {
        let mut buf = [byte];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| Error::Transport)?;
        Ok(buf[0])
    }

    fn select(&mut self) -> Result<()> {
        self.spi.flush().map_err(|_| Error::Transport)?;
        self.cs.set_low().map_err(|_| Error::Transport)
    }

    fn deselect(&mut self) -> Result<()> {
        self.spi.flush().map_err(|_| Error::Transport)?;
        self.cs.set_high().map_err(|_| Error::Transport)
    }
}
