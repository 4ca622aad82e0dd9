//! RP2350 glue: uptime clock, watchdog, sensor bus delay, SD transport types

use embassy_rp::gpio::Output;
use embassy_rp::peripherals::SPI1;
use embassy_rp::spi::{Blocking, Spi};
use embassy_time::Instant;
use embedded_hal::delay::DelayNs;

use crate::sdcard::SdCard;
use crate::session::{Clock, Watchdog};
use crate::time::{TimeSource, Timestamp};
use crate::transport::SpiTransport;

pub type SdSpi = Spi<'static, SPI1, Blocking>;
pub type SdCs = Output<'static>;
pub type SdTransport = SpiTransport<SdSpi, SdCs>;
pub type BoardCard = SdCard<SdTransport>;

/// `dt` tick length written into CSV headers (embassy-time runs at 1 MHz)
pub const DT_UNITS: &str = "1 us";

/// Time source based on uptime since boot (no RTC on board).
/// Files still get distinguishable timestamps for ordering.
pub struct UptimeTimeSource;

impl TimeSource for UptimeTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp::from_uptime_secs(Instant::now().as_secs())
    }
}

/// Tick counter for CSV `dt` columns.
pub struct UptimeClock;

impl Clock for UptimeClock {
    fn now_ticks(&mut self) -> u32 {
        Instant::now().as_ticks() as u32
    }
}

pub struct BoardWatchdog(pub embassy_rp::watchdog::Watchdog);

impl Watchdog for BoardWatchdog {
    fn feed(&mut self) {
        self.0.feed();
    }
}

/// Core clock the sensor bus delays are counted against
pub const CORE_CLOCK_MHZ: u32 = 150;

/// Chip-select setup/hold delay for the shared sensor bus. Spins the core;
/// the intervals involved are a few hundred nanoseconds.
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns.saturating_mul(CORE_CLOCK_MHZ) / 1000).max(1);
        cortex_m::asm::delay(cycles);
    }
}
