//! Accelerometer + gyroscope CSV logger for RP2350A
//!
//! Logs `ACCLnnn.CSV` and `GYROnnn.CSV` (same number) until the button is held.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::spi;
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Timer};
use embedded_hal_bus::spi::RefCellDevice;
use static_cell::StaticCell;

use fat16_logger::board::{BoardWatchdog, SpinDelay, UptimeClock, UptimeTimeSource, DT_UNITS};
use fat16_logger::capture::{Event, EventFlags, SensorKind};
use fat16_logger::config::*;
use fat16_logger::fat::{file_name, FileKind};
use fat16_logger::sensor::{L3g4200d, Lis3lv02dl, Sensor};
use fat16_logger::session::{log_sensors, Watchdog as _};
use fat16_logger::{ErrorKind, SdCard, SpiTransport, Volume};

use {defmt_rtt as _, panic_probe as _};

type SensorBus = spi::Spi<'static, embassy_rp::peripherals::SPI0, spi::Blocking>;

/// Flags: data-ready and button edges → main loop
static EVENTS: EventFlags = EventFlags::new();

const CONFIG_INI: &[u8; 11] = b"CONFIG  INI";

static SENSOR_BUS: StaticCell<RefCell<SensorBus>> = StaticCell::new();

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("IMU logger starting...");

    let mut watchdog = Watchdog::new(p.WATCHDOG);
    watchdog.start(Duration::from_millis(WATCHDOG_TIMEOUT_MS));
    let mut watchdog = BoardWatchdog(watchdog);

    // ── Edges (high priority) ───────────────────────────────────────────
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high.must_spawn(data_ready_task(Input::new(p.PIN_20, Pull::Down), SensorKind::Accel));
    high.must_spawn(data_ready_task(Input::new(p.PIN_21, Pull::Down), SensorKind::Gyro));
    high.must_spawn(stop_button_task(Input::new(p.PIN_15, Pull::Up)));

    // ── Sensors on SPI0 ─────────────────────────────────────────────────
    let mut sensor_config = spi::Config::default();
    sensor_config.frequency = SENSOR_SPI_FREQ;
    sensor_config.polarity = spi::Polarity::IdleHigh;
    sensor_config.phase = spi::Phase::CaptureOnSecondTransition;
    let bus: &'static RefCell<SensorBus> = SENSOR_BUS.init(RefCell::new(spi::Spi::new_blocking(
        p.SPI0,
        p.PIN_18,
        p.PIN_19,
        p.PIN_16,
        sensor_config,
    )));
    let (Ok(accel_dev), Ok(gyro_dev)) = (
        RefCellDevice::new(bus, Output::new(p.PIN_17, Level::High), SpinDelay),
        RefCellDevice::new(bus, Output::new(p.PIN_22, Level::High), SpinDelay),
    ) else {
        error!("Failed to create sensor SPI devices");
        reboot().await
    };
    let mut accel = Lis3lv02dl::new(accel_dev, DEFAULT_ACCEL, DT_UNITS);
    let mut gyro = L3g4200d::new(gyro_dev, DEFAULT_GYRO, DT_UNITS);

    // ── SD card on SPI1 ─────────────────────────────────────────────────
    let mut sd_config = spi::Config::default();
    sd_config.frequency = SD_SPI_INIT_FREQ;
    let spi1 = spi::Spi::new_blocking(p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, sd_config);
    let mut card = SdCard::new(SpiTransport::new(spi1, Output::new(p.PIN_13, Level::High)));

    let mut ready = false;
    for attempt in 1..=SD_INIT_RETRIES {
        watchdog.feed();
        info!("SD init attempt {}/{}...", attempt, SD_INIT_RETRIES);
        match card.init() {
            Ok(kind) => {
                info!("SD card {:?}", kind);
                ready = true;
                break;
            }
            Err(e) => {
                warn!("SD init failed: {:?}", e);
                Timer::after(Duration::from_millis(500)).await;
            }
        }
    }
    if !ready {
        error!("SD card init failed after {} attempts", SD_INIT_RETRIES);
        reboot().await
    }
    card.transport_mut().bus_mut().set_frequency(SD_SPI_WORK_FREQ);

    let mut volume = match Volume::mount(&mut card, UptimeTimeSource) {
        Ok(v) => v,
        Err(e) => {
            error!("Volume mount failed: {:?}", e);
            reboot().await
        }
    };
    match volume.find_entry(CONFIG_INI) {
        Ok(Some(_)) => info!("CONFIG.INI present; using built-in sensor settings"),
        Ok(None) => {}
        Err(e) => warn!("Directory scan failed: {:?}", e),
    }
    if let Ok(n) = volume.get_file_num() {
        let name = file_name(FileKind::Accel, n);
        info!("Next files: {}", core::str::from_utf8(&name).unwrap_or("?"));
    }

    // ── Session ─────────────────────────────────────────────────────────
    let accel_ok = accel.identify().is_ok();
    let gyro_ok = gyro.identify().is_ok();
    info!("Sensors: accel={}, gyro={}", accel_ok, gyro_ok);
    let mut clock = UptimeClock;
    let res = match (accel_ok, gyro_ok) {
        (true, true) => {
            let mut both: [&mut dyn Sensor; 2] = [&mut accel, &mut gyro];
            log_sensors(&mut volume, &mut both, &EVENTS, &mut clock, &mut watchdog)
        }
        (true, false) => {
            let mut one: [&mut dyn Sensor; 1] = [&mut accel];
            log_sensors(&mut volume, &mut one, &EVENTS, &mut clock, &mut watchdog)
        }
        (false, true) => {
            let mut one: [&mut dyn Sensor; 1] = [&mut gyro];
            log_sensors(&mut volume, &mut one, &EVENTS, &mut clock, &mut watchdog)
        }
        (false, false) => {
            error!("No sensor answered");
            reboot().await
        }
    };
    drop(volume);

    match res {
        Ok(summary) => info!(
            "Logged #{}: {} bytes, {:?}",
            summary.file_num, summary.bytes, summary.outcome
        ),
        Err(e) if e.kind() == ErrorKind::BufferOverflow => panic!("firmware defect: {:?}", e),
        Err(e) => {
            error!("Session aborted: {:?}", e);
            reboot().await
        }
    }

    if let Err(e) = card.go_idle() {
        warn!("SD go_idle failed: {:?}", e);
    }
    // Done until the next power cycle
    loop {
        watchdog.feed();
        Timer::after(Duration::from_secs(1)).await;
    }
}

/// Stop feeding the watchdog; it resets the board.
async fn reboot() -> ! {
    error!("Fatal error, watchdog reboot in {} ms...", WATCHDOG_TIMEOUT_MS);
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn data_ready_task(mut pin: Input<'static>, kind: SensorKind) {
    loop {
        pin.wait_for_rising_edge().await;
        // an edge the loop has not serviced yet collapses into this one
        EVENTS.raise(Event::DataReady(kind));
    }
}

#[embassy_executor::task]
async fn stop_button_task(mut button: Input<'static>) {
    loop {
        button.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(20)).await;
        if button.is_low() {
            EVENTS.raise(Event::Stop);
            info!("Stop requested");
        }
        button.wait_for_high().await;
    }
}
