//! Microphone pre-record logger for RP2350A
//!
//! Keeps the last few seconds of audio in a ring of clusters on the SD card.
//! Tap the button to save the ring as `DATAnnn.WAV`, hold it to stop.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_futures::select::{select, Either};
use embassy_rp::adc::{self, Adc};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::spi;
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Ticker, Timer};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use static_cell::StaticCell;

use fat16_logger::board::{BoardCard, BoardWatchdog, UptimeTimeSource};
use fat16_logger::capture::{DoubleBuffer, Event, EventFlags, Producer, Push};
use fat16_logger::config::*;
use fat16_logger::prerecord::run_prerecord;
use fat16_logger::session::Watchdog as _;
use fat16_logger::wave::WaveFormat;
use fat16_logger::{ErrorKind, SdCard, SpiTransport, Volume};

use {defmt_rtt as _, panic_probe as _};

// ============================================================================
// Shared state
// ============================================================================

/// Flags: interrupt-priority tasks → main loop
static EVENTS: EventFlags = EventFlags::new();

static CAPTURE_BUF: StaticCell<DoubleBuffer<CAPTURE_BUF_SIZE>> = StaticCell::new();

/// Sampling runs only while a session is active
static CAPTURING: AtomicBool = AtomicBool::new(false);

/// Overrun counter as seen from the sampling side
static OVERRUNS: AtomicU32 = AtomicU32::new(0);

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

// ============================================================================
// Entry point
// ============================================================================

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("Audio logger starting...");

    // ── Watchdog ──────────────────────────────────────────────────────
    let mut watchdog = Watchdog::new(p.WATCHDOG);
    watchdog.start(Duration::from_millis(WATCHDOG_TIMEOUT_MS));
    let mut watchdog = BoardWatchdog(watchdog);

    // ── Capture (high priority) ──────────────────────────────────────────
    let capture = CAPTURE_BUF.init(DoubleBuffer::new());
    let (producer, mut consumer) = capture.split();
    let adc = Adc::new_blocking(p.ADC, adc::Config::default());
    let mic = adc::Channel::new_pin(p.PIN_26, Pull::None);
    let button = Input::new(p.PIN_15, Pull::Up);

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high.must_spawn(mic_task(producer, adc, mic));
    high.must_spawn(button_task(button));

    // ── SPI ────────────────────────────────────────────────────────────
    let mut spi_config = spi::Config::default();
    spi_config.frequency = SD_SPI_INIT_FREQ;
    let spi1 = spi::Spi::new_blocking(p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, spi_config);
    let cs = Output::new(p.PIN_13, Level::High);
    let mut card = SdCard::new(SpiTransport::new(spi1, cs));

    // ── Session loop ───────────────────────────────────────────────────
    loop {
        init_card(&mut card, &mut watchdog).await;

        let mut volume = match Volume::mount(&mut card, UptimeTimeSource) {
            Ok(v) => v,
            Err(e) => {
                error!("Volume mount failed: {:?}", e);
                reboot().await
            }
        };

        // a buffer filled before the last session ended is not this session's audio
        if consumer.poll().is_some() {
            debug!("Stale capture buffer dropped");
        }
        CAPTURING.store(true, Ordering::Relaxed);
        let res = run_prerecord(
            &mut volume,
            &mut consumer,
            &EVENTS,
            &mut watchdog,
            WaveFormat::default(),
            PRERECORD_CLUSTERS,
        );
        CAPTURING.store(false, Ordering::Relaxed);
        drop(volume);

        match res {
            Ok(summary) => info!(
                "Session done: {} file(s), {:?}",
                summary.files_saved, summary.outcome
            ),
            Err(e) => match e.kind() {
                ErrorKind::BufferOverflow => panic!("firmware defect: {:?}", e),
                _ => {
                    error!("Session aborted: {:?}", e);
                    reboot().await
                }
            },
        }

        if let Err(e) = card.go_idle() {
            warn!("SD go_idle failed: {:?}", e);
        }

        // Park until the next tap
        info!("Idle, tap to start");
        loop {
            watchdog.feed();
            if EVENTS.take(Event::Save) {
                break;
            }
            Timer::after(Duration::from_millis(50)).await;
        }
        // presses made while parked do not carry into the session
        EVENTS.clear();
    }
}

/// Bring the card up, or let the watchdog reboot us.
async fn init_card(card: &mut BoardCard, watchdog: &mut BoardWatchdog) {
    for attempt in 1..=SD_INIT_RETRIES {
        watchdog.feed();
        info!("SD init attempt {}/{}...", attempt, SD_INIT_RETRIES);
        match card.init() {
            Ok(kind) => {
                card.transport_mut().bus_mut().set_frequency(SD_SPI_WORK_FREQ);
                info!("SD card {:?}, SPI switched to {} Hz", kind, SD_SPI_WORK_FREQ);
                return;
            }
            Err(e) => {
                warn!("SD init failed: {:?}", e);
                card.transport_mut().bus_mut().set_frequency(SD_SPI_INIT_FREQ);
                Timer::after(Duration::from_millis(500)).await;
            }
        }
    }
    error!("SD card init failed after {} attempts", SD_INIT_RETRIES);
    reboot().await
}

/// Stop feeding the watchdog; it resets the board.
async fn reboot() -> ! {
    error!("Fatal error, watchdog reboot in {} ms...", WATCHDOG_TIMEOUT_MS);
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

// ============================================================================
// Microphone task: one ADC sample per tick into the double buffer
// ============================================================================

#[embassy_executor::task]
async fn mic_task(
    mut producer: Producer<'static, CAPTURE_BUF_SIZE>,
    mut adc: Adc<'static, adc::Blocking>,
    mut mic: adc::Channel<'static>,
) {
    info!("mic_task started");
    let mut ticker = Ticker::every(Duration::from_hz(AUDIO_SAMPLE_RATE as u64));
    let mut capturing = false;
    loop {
        ticker.next().await;
        let now = CAPTURING.load(Ordering::Relaxed);
        if now && !capturing {
            // start the session on an empty buffer
            producer.restart();
        }
        capturing = now;
        if !capturing {
            continue;
        }
        // 12-bit ADC to unsigned 8-bit PCM
        let sample = match adc.blocking_read(&mut mic) {
            Ok(v) => (v >> 4) as u8,
            Err(_) => 0x80,
        };
        if producer.push(sample) == Push::Overrun {
            let n = OVERRUNS.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 100 == 1 {
                warn!("Capture overrun ({} total)", n);
            }
        }
    }
}

// ============================================================================
// Button task: tap = save, hold = stop
// ============================================================================

#[embassy_executor::task]
async fn button_task(mut button: Input<'static>) {
    loop {
        button.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(20)).await;
        if button.is_high() {
            continue;
        }
        let hold = Timer::after(Duration::from_millis(800));
        let event = match select(button.wait_for_high(), hold).await {
            Either::First(()) => Event::Save,
            Either::Second(()) => Event::Stop,
        };
        if !EVENTS.raise(event) {
            debug!("{:?} already pending", event);
        }
        button.wait_for_high().await;
    }
}
