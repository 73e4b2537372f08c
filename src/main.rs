//! FlexRig Firmware — Main Entry Point
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │   HardwareAdapter            SerialLink                      │
//! │   (Motor+Hall+Clock)         (newline host link)             │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────        │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │            Session (protocol state machine)        │      │
//! │  │   ProfileEngine · Calibration · Homing             │      │
//! │  └────────────────────────────────────────────────────┘      │
//! │                                                              │
//! │  MotionState (ISR-shared odometry) ◀── encoder edge ISR      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-threaded cooperative loop: one non-blocking serial poll, then
//! the mode tick if its deadline has passed.  The only preemption is the
//! quadrature ISR, which touches nothing but the `MotionState` atomics.
#![deny(unused_must_use)]

use anyhow::Result;
use log::info;

use flexrig::adapters::hardware::HardwareAdapter;
use flexrig::adapters::serial::SerialLink;
use flexrig::config::RigConfig;
use flexrig::drivers::motor::MotorDriver;
use flexrig::drivers::hw_init;
use flexrig::motion::encoder::MOTION;
use flexrig::session::Session;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger_init();

    info!("FlexRig v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Hardware peripherals ───────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = hw_init::init_isr_service() {
        log::error!("ISR service init failed: {} — continuing without encoder", e);
    }

    // ── 3. Adapters ───────────────────────────────────────────
    let config = RigConfig::default();
    let mut hw = HardwareAdapter::new(MotorDriver::new(config.rpm_max));
    let mut link = SerialLink::new();

    // ── 4. Session ────────────────────────────────────────────
    let mut session = Session::new(config);

    info!("System ready. Awaiting host handshake.");

    // ── 5. Cooperative loop ───────────────────────────────────
    loop {
        session.poll(&mut hw, &mut link, &MOTION);

        // Keep the poll cadence well under the tick period so command
        // latency stays negligible next to the 150 ms engine tick.
        #[cfg(target_os = "espidf")]
        esp_idf_hal::delay::FreeRtos::delay_ms(2);
        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
}

/// Minimal stderr logger for bench runs on the host target.
#[cfg(not(target_os = "espidf"))]
fn env_logger_init() {
    struct StderrLogger;
    impl log::Log for StderrLogger {
        fn enabled(&self, _m: &log::Metadata) -> bool {
            true
        }
        fn log(&self, record: &log::Record) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
        fn flush(&self) {}
    }
    static LOGGER: StderrLogger = StderrLogger;
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);
}
