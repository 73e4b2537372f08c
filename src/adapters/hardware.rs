//! Hardware adapter — bridges real peripherals to the port traits.
//!
//! Owns the motor driver and the Hall/clock access, exposing them
//! through [`MotorPort`], [`HallPort`] and [`ClockPort`].  This is the
//! only module besides the drivers that touches actual hardware; on
//! host targets the underlying helpers are simulation stubs.

use crate::drivers::motor::MotorDriver;
use crate::motion::Direction;
use crate::pins;
use crate::ports::{ClockPort, HallId, HallPort, MotorPort};

/// Concrete adapter that combines all rig hardware behind port traits.
pub struct HardwareAdapter {
    motor: MotorDriver,
    #[cfg(not(target_os = "espidf"))]
    started: std::time::Instant,
}

impl HardwareAdapter {
    pub fn new(motor: MotorDriver) -> Self {
        Self {
            motor,
            #[cfg(not(target_os = "espidf"))]
            started: std::time::Instant::now(),
        }
    }
}

// ── MotorPort implementation ──────────────────────────────────

impl MotorPort for HardwareAdapter {
    fn drive(&mut self, dir: Direction, rpm: f32) {
        self.motor.drive(dir, rpm);
    }

    fn stop(&mut self) {
        self.motor.stop();
    }
}

// ── HallPort implementation ───────────────────────────────────

impl HallPort for HardwareAdapter {
    fn hall_level(&mut self, id: HallId) -> bool {
        let pin = match id {
            HallId::Zero => pins::HALL_ZERO_GPIO,
            HallId::Far => pins::HALL_FAR_GPIO,
        };
        crate::drivers::hw_init::gpio_read(pin)
    }
}

// ── ClockPort implementation ──────────────────────────────────

impl ClockPort for HardwareAdapter {
    #[cfg(target_os = "espidf")]
    fn now_ms(&mut self) -> u64 {
        // SAFETY: esp_timer_get_time is a monotonic counter read.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1_000) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&mut self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
