//! Quadrature encoder ISR glue.
//!
//! The rig's encoder fires an interrupt on every edge of phase A.  The
//! handler samples both phase lines and feeds them into the one global
//! [`MotionState`] instance.  `static` because ISR callbacks registered
//! through ESP-IDF cannot capture closures.
//!
//! Malformed hardware signals are harmless: an invocation that sees
//! phase A unchanged is a no-op inside [`MotionState::on_edge`].

use super::state::MotionState;

/// The rig-wide motion record shared between the ISR and the main loop.
pub static MOTION: MotionState = MotionState::new();

/// Edge handler — register on the phase-A GPIO for both edges.
/// Safe to call from interrupt context (atomics only, no allocation).
#[cfg(target_os = "espidf")]
pub fn encoder_isr_handler() {
    let a = crate::drivers::hw_init::gpio_read(crate::pins::ENCODER_A_GPIO);
    let b = crate::drivers::hw_init::gpio_read(crate::pins::ENCODER_B_GPIO);
    MOTION.on_edge(a, b);
}
