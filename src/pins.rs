//! GPIO / peripheral pin assignments for the FlexRig controller board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// DC motor driver (L298N H-bridge)
// ---------------------------------------------------------------------------

/// Digital output: H-bridge input 1 (HIGH + IN2 LOW = forward).
pub const MOTOR_IN1_GPIO: i32 = 16;
/// Digital output: H-bridge input 2 (HIGH + IN1 LOW = backward).
pub const MOTOR_IN2_GPIO: i32 = 17;
/// LEDC PWM channel on the H-bridge enable pin — motor speed.
pub const MOTOR_ENABLE_GPIO: i32 = 18;

// ---------------------------------------------------------------------------
// Quadrature encoder (two-phase, interrupt on phase A)
// ---------------------------------------------------------------------------

/// Encoder phase A — edge interrupt source.  Internal pull-up.
pub const ENCODER_A_GPIO: i32 = 14;
/// Encoder phase B — sampled inside the phase-A ISR.  Internal pull-up.
pub const ENCODER_B_GPIO: i32 = 15;

// ---------------------------------------------------------------------------
// Hall-effect reference sensors (active-low, internal pull-up)
// ---------------------------------------------------------------------------

/// Home sensor at the 0° mechanical reference.
pub const HALL_ZERO_GPIO: i32 = 2;
/// End-of-travel sensor near the 90° reference (nominal separation 88.5°).
pub const HALL_FAR_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// UART link to the host controller
// ---------------------------------------------------------------------------

pub const UART_TX_GPIO: i32 = 43;
pub const UART_RX_GPIO: i32 = 44;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC base frequency for the motor enable pin.
pub const MOTOR_PWM_FREQ_HZ: u32 = 1_000;
