//! System configuration parameters
//!
//! All tunable parameters for the FlexRig motion controller.  One struct,
//! one `Default` carrying the values the rig was commissioned with.

use serde::{Deserialize, Serialize};

/// Core rig configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    // --- Speeds (RPM) ---
    /// Absolute motor speed ceiling; commanded speeds clamp to this.
    pub rpm_max: f32,
    /// Speed used while hunting for a Hall sensor.
    pub seek_rpm: f32,
    /// Speed used during calibration cycles.
    pub calibration_rpm: f32,
    /// Speed used while measuring the sensor separation.
    pub measure_rpm: f32,
    /// Default cycling speed when the host supplies none.
    pub cycle_rpm: f32,

    // --- Geometry / odometry ---
    /// Nominal angular separation between the two Hall sensors (degrees).
    /// Overwritten per session once calibration measures the real value.
    pub nominal_separation_deg: f32,
    /// Number of measured calibration cycles (one extra warm-up cycle is
    /// driven first and discarded).
    pub calibration_cycles: u8,

    // --- Motion shaping ---
    /// Angular margin before a target at which pre-braking engages (degrees).
    pub prebrake_margin_deg: f32,
    /// Extra pre-brake margin applied on BACKWARD legs to avoid grazing
    /// the home sensor (degrees).
    pub prebrake_backward_extra_deg: f32,
    /// Overtravel factor on a BACKWARD leg before the missing home sensor
    /// is declared faulted and the odometric rescue engages.
    pub safety_factor_down: f32,
    /// Timeout factor applied to the estimated inter-sensor pulse span
    /// when seeking a sensor.
    pub seek_timeout_factor: f32,
    /// Floor for the seek-timeout span estimate (pulses).
    pub seek_timeout_floor_pulses: i32,
    /// Arrival tolerance for point-to-point moves (degrees).
    pub move_tolerance_deg: f32,
    /// Full ladder repetitions before the variable-angle modes re-home.
    pub ladder_repetitions: u8,

    // --- Sensor debounce ---
    /// Consecutive active samples required to accept a Hall sensor as on.
    pub debounce_samples: u8,
    /// Interval between debounce samples (milliseconds).
    pub debounce_interval_ms: u32,
    /// Stable-inactive window required to accept a sensor release (ms).
    pub release_debounce_ms: u32,

    // --- Timing ---
    /// Motion-engine tick period while a mode is RUNNING (milliseconds).
    pub tick_interval_ms: u32,
    /// Settle pause between calibration cycles (milliseconds).
    pub calibration_settle_ms: u32,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            // Speeds
            rpm_max: 30.0,
            seek_rpm: 6.0,
            calibration_rpm: 6.0,
            measure_rpm: 6.0,
            cycle_rpm: 7.0,

            // Geometry
            nominal_separation_deg: 88.5,
            calibration_cycles: 8,

            // Motion shaping
            prebrake_margin_deg: 1.0,
            prebrake_backward_extra_deg: 0.3,
            safety_factor_down: 1.5,
            seek_timeout_factor: 1.5,
            seek_timeout_floor_pulses: 50,
            move_tolerance_deg: 0.2,
            ladder_repetitions: 5,

            // Debounce
            debounce_samples: 5,
            debounce_interval_ms: 3,
            release_debounce_ms: 20,

            // Timing
            tick_interval_ms: 150,
            calibration_settle_ms: 500,
        }
    }
}
