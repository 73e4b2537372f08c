//! Fuzz target: mode-activation payload parsing.
//!
//! Drives arbitrary byte sequences through the normalising JSON parse
//! and the permissive fallback, asserting that a successful parse always
//! yields range-clamped parameters — the rig must never be commanded
//! outside its physical envelope by a malformed host line.
//!
//! cargo fuzz run fuzz_payload_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

use flexrig::config::RigConfig;
use flexrig::motion::profile::ModeConfig;
use flexrig::session::payload::parse_activation;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };
    let cfg = RigConfig::default();

    if let Ok(act) = parse_activation(line, cfg.nominal_separation_deg, &cfg) {
        let in_angle = |a: f32| (0.0..=cfg.nominal_separation_deg).contains(&a);
        let in_vel = |v: f32| (0.0..=cfg.rpm_max).contains(&v);
        match act.config {
            ModeConfig::Fixed { angle, speed } => {
                assert!(in_angle(angle) && in_vel(speed));
            }
            ModeConfig::AngleLadder {
                init_angle,
                final_angle,
                step_angle,
                speed,
            } => {
                assert!(in_angle(init_angle) && in_angle(final_angle));
                assert!(step_angle > 0.0 && in_vel(speed));
            }
            ModeConfig::SpeedRamp {
                angle,
                init_vel,
                final_vel,
                step_vel,
            } => {
                assert!(in_angle(angle) && in_vel(init_vel) && in_vel(final_vel));
                assert!(step_vel > 0.0);
            }
            ModeConfig::Both {
                init_angle,
                final_angle,
                step_angle,
                init_vel,
                final_vel,
                step_vel,
            } => {
                assert!(in_angle(init_angle) && in_angle(final_angle));
                assert!(in_vel(init_vel) && in_vel(final_vel));
                assert!(step_angle > 0.0 && step_vel > 0.0);
            }
        }
    }
});
