//! Odometry calibration sequencer.
//!
//! Manufacturing tolerance makes the nominal degrees-per-pulse constant
//! unreliable, and backlash makes it direction-dependent.  The sequencer
//! derives both constants by cycling the lever between the two Hall
//! references and counting pulses, then measures the true angular
//! separation of the sensors.  Everything here is volatile: a session
//! that ends discards the result and the next one re-derives it.

use heapless::Vec;
use log::{info, warn};

use crate::config::RigConfig;
use crate::error::{CalibrationError, HomingError, SeekResult};
use crate::motion::homing::{self, seek, seek_timeout_pulses};
use crate::motion::state::{Direction, MotionState};
use crate::ports::{ClockPort, HallId, HallPort, MotorPort};

/// Per-session calibration output.  `None` at the session level means
/// "not calibrated yet"; angle clamps then fall back to the nominal
/// separation from [`RigConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub gpp_forward: f32,
    pub gpp_backward: f32,
    /// Measured angular separation between the two sensors (degrees).
    pub separation_deg: f32,
}

/// Upper bound on stored cycle samples per direction.
const MAX_SAMPLES: usize = 16;

/// Full calibration sequence: cycle, average, measure, home.
///
/// Runs `calibration_cycles + 1` alternating seeks between the sensors.
/// The first cycle starts from an unknown offset and is discarded; the
/// rest are bucketed by direction and averaged.  The separation
/// measurement afterwards is best-effort — on failure the nominal value
/// is kept and the constants already derived stand.  The sequence always
/// finishes parked at home with the motion state zeroed.
pub fn run<R: MotorPort + HallPort + ClockPort>(
    rig: &mut R,
    motion: &MotionState,
    cfg: &RigConfig,
) -> Result<CalibrationResult, CalibrationError> {
    info!(
        "calibration: {} cycles between the Hall references",
        cfg.calibration_cycles
    );

    let mut forward: Vec<i32, MAX_SAMPLES> = Vec::new();
    let mut backward: Vec<i32, MAX_SAMPLES> = Vec::new();

    let mut dir = Direction::Forward;
    let mut target = HallId::Far;
    let timeout = seek_timeout_pulses(motion, cfg.nominal_separation_deg, cfg);

    for cycle in 0..=cfg.calibration_cycles {
        motion.reset_pulses();
        match seek(rig, motion, target, dir, cfg.calibration_rpm, timeout) {
            SeekResult::Found => {}
            SeekResult::TimedOut => {
                warn!("calibration cycle {} timed out", cycle + 1);
                return Err(CalibrationError::CycleTimedOut { cycle });
            }
        }

        let pulses = motion.abs_pulses();
        if cycle == 0 {
            info!("cycle 1 discarded ({} pulses from unknown offset)", pulses);
        } else {
            let bucket = match dir {
                Direction::Forward => &mut forward,
                Direction::Backward => &mut backward,
            };
            let _ = bucket.push(pulses);
            info!("cycle {}: {} pulses {:?}", cycle + 1, pulses, dir);
        }

        dir = dir.flipped();
        target = match target {
            HallId::Far => HallId::Zero,
            HallId::Zero => HallId::Far,
        };
        rig.delay_ms(cfg.calibration_settle_ms);
    }

    if let Some(avg) = average(&forward) {
        motion.set_gpp(Direction::Forward, cfg.nominal_separation_deg / avg);
    }
    if let Some(avg) = average(&backward) {
        motion.set_gpp(Direction::Backward, cfg.nominal_separation_deg / avg);
    }
    info!(
        "calibration averages: forward {:?} -> gpp {:.6}, backward {:?} -> gpp {:.6}",
        average(&forward),
        motion.gpp(Direction::Forward),
        average(&backward),
        motion.gpp(Direction::Backward),
    );

    let separation_deg = match measure_separation(rig, motion, cfg) {
        Ok(deg) => {
            info!("measured sensor separation: {:.2} deg", deg);
            deg
        }
        Err(e) => {
            warn!(
                "separation measurement failed ({}); keeping nominal {:.1} deg",
                e, cfg.nominal_separation_deg
            );
            cfg.nominal_separation_deg
        }
    };

    homing::go_home(rig, motion, cfg, separation_deg, cfg.measure_rpm)?;
    rig.stop();
    motion.zero();

    let result = CalibrationResult {
        gpp_forward: motion.gpp(Direction::Forward),
        gpp_backward: motion.gpp(Direction::Backward),
        separation_deg,
    };
    info!(
        "calibration complete: gpp fwd {:.6}, gpp back {:.6}, separation {:.2} deg",
        result.gpp_forward, result.gpp_backward, result.separation_deg
    );
    Ok(result)
}

/// Drive to the far sensor, reset the counter, drive back to the home
/// sensor, and convert the pulse distance with the freshly averaged
/// calibration constant.
fn measure_separation<R: MotorPort + HallPort + ClockPort>(
    rig: &mut R,
    motion: &MotionState,
    cfg: &RigConfig,
) -> Result<f32, HomingError> {
    info!("measuring true angle between the Hall references");
    let timeout = seek_timeout_pulses(motion, cfg.nominal_separation_deg, cfg);

    match seek(
        rig,
        motion,
        HallId::Far,
        Direction::Forward,
        cfg.measure_rpm,
        timeout,
    ) {
        SeekResult::Found => {}
        SeekResult::TimedOut => return Err(HomingError::FarNotFound),
    }
    rig.delay_ms(200);

    motion.reset_pulses();
    match seek(
        rig,
        motion,
        HallId::Zero,
        Direction::Backward,
        cfg.measure_rpm,
        timeout,
    ) {
        SeekResult::Found => {}
        SeekResult::TimedOut => return Err(HomingError::ZeroNotFound),
    }

    Ok(motion.abs_pulses() as f32 * motion.avg_gpp())
}

fn average(samples: &Vec<i32, MAX_SAMPLES>) -> Option<f32> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<i32>() as f32 / samples.len() as f32)
    }
}
