//! Hall-sensor homing and the blocking seek primitives.
//!
//! The two reference sensors are active-low magnetic switches with
//! pull-ups; electrical bounce is rejected in software by requiring a
//! run of consecutive active samples.  Every routine here is a blocking
//! busy-wait from the firmware's point of view — the session does not
//! service serial input while one of these is in flight, which the
//! protocol tolerates by design.

use log::{info, warn};

use crate::config::RigConfig;
use crate::error::{HomingError, MoveError, SeekResult};
use crate::motion::state::{Direction, MotionState};
use crate::ports::{ClockPort, HallId, HallPort, MotorPort};

/// Drive the motor and keep the shared direction in sync, so the ISR
/// applies the right calibration constant to the reference angle.
pub(crate) fn drive_motor<R: MotorPort>(
    rig: &mut R,
    motion: &MotionState,
    dir: Direction,
    rpm: f32,
) {
    motion.set_direction(dir);
    rig.drive(dir, rpm);
}

/// Debounced sensor read: true only if every sample in the window reads
/// active (low).  Any inactive sample returns false immediately, so the
/// common "nothing there" case costs a single GPIO read.
pub fn sensor_active<R: HallPort + ClockPort>(rig: &mut R, id: HallId, cfg: &RigConfig) -> bool {
    for _ in 0..cfg.debounce_samples {
        if rig.hall_level(id) {
            return false;
        }
        rig.delay_ms(cfg.debounce_interval_ms);
    }
    true
}

/// Block until the sensor reads inactive for a full debounce window.
/// Guards against restarting a move while still sitting on a magnet.
pub fn await_release<R: HallPort + ClockPort>(rig: &mut R, id: HallId, cfg: &RigConfig) {
    loop {
        if rig.hall_level(id) {
            rig.delay_ms(cfg.release_debounce_ms);
            if rig.hall_level(id) {
                return;
            }
        }
        rig.delay_ms(5);
    }
}

/// Odometric estimate of the pulse distance between the two sensors.
pub fn estimated_span_pulses(motion: &MotionState, separation_deg: f32) -> i32 {
    let gpp = motion.avg_gpp();
    if gpp <= 0.0 {
        return 99_999;
    }
    (separation_deg / gpp) as i32
}

/// Seek timeout: the estimated span with a safety factor and a floor, so
/// a garbage calibration can neither stall the seek forever nor cut it
/// off before the lever has had a chance to arrive.
pub fn seek_timeout_pulses(motion: &MotionState, separation_deg: f32, cfg: &RigConfig) -> i32 {
    let span = estimated_span_pulses(motion, separation_deg);
    (cfg.seek_timeout_factor * span.max(cfg.seek_timeout_floor_pulses) as f32) as i32
}

/// Drive in `dir` until `target` goes active, bounded by a pulse budget
/// counted from entry.  The motor is stopped on both exits.  This is the
/// building block under both homing and calibration.
pub fn seek<R: MotorPort + HallPort + ClockPort>(
    rig: &mut R,
    motion: &MotionState,
    target: HallId,
    dir: Direction,
    rpm: f32,
    timeout_pulses: i32,
) -> SeekResult {
    let base = motion.pulses();
    drive_motor(rig, motion, dir, rpm);
    loop {
        if !rig.hall_level(target) {
            rig.stop();
            return SeekResult::Found;
        }
        if (motion.pulses() - base).abs() >= timeout_pulses {
            rig.stop();
            return SeekResult::TimedOut;
        }
        rig.delay_ms(1);
    }
}

/// Best-effort return to the 0° reference.
///
/// If the lever is already sitting on the home sensor, it first releases
/// a short distance forward and waits for a clean release, then
/// re-approaches.  Success leaves `pulse_count == 0` and direction
/// BACKWARD — the rig's convention for "parked at home".
pub fn go_home<R: MotorPort + HallPort + ClockPort>(
    rig: &mut R,
    motion: &MotionState,
    cfg: &RigConfig,
    separation_deg: f32,
    rpm: f32,
) -> Result<(), HomingError> {
    let rpm = rpm.max(3.0);

    if sensor_active(rig, HallId::Zero, cfg) {
        let release = (estimated_span_pulses(motion, separation_deg) / 10).max(5);
        let base = motion.pulses();
        drive_motor(rig, motion, Direction::Forward, rpm);
        while (motion.pulses() - base).abs() < release {
            rig.delay_ms(1);
        }
        rig.stop();
        await_release(rig, HallId::Zero, cfg);
    }

    let timeout = seek_timeout_pulses(motion, separation_deg, cfg);
    match seek(rig, motion, HallId::Zero, Direction::Backward, rpm, timeout) {
        SeekResult::Found => {
            motion.reset_pulses();
            motion.set_direction(Direction::Backward);
            info!("home reached (0 deg)");
            Ok(())
        }
        SeekResult::TimedOut => {
            warn!("home sensor not found within {} pulses", timeout);
            rig.stop();
            Err(HomingError::ZeroNotFound)
        }
    }
}

/// Park the lever on the far sensor: home first, then seek forward.
/// Used by the manual `ENDPOS` command.
pub fn seek_end<R: MotorPort + HallPort + ClockPort>(
    rig: &mut R,
    motion: &MotionState,
    cfg: &RigConfig,
    separation_deg: f32,
) -> Result<(), HomingError> {
    go_home(rig, motion, cfg, separation_deg, cfg.seek_rpm)?;
    motion.reset_pulses();
    let timeout = seek_timeout_pulses(motion, separation_deg, cfg);
    match seek(
        rig,
        motion,
        HallId::Far,
        Direction::Forward,
        cfg.seek_rpm,
        timeout,
    ) {
        SeekResult::Found => {
            info!("far sensor reached after {} pulses", motion.abs_pulses());
            Ok(())
        }
        SeekResult::TimedOut => {
            warn!("far sensor not found within {} pulses", timeout);
            Err(HomingError::FarNotFound)
        }
    }
}

/// Manual point move: always homes first, then raises the lever to
/// `angle` with pre-braking, respecting the far end-stop.
pub fn go_to_angle<R: MotorPort + HallPort + ClockPort>(
    rig: &mut R,
    motion: &MotionState,
    cfg: &RigConfig,
    separation_deg: f32,
    angle: f32,
    rpm: f32,
) -> Result<(), MoveError> {
    let angle = angle.clamp(0.0, separation_deg);

    go_home(rig, motion, cfg, separation_deg, cfg.measure_rpm)?;
    if angle <= 0.0 {
        return Ok(());
    }

    motion.set_direction(Direction::Forward);
    motion.reset_pulses();

    let target = motion.degrees_to_pulses(angle, Direction::Forward);
    let margin = ((cfg.prebrake_margin_deg / motion.avg_gpp()) as i32).max(1);
    let prebrake_at = (target - margin).max(0);
    let pre_rpm = (rpm / 3.0).max(3.0);

    info!("moving to {:.2} deg ({} pulses)", angle, target);
    drive_motor(rig, motion, Direction::Forward, rpm);
    loop {
        if sensor_active(rig, HallId::Far, cfg) {
            rig.stop();
            warn!("far sensor triggered before the target; stopped");
            return Err(MoveError::Interlocked(HallId::Far));
        }
        let p = motion.abs_pulses();
        if p >= target {
            rig.stop();
            info!("angle {:.2} deg reached ({} pulses)", angle, p);
            return Ok(());
        }
        let cmd = if p >= prebrake_at { pre_rpm } else { rpm };
        drive_motor(rig, motion, Direction::Forward, cmd);
        rig.delay_ms(1);
    }
}
