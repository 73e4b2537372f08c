//! Motion profile engine — the four closed-loop test modes.
//!
//! ```text
//!  mode 1  Fixed        fixed angle   × fixed speed
//!  mode 2  AngleLadder  angle ladder  × fixed speed
//!  mode 3  SpeedRamp    fixed angle   × speed ramp
//!  mode 4  Both         angle ladder  × speed ramp
//! ```
//!
//! The engine is re-entered on the session tick while RUNNING.  Its first
//! tick runs calibration + homing; after that modes 1 and 3 advance a
//! non-blocking two-leg cycle per tick, while modes 2 and 4 perform at
//! most one blocking rung transition per tick.  Hall interlocks always
//! take precedence over odometric targets: mode 1 answers a missing home
//! sensor with the odometric rescue, modes 2/4 abort to HOME, mode 3
//! reverses the leg.

use heapless::Vec;
use log::{info, warn};

use crate::config::RigConfig;
use crate::error::{ModeError, MoveError};
use crate::motion::calibration::{self, CalibrationResult};
use crate::motion::homing::{self, drive_motor, sensor_active};
use crate::motion::state::{Direction, MotionState};
use crate::ports::{ClockPort, HallId, HallPort, MotorPort};
use crate::session::telemetry::{FieldLabels, TelemetryFrame};

/// Ladder capacity: a ≤ 90° span with a ≥ 1° step never exceeds this.
pub const MAX_RUNGS: usize = 128;

// ---------------------------------------------------------------------------
// Mode configuration
// ---------------------------------------------------------------------------

/// The per-mode parameter banks, selected once at activation and consumed
/// immutably by each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeConfig {
    /// Mode 1 — fixed target angle at fixed speed.
    Fixed { angle: f32, speed: f32 },
    /// Mode 2 — discrete angle ladder at fixed speed.
    AngleLadder {
        init_angle: f32,
        final_angle: f32,
        step_angle: f32,
        speed: f32,
    },
    /// Mode 3 — fixed target angle with a progress-proportional speed ramp.
    SpeedRamp {
        angle: f32,
        init_vel: f32,
        final_vel: f32,
        step_vel: f32,
    },
    /// Mode 4 — angle ladder combined with the speed ramp.
    Both {
        init_angle: f32,
        final_angle: f32,
        step_angle: f32,
        init_vel: f32,
        final_vel: f32,
        step_vel: f32,
    },
}

impl ModeConfig {
    pub fn mode_number(&self) -> u8 {
        match self {
            Self::Fixed { .. } => 1,
            Self::AngleLadder { .. } => 2,
            Self::SpeedRamp { .. } => 3,
            Self::Both { .. } => 4,
        }
    }

    /// Apply the range clamps: angles to `[0, separation]`, speeds to
    /// `[0, rpm_max]`, steps coerced positive so progress is guaranteed.
    pub fn clamp(&mut self, separation_deg: f32, rpm_max: f32) {
        let ang = |a: &mut f32| *a = a.clamp(0.0, separation_deg);
        let vel = |v: &mut f32| *v = v.clamp(0.0, rpm_max);
        match self {
            Self::Fixed { angle, speed } => {
                ang(angle);
                vel(speed);
            }
            Self::AngleLadder {
                init_angle,
                final_angle,
                step_angle,
                speed,
            } => {
                ang(init_angle);
                ang(final_angle);
                *step_angle = coerce_step(*step_angle);
                vel(speed);
            }
            Self::SpeedRamp {
                angle,
                init_vel,
                final_vel,
                step_vel,
            } => {
                ang(angle);
                vel(init_vel);
                vel(final_vel);
                *step_vel = coerce_step(*step_vel);
            }
            Self::Both {
                init_angle,
                final_angle,
                step_angle,
                init_vel,
                final_vel,
                step_vel,
            } => {
                ang(init_angle);
                ang(final_angle);
                *step_angle = coerce_step(*step_angle);
                vel(init_vel);
                vel(final_vel);
                *step_vel = coerce_step(*step_vel);
            }
        }
    }
}

/// A step of zero would stall the ladder forever.
fn coerce_step(step: f32) -> f32 {
    if step <= 0.0 { 1.0 } else { step }
}

// ---------------------------------------------------------------------------
// Speed shaping for point-to-point moves
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum SpeedProfile {
    Fixed(f32),
    /// Linear in fractional progress toward the current sub-target.
    Ramp { from: f32, to: f32 },
}

impl SpeedProfile {
    fn at(self, frac: f32) -> f32 {
        match self {
            Self::Fixed(v) => v,
            Self::Ramp { from, to } => from + frac.clamp(0.0, 1.0) * (to - from),
        }
    }

    fn peak(self) -> f32 {
        match self {
            Self::Fixed(v) => v,
            Self::Ramp { from, to } => from.max(to),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Ladder sub-state for modes 2 and 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LadderStep {
    /// HOME → first rung.
    ToFirstRung,
    Ascending,
    Descending,
}

/// One active mode's state machine, re-entered on every session tick.
pub struct ProfileEngine {
    config: ModeConfig,
    labels: FieldLabels,
    started: bool,
    ladder: Vec<f32, MAX_RUNGS>,
    ladder_step: LadderStep,
    rung: usize,
    reps: u8,
    /// Last known lever angle (degrees from home).
    angle_est: f32,
    /// Last commanded speed, for telemetry.
    reported_rpm: f32,
}

impl ProfileEngine {
    pub fn new(config: ModeConfig, labels: FieldLabels) -> Self {
        let reported_rpm = match config {
            ModeConfig::Fixed { speed, .. } | ModeConfig::AngleLadder { speed, .. } => speed,
            ModeConfig::SpeedRamp { init_vel, .. } | ModeConfig::Both { init_vel, .. } => init_vel,
        };
        Self {
            config,
            labels,
            started: false,
            ladder: Vec::new(),
            ladder_step: LadderStep::ToFirstRung,
            rung: 0,
            reps: 0,
            angle_est: 0.0,
            reported_rpm,
        }
    }

    pub fn mode_number(&self) -> u8 {
        self.config.mode_number()
    }

    /// Re-arm the mode from scratch.  The next tick re-homes — and
    /// re-calibrates, if the session dropped the calibration — before
    /// any cycling resumes.
    pub fn restart(&mut self) {
        self.started = false;
    }

    /// Advance the active mode by one tick.
    ///
    /// The first tick calibrates (if the session holds no calibration)
    /// and arms the mode; later ticks run the mode's cycle logic.  The
    /// returned frame is the telemetry for this tick.
    pub fn tick<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        calibration: &mut Option<CalibrationResult>,
    ) -> Result<TelemetryFrame, ModeError> {
        if !self.started {
            self.start(rig, motion, cfg, calibration)?;
            return Ok(self.frame());
        }

        let separation = calibration
            .as_ref()
            .map_or(cfg.nominal_separation_deg, |c| c.separation_deg);

        match self.config {
            ModeConfig::Fixed { angle, speed } => {
                self.tick_fixed(rig, motion, cfg, separation, angle, speed);
            }
            ModeConfig::SpeedRamp {
                angle,
                init_vel,
                final_vel,
                ..
            } => {
                self.tick_ramp(rig, motion, cfg, separation, angle, init_vel, final_vel);
            }
            ModeConfig::AngleLadder {
                final_angle, speed, ..
            } => {
                self.tick_ladder(rig, motion, cfg, separation, final_angle, |_| {
                    SpeedProfile::Fixed(speed)
                })?;
                self.reported_rpm = speed;
            }
            ModeConfig::Both {
                final_angle,
                init_vel,
                final_vel,
                ..
            } => {
                // Ascending moves ramp up, descending moves trace the
                // complementary ramp, mirroring mode 3's legs.
                self.tick_ladder(rig, motion, cfg, separation, final_angle, |ascending| {
                    if ascending {
                        SpeedProfile::Ramp {
                            from: init_vel,
                            to: final_vel,
                        }
                    } else {
                        SpeedProfile::Ramp {
                            from: final_vel,
                            to: init_vel,
                        }
                    }
                })?;
            }
        }

        Ok(self.frame())
    }

    // ── First tick: calibrate + arm ───────────────────────────

    fn start<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        calibration: &mut Option<CalibrationResult>,
    ) -> Result<(), ModeError> {
        if calibration.is_none() {
            // Calibration finishes parked at home.
            *calibration = Some(calibration::run(rig, motion, cfg)?);
        } else {
            // Re-arm with a live calibration (after a recovery or a
            // manual move): establish the home origin first.
            let sep = calibration
                .as_ref()
                .map_or(cfg.nominal_separation_deg, |c| c.separation_deg);
            homing::go_home(rig, motion, cfg, sep, cfg.seek_rpm).map_err(ModeError::Homing)?;
            rig.stop();
        }
        let separation = calibration
            .as_ref()
            .map_or(cfg.nominal_separation_deg, |c| c.separation_deg);

        // Re-clamp now that the separation is measured, not nominal.
        self.config.clamp(separation, cfg.rpm_max);

        motion.zero();
        self.angle_est = 0.0;

        match self.config {
            ModeConfig::Fixed { speed, .. } => {
                drive_motor(rig, motion, Direction::Forward, speed);
                self.reported_rpm = speed;
            }
            ModeConfig::SpeedRamp { init_vel, .. } => {
                drive_motor(rig, motion, Direction::Forward, init_vel);
                self.reported_rpm = init_vel;
            }
            ModeConfig::AngleLadder {
                init_angle,
                final_angle,
                step_angle,
                ..
            }
            | ModeConfig::Both {
                init_angle,
                final_angle,
                step_angle,
                ..
            } => {
                self.ladder = build_ladder(init_angle, final_angle, step_angle);
                self.rung = 0;
                self.reps = 0;
                self.ladder_step = LadderStep::ToFirstRung;
            }
        }

        self.started = true;
        info!("mode {} armed at home", self.mode_number());
        Ok(())
    }

    // ── Mode 1: fixed angle, fixed speed ──────────────────────

    fn tick_fixed<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        separation: f32,
        angle: f32,
        speed: f32,
    ) {
        let target_deg = angle.min(separation);
        let gpp = motion.avg_gpp();
        let target = motion.degrees_to_pulses(target_deg, Direction::Forward);
        let margin = ((cfg.prebrake_margin_deg / gpp) as i32).max(1);
        let prebrake_at = (target - margin).max(0);
        let pre_rpm = (speed / 3.0).max(3.0);
        let p = motion.abs_pulses();
        self.reported_rpm = speed;

        match motion.direction() {
            Direction::Forward => {
                // Safety interlock outranks the odometric target.
                if sensor_active(rig, HallId::Far, cfg) {
                    info!("far sensor during ascent; reversing");
                    self.angle_est = target_deg;
                    self.reverse_to(rig, motion, Direction::Backward, speed);
                } else if p >= target {
                    info!("ascent target reached ({} pulses); reversing", p);
                    self.angle_est = target_deg;
                    self.reverse_to(rig, motion, Direction::Backward, speed);
                } else {
                    let cmd = if p >= prebrake_at { pre_rpm } else { speed };
                    drive_motor(rig, motion, Direction::Forward, cmd);
                    self.angle_est = (p as f32 * gpp).min(target_deg);
                }
            }
            Direction::Backward => {
                if sensor_active(rig, HallId::Zero, cfg) {
                    info!("home sensor during descent; reversing");
                    self.angle_est = 0.0;
                    self.reverse_to(rig, motion, Direction::Forward, speed);
                } else {
                    let span = motion.degrees_to_pulses(separation, Direction::Backward);
                    let max_down = (cfg.safety_factor_down * span as f32) as i32;
                    if p >= max_down {
                        self.rescue(rig, motion, speed, p);
                        self.angle_est = target_deg;
                    } else {
                        drive_motor(rig, motion, Direction::Backward, speed);
                        self.angle_est = (target_deg - p as f32 * gpp).max(0.0);
                    }
                }
            }
        }
    }

    /// Mode 1's recovery for a silent home sensor: replay the exact pulse
    /// distance just travelled downward back upward, restoring the lever
    /// to a known position without the faulted sensor.
    fn rescue<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        rpm: f32,
        pulses_travelled: i32,
    ) {
        warn!(
            "descent ran {} pulses without the home sensor; odometric rescue",
            pulses_travelled
        );
        rig.stop();
        motion.reset_pulses();
        drive_motor(rig, motion, Direction::Forward, rpm);
        while motion.abs_pulses() < pulses_travelled {
            rig.delay_ms(1);
        }
        rig.stop();
        motion.reset_pulses();
        motion.set_direction(Direction::Forward);
    }

    // ── Mode 3: fixed angle, speed ramp ───────────────────────

    #[allow(clippy::too_many_arguments)]
    fn tick_ramp<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        separation: f32,
        angle: f32,
        init_vel: f32,
        final_vel: f32,
    ) {
        let dir = motion.direction();
        let target_deg = angle.min(separation);
        let gpp = motion.avg_gpp();
        let target = motion.degrees_to_pulses(target_deg, dir);
        let margin_deg = cfg.prebrake_margin_deg
            + if dir == Direction::Backward {
                cfg.prebrake_backward_extra_deg
            } else {
                0.0
            };
        let margin = ((margin_deg / gpp) as i32).max(1);
        let prebrake_at = (target - margin).max(0);
        let pre_rpm = (final_vel / 3.0).max(2.0);
        let p = motion.abs_pulses();
        let leading = match dir {
            Direction::Forward => HallId::Far,
            Direction::Backward => HallId::Zero,
        };

        if p >= target || sensor_active(rig, leading, cfg) {
            let next = dir.flipped();
            // Each reversal flips the ramp, so the legs trace
            // complementary speed profiles.
            let start_rpm = match next {
                Direction::Forward => init_vel,
                Direction::Backward => final_vel,
            };
            self.angle_est = match dir {
                Direction::Forward => target_deg,
                Direction::Backward => 0.0,
            };
            info!("ramp leg done at {:.2} deg; reversing", self.angle_est);
            self.reverse_to(rig, motion, next, start_rpm);
            self.reported_rpm = start_rpm;
        } else {
            let frac = (p as f32 / target as f32).clamp(0.0, 1.0);
            let v = match dir {
                Direction::Forward => init_vel + frac * (final_vel - init_vel),
                Direction::Backward => final_vel - frac * (final_vel - init_vel),
            };
            let cmd = if p >= prebrake_at { v.min(pre_rpm) } else { v };
            drive_motor(rig, motion, dir, cmd);
            self.reported_rpm = cmd;
            self.angle_est = match dir {
                Direction::Forward => (p as f32 * gpp).min(target_deg),
                Direction::Backward => (target_deg - p as f32 * gpp).max(0.0),
            };
        }
    }

    // ── Modes 2 & 4: angle ladder ─────────────────────────────

    /// One ladder step per tick: HOME→first rung, ascend, descend, count
    /// a repetition on each return to the first rung, full re-home after
    /// the configured repetition count.
    fn tick_ladder<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        separation: f32,
        final_angle: f32,
        speed_for: impl Fn(bool) -> SpeedProfile,
    ) -> Result<(), ModeError> {
        // The top rung may legitimately touch the far sensor when the
        // ladder climbs all the way to the measured separation.
        let top_touches_far = final_angle >= separation - cfg.move_tolerance_deg;
        let last = self.ladder.len().saturating_sub(1);

        match self.ladder_step {
            LadderStep::ToFirstRung => {
                let target = self.ladder.first().copied().unwrap_or(0.0);
                self.rung_move(rig, motion, cfg, separation, target, speed_for(true), false)?;
                self.rung = 0;
                self.ladder_step = LadderStep::Ascending;
            }
            LadderStep::Ascending => {
                if self.rung >= last {
                    self.ladder_step = LadderStep::Descending;
                } else {
                    let next = self.rung + 1;
                    let allow_far = top_touches_far && next == last;
                    let target = self.ladder.get(next).copied().unwrap_or(final_angle);
                    self.rung_move(rig, motion, cfg, separation, target, speed_for(true), allow_far)?;
                    self.rung = next;
                    if next == last {
                        self.ladder_step = LadderStep::Descending;
                    }
                }
            }
            LadderStep::Descending => {
                if self.rung == 0 {
                    self.finish_repetition(rig, motion, cfg, separation)?;
                } else {
                    let next = self.rung - 1;
                    let target = self.ladder.get(next).copied().unwrap_or(0.0);
                    self.rung_move(rig, motion, cfg, separation, target, speed_for(false), false)?;
                    self.rung = next;
                    if next == 0 {
                        self.finish_repetition(rig, motion, cfg, separation)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_repetition<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        separation: f32,
    ) -> Result<(), ModeError> {
        self.reps += 1;
        info!(
            "ladder repetition {}/{} complete",
            self.reps, cfg.ladder_repetitions
        );
        if self.reps >= cfg.ladder_repetitions {
            homing::go_home(rig, motion, cfg, separation, cfg.cycle_rpm)
                .map_err(ModeError::Homing)?;
            rig.stop();
            self.angle_est = 0.0;
            self.reps = 0;
            self.ladder_step = LadderStep::ToFirstRung;
        } else {
            self.ladder_step = LadderStep::Ascending;
        }
        Ok(())
    }

    /// Blocking rung transition; on an unexpected sensor the whole mode
    /// aborts to HOME and the ladder restarts from scratch.
    #[allow(clippy::too_many_arguments)]
    fn rung_move<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        separation: f32,
        target: f32,
        speed: SpeedProfile,
        allow_far: bool,
    ) -> Result<(), ModeError> {
        match self.move_to_angle(rig, motion, cfg, separation, target, speed, allow_far) {
            Ok(()) => Ok(()),
            Err(MoveError::Interlocked(id)) => {
                warn!("unexpected {:?} sensor on rung move; aborting to home", id);
                homing::go_home(rig, motion, cfg, separation, cfg.cycle_rpm)
                    .map_err(ModeError::Homing)?;
                rig.stop();
                self.angle_est = 0.0;
                self.rung = 0;
                self.reps = 0;
                self.ladder_step = LadderStep::ToFirstRung;
                Ok(())
            }
            Err(e) => Err(ModeError::Move(e)),
        }
    }

    // ── Point-to-point primitive ──────────────────────────────

    /// Blocking move from the last known angle to `target`.  Deltas below
    /// the arrival tolerance are treated as already arrived.  A FORWARD
    /// move seeing the far sensor (unless permitted) or a BACKWARD move
    /// seeing the home sensor away from zero interlocks hard.
    #[allow(clippy::too_many_arguments)]
    fn move_to_angle<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        cfg: &RigConfig,
        separation: f32,
        target: f32,
        speed: SpeedProfile,
        allow_far: bool,
    ) -> Result<(), MoveError> {
        let target = target.clamp(0.0, separation);
        let delta = target - self.angle_est;
        if delta.abs() < cfg.move_tolerance_deg {
            self.angle_est = target;
            return Ok(());
        }

        let dir = if delta > 0.0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        motion.set_direction(dir);
        motion.reset_pulses();

        let pulses_target = motion.degrees_to_pulses(delta.abs(), dir);
        let gpp = motion.avg_gpp();
        let margin_deg = cfg.prebrake_margin_deg
            + if dir == Direction::Backward {
                cfg.prebrake_backward_extra_deg
            } else {
                0.0
            };
        let margin = ((margin_deg / gpp) as i32).max(1);
        let prebrake_at = (pulses_target - margin).max(0);
        let pre_rpm = (speed.peak() / 3.0).max(3.0);
        let origin = self.angle_est;

        loop {
            if dir == Direction::Forward && sensor_active(rig, HallId::Far, cfg) {
                rig.stop();
                if allow_far {
                    // Climbing to the top rung legitimately parks on the
                    // sensor; arrival is the sensor, not the odometry.
                    self.angle_est = target;
                    return Ok(());
                }
                return Err(MoveError::Interlocked(HallId::Far));
            }
            if dir == Direction::Backward && sensor_active(rig, HallId::Zero, cfg) {
                rig.stop();
                if target <= cfg.move_tolerance_deg {
                    motion.reset_pulses();
                    self.angle_est = 0.0;
                    return Ok(());
                }
                return Err(MoveError::Interlocked(HallId::Zero));
            }

            let p = motion.abs_pulses();
            if p >= pulses_target {
                rig.stop();
                self.angle_est = target;
                return Ok(());
            }

            let frac = p as f32 / pulses_target as f32;
            let v = speed.at(frac);
            let cmd = if p >= prebrake_at { v.min(pre_rpm) } else { v };
            drive_motor(rig, motion, dir, cmd);
            self.reported_rpm = cmd;
            self.angle_est = match dir {
                Direction::Forward => origin + p as f32 * gpp,
                Direction::Backward => origin - p as f32 * gpp,
            };
            rig.delay_ms(1);
        }
    }

    // ── Shared helpers ────────────────────────────────────────

    /// Stop, start a fresh leg in `dir`, drive at `rpm`.
    fn reverse_to<R: MotorPort + HallPort + ClockPort>(
        &mut self,
        rig: &mut R,
        motion: &MotionState,
        dir: Direction,
        rpm: f32,
    ) {
        rig.stop();
        motion.reset_pulses();
        drive_motor(rig, motion, dir, rpm);
    }

    fn frame(&self) -> TelemetryFrame {
        TelemetryFrame {
            mode: self.mode_number(),
            velocity: self.reported_rpm,
            angle: self.angle_est,
            labels: self.labels,
        }
    }
}

// ---------------------------------------------------------------------------
// Ladder construction
// ---------------------------------------------------------------------------

/// Inclusive rung sequence from `init` to `final_angle`; the final rung
/// is always exactly `final_angle` even when the step does not land on
/// it.  Degenerate ranges collapse to the final rung alone.
pub fn build_ladder(init: f32, final_angle: f32, step: f32) -> Vec<f32, MAX_RUNGS> {
    let mut rungs = Vec::new();
    let step = coerce_step(step);
    let mut a = init;
    while a < final_angle - 1e-4 {
        if rungs.push(a).is_err() {
            break;
        }
        a += step;
    }
    let _ = rungs.push(final_angle);
    rungs
}
