//! Homing, calibration and profile-engine behaviour on the simulated rig.

use flexrig::config::RigConfig;
use flexrig::motion::calibration;
use flexrig::motion::homing;
use flexrig::motion::profile::{ModeConfig, ProfileEngine};
use flexrig::motion::state::{Direction, MAX_GPP, MIN_GPP};
use flexrig::ports::ClockPort;
use flexrig::session::telemetry::{FieldLabels, TelemetryFrame};

use crate::sim_rig::SimRig;

fn cfg() -> RigConfig {
    RigConfig::default()
}

/// Drive the engine for `ticks` periods, advancing simulated time
/// between ticks exactly like the session scheduler does.
fn run_ticks(
    engine: &mut ProfileEngine,
    rig: &mut SimRig,
    cfg: &RigConfig,
    calib: &mut Option<calibration::CalibrationResult>,
    ticks: usize,
) -> Vec<TelemetryFrame> {
    let motion = rig.motion.clone();
    let mut frames = Vec::new();
    for _ in 0..ticks {
        frames.push(
            engine
                .tick(rig, &motion, cfg, calib)
                .expect("mode tick failed"),
        );
        rig.delay_ms(cfg.tick_interval_ms);
    }
    frames
}

// ── Homing ────────────────────────────────────────────────────

#[test]
fn go_home_parks_at_zero_with_backward_direction() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    rig.pos_deg = 45.0;
    let motion = rig.motion.clone();

    homing::go_home(&mut rig, &motion, &cfg, cfg.nominal_separation_deg, 6.0).unwrap();

    assert_eq!(motion.pulses(), 0);
    assert_eq!(motion.direction(), Direction::Backward);
    assert!(rig.pos_deg <= rig.zero_on + 0.1, "pos={}", rig.pos_deg);
    assert!(!rig.motor_running());
}

#[test]
fn go_home_releases_first_when_already_on_sensor() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    rig.pos_deg = 0.0; // sitting on the home sensor
    let motion = rig.motion.clone();

    homing::go_home(&mut rig, &motion, &cfg, cfg.nominal_separation_deg, 6.0).unwrap();

    assert_eq!(motion.pulses(), 0);
    assert_eq!(motion.direction(), Direction::Backward);
    assert!(rig.pos_deg <= rig.zero_on + 0.1);
}

#[test]
fn go_home_reports_failure_when_sensor_is_dead() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    rig.pos_deg = 45.0;
    rig.zero_sensor_ok = false;
    // Let the odometry keep counting past the physical stop so the
    // pulse timeout can fire.
    rig.min_pos = -250.0;
    let motion = rig.motion.clone();

    let err = homing::go_home(&mut rig, &motion, &cfg, cfg.nominal_separation_deg, 6.0);
    assert!(err.is_err());
    assert!(!rig.motor_running(), "motor must be stopped after a failed seek");
}

#[test]
fn seek_end_parks_on_far_sensor() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    rig.pos_deg = 20.0;
    let motion = rig.motion.clone();

    homing::seek_end(&mut rig, &motion, &cfg, cfg.nominal_separation_deg).unwrap();
    assert!(rig.pos_deg >= rig.far_on - 0.1, "pos={}", rig.pos_deg);
    assert!(!rig.motor_running());
}

#[test]
fn go_to_angle_lands_within_prebrake_tolerance() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    rig.pos_deg = 60.0;
    let motion = rig.motion.clone();

    homing::go_to_angle(&mut rig, &motion, &cfg, cfg.nominal_separation_deg, 30.0, 7.0).unwrap();

    // Uncalibrated gpp is approximate; the landing must still be in the
    // right neighbourhood and the motor stopped.
    assert!((rig.pos_deg - 30.0).abs() < 4.0, "pos={}", rig.pos_deg);
    assert!(!rig.motor_running());
}

// ── Calibration ───────────────────────────────────────────────

#[test]
fn calibration_derives_per_direction_gpp() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    let motion = rig.motion.clone();

    let result = calibration::run(&mut rig, &motion, &cfg).unwrap();

    // Derived constants must land near the simulated truth (the nominal
    // separation differs slightly from the simulated one, so exact
    // equality is not expected) and inside the sanity clamps.
    assert!((result.gpp_forward - rig.gpp_forward as f32).abs() < 0.002);
    assert!((result.gpp_backward - rig.gpp_backward as f32).abs() < 0.002);
    assert!(result.gpp_forward >= MIN_GPP && result.gpp_forward <= MAX_GPP);
    assert!(result.gpp_backward >= MIN_GPP && result.gpp_backward <= MAX_GPP);
    assert!(
        result.gpp_forward > result.gpp_backward,
        "forward travel has the larger simulated degrees-per-pulse"
    );

    // Measured separation reflects the simulated sensor geometry.
    assert!(
        result.separation_deg > 80.0 && result.separation_deg < 95.0,
        "separation={}",
        result.separation_deg
    );

    // The sequence always finishes parked at home with clean state.
    assert_eq!(motion.pulses(), 0);
    assert_eq!(motion.reference_angle(), 0.0);
    assert!(rig.pos_deg <= rig.zero_on + 0.1);
    assert!(!rig.motor_running());
}

#[test]
fn calibration_fails_cleanly_when_sensors_unreachable() {
    let mut cfg = cfg();
    // Shrink the settle pause so the failing run stays quick.
    cfg.calibration_settle_ms = 10;
    let mut rig = SimRig::new();
    // Far sensor is beyond the mechanical stop: first cycle can never
    // reach it, and the pulse budget runs out against the end stop...
    rig.far_on = 200.0;
    rig.max_pos = 500.0;
    let motion = rig.motion.clone();

    let err = calibration::run(&mut rig, &motion, &cfg);
    assert!(err.is_err());
    assert!(!rig.motor_running());
}

// ── Mode 1: fixed angle, fixed speed ──────────────────────────

#[test]
fn mode1_cycles_between_zero_and_target() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    let mut calib = None;
    let mut engine = ProfileEngine::new(
        ModeConfig::Fixed {
            angle: 45.0,
            speed: 7.0,
        },
        FieldLabels::default(),
    );

    let frames = run_ticks(&mut engine, &mut rig, &cfg, &mut calib, 200);

    assert!(calib.is_some(), "first tick must calibrate");
    assert_eq!(frames[0].angle, 0.0, "first frame reports home");

    let peaks = frames.iter().filter(|f| (f.angle - 45.0).abs() < 0.01).count();
    let troughs = frames.iter().filter(|f| f.angle == 0.0).count();
    assert!(peaks >= 3, "expected repeated ascents to 45, got {}", peaks);
    assert!(troughs >= 3, "expected repeated returns to 0, got {}", troughs);

    // Reported angles stay within the commanded envelope.
    assert!(frames.iter().all(|f| f.angle >= 0.0 && f.angle <= 45.01));
    assert!(frames.iter().all(|f| f.mode == 1 && f.velocity == 7.0));
}

#[test]
fn mode1_rescues_odometrically_when_home_sensor_dies() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    let mut calib = None;
    let mut engine = ProfileEngine::new(
        ModeConfig::Fixed {
            angle: 45.0,
            speed: 7.0,
        },
        FieldLabels::default(),
    );

    // Calibrate with healthy sensors first.
    let _ = run_ticks(&mut engine, &mut rig, &cfg, &mut calib, 2);
    assert!(calib.is_some());

    // Kill the home sensor and open the floor so the overtravel is
    // odometrically visible.
    rig.zero_sensor_ok = false;
    rig.min_pos = -250.0;

    let motion = rig.motion.clone();
    let mut lowest = f64::MAX;
    let mut recovered = false;
    for _ in 0..400 {
        engine
            .tick(&mut rig, &motion, &cfg, &mut calib)
            .expect("tick failed");
        lowest = lowest.min(rig.pos_deg);
        // Rescue complete: lever back up around the stroke top after
        // having overtravelled far below home.
        if lowest < -40.0 && rig.pos_deg > 30.0 {
            recovered = true;
            break;
        }
        rig.delay_ms(cfg.tick_interval_ms);
    }

    assert!(
        lowest < -40.0,
        "descent should overtravel without the sensor (lowest={})",
        lowest
    );
    assert!(recovered, "rescue must hoist the lever back up");
}

// ── Mode 2: angle ladder ──────────────────────────────────────

#[test]
fn mode2_ladder_visits_rungs_and_rehomes() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    let mut calib = None;
    let mut engine = ProfileEngine::new(
        ModeConfig::AngleLadder {
            init_angle: 0.0,
            final_angle: 20.0,
            step_angle: 5.0,
            speed: 7.0,
        },
        FieldLabels::default(),
    );

    let frames = run_ticks(&mut engine, &mut rig, &cfg, &mut calib, 120);

    let angles: Vec<f32> = frames.iter().map(|f| f.angle).collect();
    for rung in [5.0f32, 10.0, 15.0, 20.0] {
        assert!(
            angles.iter().any(|a| (a - rung).abs() < 0.01),
            "rung {} never visited: {:?}",
            rung,
            angles
        );
    }
    assert!(angles.iter().all(|a| *a <= 20.01), "ladder must not overshoot its top");

    // Five repetitions per home return: the top rung appears at least
    // five times in a run this long.
    let tops = angles.iter().filter(|a| (**a - 20.0).abs() < 0.01).count();
    assert!(tops >= 5, "expected >=5 top-rung visits, got {}", tops);
}

// ── Mode 3: speed ramp ────────────────────────────────────────

#[test]
fn mode3_ramps_speed_with_progress() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    let mut calib = None;
    let mut engine = ProfileEngine::new(
        ModeConfig::SpeedRamp {
            angle: 60.0,
            init_vel: 7.0,
            final_vel: 21.0,
            step_vel: 1.0,
        },
        FieldLabels::default(),
    );

    let frames = run_ticks(&mut engine, &mut rig, &cfg, &mut calib, 120);

    let vmax = frames.iter().map(|f| f.velocity).fold(0.0f32, f32::max);
    assert!(vmax <= 21.01, "ramp must not exceed final_vel (got {})", vmax);
    assert!(vmax > 14.0, "ramp should get well past the midpoint (got {})", vmax);

    let peaks = frames.iter().filter(|f| (f.angle - 60.0).abs() < 0.01).count();
    assert!(peaks >= 2, "ramp mode still cycles the angle envelope");

    // Within a single ascent the commanded speed is non-decreasing
    // until the pre-brake window.
    let first_peak = frames.iter().position(|f| (f.angle - 60.0).abs() < 0.01).unwrap();
    let ascent = &frames[1..first_peak.max(2)];
    for pair in ascent.windows(2) {
        if pair[1].angle > pair[0].angle && pair[1].angle < 55.0 {
            assert!(
                pair[1].velocity >= pair[0].velocity - 0.01,
                "speed fell during ascent: {:?}",
                pair
            );
        }
    }
}

// ── Mode 4: ladder × ramp ─────────────────────────────────────

#[test]
fn mode4_combines_ladder_with_ramp() {
    let cfg = cfg();
    let mut rig = SimRig::new();
    let mut calib = None;
    let mut engine = ProfileEngine::new(
        ModeConfig::Both {
            init_angle: 0.0,
            final_angle: 30.0,
            step_angle: 10.0,
            init_vel: 7.0,
            final_vel: 21.0,
            step_vel: 1.0,
        },
        FieldLabels::default(),
    );

    let frames = run_ticks(&mut engine, &mut rig, &cfg, &mut calib, 100);

    let angles: Vec<f32> = frames.iter().map(|f| f.angle).collect();
    for rung in [10.0f32, 20.0, 30.0] {
        assert!(
            angles.iter().any(|a| (a - rung).abs() < 0.01),
            "rung {} never visited",
            rung
        );
    }
    assert!(frames.iter().all(|f| f.velocity <= 21.01));
    assert!(frames.iter().all(|f| f.mode == 4));
}
