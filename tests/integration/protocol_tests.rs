//! Session/protocol behaviour end-to-end over the simulated rig.

use flexrig::config::RigConfig;
use flexrig::session::{Session, SessionState};
use flexrig::ports::ClockPort;

use crate::sim_rig::{MockLink, SimRig};

fn setup() -> (Session, SimRig, MockLink) {
    (Session::new(RigConfig::default()), SimRig::new(), MockLink::new())
}

/// Poll once, then again with time advanced by one tick period.
fn poll_n(session: &mut Session, rig: &mut SimRig, link: &mut MockLink, n: usize) {
    let motion = rig.motion.clone();
    for _ in 0..n {
        session.poll(rig, link, &motion);
        rig.delay_ms(RigConfig::default().tick_interval_ms);
    }
}

fn handshake(session: &mut Session, rig: &mut SimRig, link: &mut MockLink) {
    link.push("0");
    poll_n(session, rig, link, 1);
}

// ── Handshake gate ────────────────────────────────────────────

#[test]
fn handshake_echoes_zero_then_ready() {
    let (mut session, mut rig, mut link) = setup();

    // Nothing happens before the handshake.
    poll_n(&mut session, &mut rig, &mut link, 2);
    assert!(link.sent.is_empty());

    handshake(&mut session, &mut rig, &mut link);
    assert_eq!(link.sent, vec!["0", "READY"]);
}

#[test]
fn commands_are_ignored_before_handshake() {
    let (mut session, mut rig, mut link) = setup();
    link.push("RUN");
    link.push("{\"modo\":1}");
    poll_n(&mut session, &mut rig, &mut link, 3);
    assert!(link.sent.is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn end_dearms_the_handshake() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("END");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "STOP");
    assert_eq!(session.state(), SessionState::Idle);

    // Gate is re-armed: RUN goes unanswered until a fresh handshake.
    let before = link.sent.len();
    link.push("RUN");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.len(), before);

    link.push("0");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(&link.sent[before..], &["0", "READY"]);
}

// ── Idle-state commands ───────────────────────────────────────

#[test]
fn idle_acknowledges_control_commands() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("RUN");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "RUN");
    assert_eq!(session.state(), SessionState::Idle);

    link.push("PAUSA");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "PAUSE");
    assert_eq!(session.state(), SessionState::Paused);

    link.push("STOP");
    poll_n(&mut session, &mut rig, &mut link, 1);
    // Back in IDLE the session re-announces readiness, as on first entry.
    let n = link.sent.len();
    assert_eq!(&link.sent[n - 2..], &["STOP", "READY"]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn malformed_payloads_yield_single_error_lines() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);
    let base = link.sent.len();

    link.push("{\"modo\":5}");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(&link.sent[base..], &["ERROR: 'modo' debe ser 1..4"]);
    assert_eq!(session.state(), SessionState::Idle);

    link.push("{\"velocity\":7}");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "ERROR: falta 'modo' o 'mode'");
    assert_eq!(session.state(), SessionState::Idle);

    link.push("garbage line");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert!(link.sent.last().unwrap().starts_with("ERROR: "));
    assert_eq!(session.state(), SessionState::Idle);
}

// ── Manual point commands ─────────────────────────────────────

#[test]
fn manual_commands_execute_synchronously() {
    let (mut session, mut rig, mut link) = setup();
    rig.pos_deg = 40.0;
    handshake(&mut session, &mut rig, &mut link);

    link.push("HOME");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "HOME");
    assert!(rig.pos_deg <= rig.zero_on + 0.1);

    link.push("GOTO 30");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "GOTO");
    assert!((rig.pos_deg - 30.0).abs() < 4.0, "pos={}", rig.pos_deg);

    link.push("ENDPOS");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "ENDPOS");
    assert!(rig.pos_deg >= rig.far_on - 0.1);

    link.push("CALIBRACION");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(link.sent.last().unwrap(), "CALIBRACION");
    assert!(session.is_calibrated());
}

#[test]
fn failed_manual_command_reports_error_line() {
    let (mut session, mut rig, mut link) = setup();
    rig.pos_deg = 40.0;
    rig.zero_sensor_ok = false;
    rig.min_pos = -250.0;
    handshake(&mut session, &mut rig, &mut link);

    link.push("HOME");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert!(link.sent.last().unwrap().starts_with("ERROR: "));
    assert!(!rig.motor_running());
}

// ── End-to-end mode run (handshake → mode 1 → telemetry → STOP) ──

#[test]
fn mode1_end_to_end_scenario() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("{\"modo\":1,\"velocity\":7,\"angle\":45}");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(session.state(), SessionState::Running);
    // First tick ran calibration + homing and emitted the first frame.
    assert!(session.is_calibrated());
    assert_eq!(link.telemetry().len(), 1);
    assert!(link.telemetry()[0].starts_with("['modo', 1, 'velocity', 7, 'angle', "));

    poll_n(&mut session, &mut rig, &mut link, 150);

    let frames = link.telemetry();
    assert!(frames.len() > 100, "telemetry must flow every tick");
    let angles: Vec<f32> = frames
        .iter()
        .map(|l| {
            let tail = l.rsplit(", ").next().unwrap();
            tail.trim_end_matches(']').parse().unwrap()
        })
        .collect();
    assert!(angles.iter().any(|a| (a - 45.0).abs() < 0.01), "reaches the target");
    assert!(angles.iter().filter(|a| **a == 0.0).count() >= 2, "returns to home");
    assert!(angles.iter().all(|a| *a >= 0.0 && *a <= 45.01));
    assert!(link.errors().is_empty(), "no error lines during a clean run");

    link.push("STOP");
    poll_n(&mut session, &mut rig, &mut link, 1);
    let n = link.sent.len();
    assert_eq!(&link.sent[n - 2..], &["STOP", "READY"]);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.is_calibrated(), "STOP discards the session calibration");
    assert!(rig.pos_deg <= rig.zero_on + 0.2, "STOP drives home first");
    assert!(!rig.motor_running());
}

#[test]
fn oversized_angle_clamps_instead_of_rejecting() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("{\"modo\":1,\"velocity\":7,\"angle\":150}");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(session.state(), SessionState::Running);
    assert!(link.errors().is_empty(), "clamping is silent, not an error");

    poll_n(&mut session, &mut rig, &mut link, 120);
    let angles: Vec<f32> = link
        .telemetry()
        .iter()
        .map(|l| {
            let tail = l.rsplit(", ").next().unwrap();
            tail.trim_end_matches(']').parse().unwrap()
        })
        .collect();
    let peak = angles.iter().fold(0.0f32, |m, a| m.max(*a));
    assert!(peak > 70.0, "clamped target still drives a deep stroke (peak={})", peak);
    assert!(peak < 95.0, "reported angle clamps to the measured separation");
}

#[test]
fn telemetry_echoes_spanish_labels() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("{'modo':1,'velocidad':7,'angulo':30}");
    poll_n(&mut session, &mut rig, &mut link, 3);
    let frames = link.telemetry();
    assert!(!frames.is_empty());
    assert!(frames[0].starts_with("['modo', 1, 'velocidad', 7, 'angulo', "));
}

// ── PAUSE semantics ───────────────────────────────────────────

#[test]
fn pause_freezes_ticking_without_moving() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("{\"modo\":1,\"velocity\":7,\"angle\":45}");
    poll_n(&mut session, &mut rig, &mut link, 6);
    assert_eq!(session.state(), SessionState::Running);

    link.push("PAUSE");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(session.state(), SessionState::Paused);
    assert!(!rig.motor_running(), "pause stops the motor in place");

    let frozen_pos = rig.pos_deg;
    let frames_before = link.telemetry().len();
    poll_n(&mut session, &mut rig, &mut link, 10);
    assert_eq!(link.telemetry().len(), frames_before, "no telemetry while paused");
    assert!((rig.pos_deg - frozen_pos).abs() < 1e-9, "lever must not move");

    // RUN resumes ticking.
    link.push("RUN");
    poll_n(&mut session, &mut rig, &mut link, 10);
    assert_eq!(session.state(), SessionState::Running);
    assert!(link.telemetry().len() > frames_before);
}

#[test]
fn fresh_mode_activation_forces_recalibration() {
    let (mut session, mut rig, mut link) = setup();
    handshake(&mut session, &mut rig, &mut link);

    link.push("CALIBRACION");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert!(session.is_calibrated());

    // Activation invalidates the manual calibration; the engine's first
    // tick re-derives it.
    link.push("{\"modo\":1,\"velocity\":7,\"angle\":45}");
    poll_n(&mut session, &mut rig, &mut link, 1);
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.is_calibrated(), "first tick recalibrated");
}
