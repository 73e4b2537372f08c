//! Host session and protocol state machine.
//!
//! ```text
//!            0 / handshake              dict payload
//!   (boot) ──────────────▶ IDLE ───────────────────────▶ RUNNING
//!                           ▲  ◀──────── STOP ────────────┘ │ ▲
//!                           │                        PAUSE │ │ RUN
//!                           │                              ▼ │
//!                           └───────── STOP ───────────── PAUSED
//!
//!   END (any state): full reset, handshake re-armed
//! ```
//!
//! The session owns the per-tick scheduling deadline and is the single
//! top-level error dispatcher: a fault escaping a mode tick stops the
//! motor, drives home, and reports `ERROR en modo N: <detail>` while the
//! session stays RUNNING.  A non-blocking serial poll runs before every
//! tick so telemetry never starves command processing.

pub mod command;
pub mod payload;
pub mod telemetry;

use log::{info, warn};

use crate::config::RigConfig;
use crate::motion::calibration::{self, CalibrationResult};
use crate::motion::homing;
use crate::motion::profile::ProfileEngine;
use crate::motion::state::MotionState;
use crate::ports::{ClockPort, HallPort, LinkPort, MotorPort};
use command::{Command, classify};

/// Protocol state visible to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
}

/// The firmware-lifetime session.  Created once at boot, re-initialised
/// by END, destroyed only by power-cycle.
pub struct Session {
    cfg: RigConfig,
    state: SessionState,
    /// Handshake gate: no mode activity until the host has sent `0`.
    handshaken: bool,
    ready_sent: bool,
    engine: Option<ProfileEngine>,
    /// Volatile per-session calibration; `None` forces the engine to
    /// calibrate on its first tick.
    calibration: Option<CalibrationResult>,
    /// Monotonic deadline for the next motion-engine tick (ms).
    next_tick_ms: u64,
}

impl Session {
    pub fn new(cfg: RigConfig) -> Self {
        Self {
            cfg,
            state: SessionState::Idle,
            handshaken: false,
            ready_sent: false,
            engine: None,
            calibration: None,
            next_tick_ms: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Angle clamps use the measured separation once calibration has
    /// run, the nominal constant before that.
    fn separation(&self) -> f32 {
        self.calibration
            .as_ref()
            .map_or(self.cfg.nominal_separation_deg, |c| c.separation_deg)
    }

    /// One pass of the cooperative main loop: poll at most one host
    /// line, then run the mode tick if its deadline has passed.
    pub fn poll<R, L>(&mut self, rig: &mut R, link: &mut L, motion: &MotionState)
    where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        if let Some(line) = link.poll_line() {
            self.handle_line(&line, rig, link, motion);
        }

        if !self.handshaken {
            return;
        }

        if self.state == SessionState::Idle && !self.ready_sent {
            rig.stop();
            link.send_line("READY");
            self.ready_sent = true;
        }

        if self.state == SessionState::Running {
            let now = rig.now_ms();
            if now >= self.next_tick_ms {
                self.run_tick(rig, link, motion);
                self.next_tick_ms = rig.now_ms() + u64::from(self.cfg.tick_interval_ms);
            }
        }
    }

    // ── Line handling ─────────────────────────────────────────

    fn handle_line<R, L>(&mut self, line: &str, rig: &mut R, link: &mut L, motion: &MotionState)
    where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        let cmd = classify(line);

        // Handshake and END are honoured in every state.
        match cmd {
            Some(Command::Handshake) => {
                link.send_line("0");
                self.handshaken = true;
                self.ready_sent = false;
                return;
            }
            Some(Command::End) => {
                rig.stop();
                link.send_line("STOP");
                motion.zero();
                motion.reset_gpp();
                self.full_reset();
                info!("session reset by END");
                return;
            }
            _ => {}
        }

        if !self.handshaken {
            return;
        }

        match self.state {
            SessionState::Idle => self.handle_idle(cmd, line, rig, link, motion),
            SessionState::Running => self.handle_running(cmd, rig, link, motion),
            SessionState::Paused => self.handle_paused(cmd, rig, link, motion),
        }
    }

    fn handle_idle<R, L>(
        &mut self,
        cmd: Option<Command>,
        line: &str,
        rig: &mut R,
        link: &mut L,
        motion: &MotionState,
    ) where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        match cmd {
            Some(Command::Stop) => {
                self.calibration = None;
                link.send_line("STOP");
                self.ready_sent = false;
            }
            Some(Command::Run) => link.send_line("RUN"),
            Some(Command::Pause) => {
                link.send_line("PAUSE");
                self.state = SessionState::Paused;
            }
            Some(
                c @ (Command::Calibrate | Command::Home | Command::EndPos | Command::Goto(_)),
            ) => {
                self.manual_command(c, rig, link, motion);
            }
            Some(Command::Handshake | Command::End) => {}
            None => match payload::parse_activation(line, self.separation(), &self.cfg) {
                Ok(act) => {
                    info!("mode {} activated", act.config.mode_number());
                    self.engine = Some(ProfileEngine::new(act.config, act.labels));
                    // A fresh mode selection always invalidates prior
                    // calibration; the first tick re-derives it.
                    self.calibration = None;
                    self.state = SessionState::Running;
                    self.next_tick_ms = 0;
                }
                Err(e) => link.send_line(&format!("ERROR: {}", e)),
            },
        }
    }

    fn handle_running<R, L>(
        &mut self,
        cmd: Option<Command>,
        rig: &mut R,
        link: &mut L,
        motion: &MotionState,
    ) where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        match cmd {
            Some(Command::Pause) => {
                // Freeze in place: ticking stops, the lever stays put.
                rig.stop();
                link.send_line("PAUSE");
                self.state = SessionState::Paused;
            }
            Some(Command::Run) => {
                link.send_line("RUN");
                self.next_tick_ms = rig.now_ms() + u64::from(self.cfg.tick_interval_ms);
            }
            Some(Command::Stop) => self.stop_to_idle(rig, link, motion),
            // Manual point commands are only honoured outside a running mode.
            _ => {}
        }
    }

    fn handle_paused<R, L>(
        &mut self,
        cmd: Option<Command>,
        rig: &mut R,
        link: &mut L,
        motion: &MotionState,
    ) where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        match cmd {
            Some(Command::Run) => {
                link.send_line("RUN");
                self.state = SessionState::Running;
                self.next_tick_ms = rig.now_ms() + u64::from(self.cfg.tick_interval_ms);
            }
            Some(Command::Stop) => self.stop_to_idle(rig, link, motion),
            Some(Command::Pause) => link.send_line("PAUSE"),
            Some(
                c @ (Command::Calibrate | Command::Home | Command::EndPos | Command::Goto(_)),
            ) => {
                self.manual_command(c, rig, link, motion);
                // The lever moved under the paused mode's feet; re-arm it
                // so resumption starts from a clean home.
                if let Some(engine) = self.engine.as_mut() {
                    engine.restart();
                }
            }
            _ => {}
        }
    }

    // ── Manual point commands ─────────────────────────────────

    fn manual_command<R, L>(&mut self, cmd: Command, rig: &mut R, link: &mut L, motion: &MotionState)
    where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        let sep = self.separation();
        let outcome: Result<&'static str, String> = match cmd {
            Command::Calibrate => match calibration::run(rig, motion, &self.cfg) {
                Ok(res) => {
                    self.calibration = Some(res);
                    Ok("CALIBRACION")
                }
                Err(e) => Err(e.to_string()),
            },
            Command::Home => homing::go_home(rig, motion, &self.cfg, sep, self.cfg.seek_rpm)
                .map(|()| "HOME")
                .map_err(|e| e.to_string()),
            Command::EndPos => homing::seek_end(rig, motion, &self.cfg, sep)
                .map(|()| "ENDPOS")
                .map_err(|e| e.to_string()),
            Command::Goto(angle) => {
                homing::go_to_angle(rig, motion, &self.cfg, sep, angle, self.cfg.cycle_rpm)
                    .map(|()| "GOTO")
                    .map_err(|e| e.to_string())
            }
            _ => return,
        };
        match outcome {
            Ok(ack) => link.send_line(ack),
            Err(e) => link.send_line(&format!("ERROR: {}", e)),
        }
    }

    // ── Tick + recovery ───────────────────────────────────────

    fn run_tick<R, L>(&mut self, rig: &mut R, link: &mut L, motion: &MotionState)
    where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        let sep = self.separation();
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match engine.tick(rig, motion, &self.cfg, &mut self.calibration) {
            Ok(frame) => link.send_line(&frame.render()),
            Err(e) => {
                let mode = engine.mode_number();
                rig.stop();
                if let Err(home_err) =
                    homing::go_home(rig, motion, &self.cfg, sep, self.cfg.seek_rpm)
                {
                    warn!("recovery homing failed: {}", home_err);
                }
                rig.stop();
                link.send_line(&format!("ERROR en modo {}: {}", mode, e));
                // Session stays RUNNING; the re-armed engine retries from
                // home on the next tick.
                engine.restart();
            }
        }
    }

    /// STOP from RUNNING or PAUSED: drive home, ack, drop the mode.
    fn stop_to_idle<R, L>(&mut self, rig: &mut R, link: &mut L, motion: &MotionState)
    where
        R: MotorPort + HallPort + ClockPort,
        L: LinkPort,
    {
        if let Err(e) = homing::go_home(rig, motion, &self.cfg, self.separation(), self.cfg.seek_rpm)
        {
            warn!("homing on STOP failed: {}", e);
        }
        rig.stop();
        self.calibration = None;
        link.send_line("STOP");
        self.state = SessionState::Idle;
        self.engine = None;
        self.ready_sent = false;
    }

    /// END: back to power-on conditions, handshake gate re-armed.
    fn full_reset(&mut self) {
        self.state = SessionState::Idle;
        self.engine = None;
        self.calibration = None;
        self.handshaken = false;
        self.ready_sent = false;
        self.next_tick_ms = 0;
    }
}
