//! Shared motion counters mutated by the encoder ISR and read by the
//! control loop.
//!
//! The quadrature ISR can preempt the main loop at any instruction
//! boundary, so every field lives in a hardware atomic — a lock-free
//! read-modify-write is the correctness contract here, not an
//! optimisation.  Losing a `fetch_add` would silently corrupt the
//! odometry that every motion mode depends on.
//!
//! Angles and degrees-per-pulse are `f32` values stored bit-cast in
//! `AtomicU32`, the standard trick for float state shared with an ISR.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

/// Factory-default degrees-per-pulse used until calibration runs.
pub const DEFAULT_GPP: f32 = 0.014;

/// Lower sanity clamp for calibrated degrees-per-pulse.
pub const MIN_GPP: f32 = 0.001;
/// Upper sanity clamp for calibrated degrees-per-pulse.
pub const MAX_GPP: f32 = 0.2;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Travel direction of the lever.  FORWARD raises the lever toward the
/// far sensor; BACKWARD lowers it toward the 0° home sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Forward = 0,
    Backward = 1,
}

impl Direction {
    pub const fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    fn from_u8(v: u8) -> Self {
        if v == 0 { Self::Forward } else { Self::Backward }
    }
}

// ---------------------------------------------------------------------------
// MotionState
// ---------------------------------------------------------------------------

/// The single shared odometry record.
///
/// One instance exists for the real rig (see [`crate::motion::encoder`]);
/// tests construct their own.  The ISR only calls [`on_edge`]; everything
/// else is main-loop API.
///
/// Invariant: the pulse counter is reset to zero exactly at the start of
/// each new motion leg — every homing pass, every direction reversal,
/// every mode activation.
///
/// [`on_edge`]: MotionState::on_edge
pub struct MotionState {
    /// Signed quadrature pulse count since the start of the current leg.
    pulses: AtomicI32,
    /// Cumulative reference angle since the last zeroing (diagnostic only).
    reference_deg_bits: AtomicU32,
    /// Current commanded travel direction.
    direction: AtomicU8,
    /// Calibrated degrees-per-pulse, FORWARD travel.
    gpp_forward_bits: AtomicU32,
    /// Calibrated degrees-per-pulse, BACKWARD travel (differs due to backlash).
    gpp_backward_bits: AtomicU32,
    /// Last observed level of encoder phase A.
    last_a: AtomicBool,
}

impl MotionState {
    pub const fn new() -> Self {
        Self {
            pulses: AtomicI32::new(0),
            reference_deg_bits: AtomicU32::new(0),
            direction: AtomicU8::new(Direction::Forward as u8),
            gpp_forward_bits: AtomicU32::new(DEFAULT_GPP.to_bits()),
            gpp_backward_bits: AtomicU32::new(DEFAULT_GPP.to_bits()),
            last_a: AtomicBool::new(false),
        }
    }

    // ── ISR entry point ───────────────────────────────────────

    /// Decode one sample of the two quadrature phases.
    ///
    /// Called from the edge ISR on phase A.  If A is unchanged since the
    /// previous invocation this is a no-op (spurious trigger / bounce).
    /// Otherwise the pulse sign comes from phase B: `B == A` after the
    /// edge means the wheel turns one way (−1), `B != A` the other (+1).
    pub fn on_edge(&self, phase_a: bool, phase_b: bool) {
        let last = self.last_a.load(Ordering::Relaxed);
        if phase_a == last {
            return;
        }
        self.last_a.store(phase_a, Ordering::Relaxed);

        let delta: i32 = if phase_a == phase_b { -1 } else { 1 };
        self.pulses.fetch_add(delta, Ordering::Relaxed);

        // Net angle since the origin, scaled by the active direction's
        // calibration constant.
        let gpp = self.gpp(self.direction());
        let _ = self
            .reference_deg_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f32::from_bits(bits) + delta as f32 * gpp).to_bits())
            });
    }

    /// Seed the phase-A latch with the level read at boot, before the
    /// ISR is armed.
    pub fn seed_phase_a(&self, level: bool) {
        self.last_a.store(level, Ordering::Relaxed);
    }

    // ── Pulse counter ─────────────────────────────────────────

    pub fn pulses(&self) -> i32 {
        self.pulses.load(Ordering::Relaxed)
    }

    pub fn abs_pulses(&self) -> i32 {
        self.pulses().abs()
    }

    /// Start a new leg.
    pub fn reset_pulses(&self) {
        self.pulses.store(0, Ordering::Relaxed);
    }

    // ── Direction ─────────────────────────────────────────────

    pub fn direction(&self) -> Direction {
        Direction::from_u8(self.direction.load(Ordering::Relaxed))
    }

    pub fn set_direction(&self, dir: Direction) {
        self.direction.store(dir as u8, Ordering::Relaxed);
    }

    // ── Calibration constants ─────────────────────────────────

    pub fn gpp(&self, dir: Direction) -> f32 {
        let bits = match dir {
            Direction::Forward => self.gpp_forward_bits.load(Ordering::Relaxed),
            Direction::Backward => self.gpp_backward_bits.load(Ordering::Relaxed),
        };
        f32::from_bits(bits)
    }

    /// Store a calibrated degrees-per-pulse, clamped to the sanity band
    /// so a glitched calibration cycle cannot poison the odometry.
    pub fn set_gpp(&self, dir: Direction, value: f32) {
        let bits = value.clamp(MIN_GPP, MAX_GPP).to_bits();
        match dir {
            Direction::Forward => self.gpp_forward_bits.store(bits, Ordering::Relaxed),
            Direction::Backward => self.gpp_backward_bits.store(bits, Ordering::Relaxed),
        }
    }

    pub fn avg_gpp(&self) -> f32 {
        let avg = (self.gpp(Direction::Forward) + self.gpp(Direction::Backward)) / 2.0;
        if avg > 0.0 { avg } else { DEFAULT_GPP }
    }

    // ── Derived quantities ────────────────────────────────────

    /// Degrees travelled in the current leg.
    pub fn degrees_travelled(&self) -> f32 {
        self.abs_pulses() as f32 * self.gpp(self.direction())
    }

    /// Convert an angular distance to a pulse target for the given
    /// travel direction.  Never returns less than one pulse.
    pub fn degrees_to_pulses(&self, degrees: f32, dir: Direction) -> i32 {
        let degrees = degrees.max(0.0);
        let mut gpp = self.gpp(dir);
        if gpp <= 0.0 {
            gpp = DEFAULT_GPP;
        }
        ((degrees / gpp) as i32).max(1)
    }

    /// Diagnostic cumulative angle since the last zeroing.
    pub fn reference_angle(&self) -> f32 {
        f32::from_bits(self.reference_deg_bits.load(Ordering::Relaxed))
    }

    /// Clean slate: zero pulses and reference angle, direction FORWARD.
    /// Used after calibration and on session reset.
    pub fn zero(&self) {
        self.pulses.store(0, Ordering::Relaxed);
        self.reference_deg_bits.store(0, Ordering::Relaxed);
        self.direction.store(Direction::Forward as u8, Ordering::Relaxed);
    }

    /// Reset the calibration constants to their factory defaults.
    pub fn reset_gpp(&self) {
        self.gpp_forward_bits
            .store(DEFAULT_GPP.to_bits(), Ordering::Relaxed);
        self.gpp_backward_bits
            .store(DEFAULT_GPP.to_bits(), Ordering::Relaxed);
    }
}

impl Default for MotionState {
    fn default() -> Self {
        Self::new()
    }
}
