//! Motion control: shared odometry, Hall homing, calibration, and the
//! four-mode profile engine.  Dependency order runs leaves-first —
//! `state` → `homing` → `calibration` → `profile` — with `encoder`
//! supplying the ISR glue for the one shared [`MotionState`].

pub mod calibration;
pub mod encoder;
pub mod homing;
pub mod profile;
pub mod state;

pub use state::{Direction, MotionState};
