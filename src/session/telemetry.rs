//! Telemetry frames and their wire rendering.
//!
//! The host matches telemetry fields by the key names *it* used when it
//! submitted the mode configuration (English or Spanish aliases), so the
//! parser captures a label pair at activation time and the control path
//! carries only canonical values — strings appear again only here, at
//! presentation time.

/// Labels chosen at activation from the host's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLabels {
    pub velocity: &'static str,
    pub angle: &'static str,
}

impl Default for FieldLabels {
    fn default() -> Self {
        Self {
            velocity: "velocity",
            angle: "angle",
        }
    }
}

/// The most recent (mode, velocity, angle) triple, produced by the
/// profile engine on every tick and emitted by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub mode: u8,
    pub velocity: f32,
    pub angle: f32,
    pub labels: FieldLabels,
}

impl TelemetryFrame {
    /// Render the list-like line the host parses, e.g.
    /// `['modo', 1, 'velocity', 7, 'angle', 23.46]`.
    pub fn render(&self) -> String {
        format!(
            "['modo', {}, '{}', {}, '{}', {}]",
            self.mode,
            self.labels.velocity,
            fmt_num(self.velocity),
            self.labels.angle,
            fmt_num(self.angle),
        )
    }
}

/// Integers render bare, everything else with two decimals.
fn fmt_num(v: f32) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("{}", v.round() as i64)
    } else {
        format!("{:.2}", v)
    }
}
