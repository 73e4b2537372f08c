//! Mode-activation payload parsing.
//!
//! The host sends a single dict-shaped line, e.g.
//! `{"modo":1,"velocity":7,"angle":45}`, with either English or Spanish
//! key aliases and either JSON or single-quoted Python-repr quoting.
//! `serde_json` gets the first try on a quote-normalised copy; a
//! permissive hand-rolled splitter covers the rest.  Missing keys fall
//! back to the documented defaults, and every value is range-clamped on
//! the way in.

use serde_json::{Map, Value};

use crate::config::RigConfig;
use crate::error::ProtocolError;
use crate::motion::profile::ModeConfig;
use crate::session::telemetry::FieldLabels;

/// A successfully parsed activation: the mode parameters plus the label
/// pair echoed back in telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeActivation {
    pub config: ModeConfig,
    pub labels: FieldLabels,
}

pub fn parse_activation(
    line: &str,
    separation_deg: f32,
    cfg: &RigConfig,
) -> Result<ModeActivation, ProtocolError> {
    let map = parse_dict(line)?;
    let mode = extract_mode(&map)?;
    Ok(build(mode, &map, separation_deg, cfg))
}

// ---------------------------------------------------------------------------
// Dict parsing
// ---------------------------------------------------------------------------

fn parse_dict(line: &str) -> Result<Map<String, Value>, ProtocolError> {
    let norm = line.trim().replace('\'', "\"");
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&norm) {
        return Ok(map);
    }
    manual_parse(&norm)
}

/// Fallback for lines serde rejects (unquoted keys, stray spacing).
fn manual_parse(s: &str) -> Result<Map<String, Value>, ProtocolError> {
    let inner = s
        .trim()
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .ok_or(ProtocolError::BadPayload)?;

    let mut map = Map::new();
    for part in inner.split(',') {
        let Some((k, v)) = part.split_once(':') else {
            continue;
        };
        let k = k.trim().trim_matches('"').to_string();
        let v = v.trim().trim_matches('"');
        let value = if let Ok(n) = v.parse::<i64>() {
            Value::from(n)
        } else if let Ok(f) = v.parse::<f64>() {
            Value::from(f)
        } else {
            Value::from(v)
        };
        map.insert(k, value);
    }
    Ok(map)
}

// ---------------------------------------------------------------------------
// Mode extraction
// ---------------------------------------------------------------------------

fn extract_mode(map: &Map<String, Value>) -> Result<u8, ProtocolError> {
    let raw = map
        .get("modo")
        .or_else(|| map.get("mode"))
        .ok_or(ProtocolError::MissingMode)?;

    let n: i64 = match raw {
        Value::Number(num) => num
            .as_i64()
            .or_else(|| num.as_f64().map(|f| f as i64))
            .ok_or(ProtocolError::ModeNotNumeric)?,
        // "Mode 1" and friends: take the first digit run.
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().map_err(|_| ProtocolError::ModeNotNumeric)?
        }
        _ => return Err(ProtocolError::ModeNotNumeric),
    };

    if (1..=4).contains(&n) {
        Ok(n as u8)
    } else {
        Err(ProtocolError::UnsupportedMode)
    }
}

// ---------------------------------------------------------------------------
// Per-mode parameter banks
// ---------------------------------------------------------------------------

fn build(mode: u8, map: &Map<String, Value>, separation_deg: f32, cfg: &RigConfig) -> ModeActivation {
    let (mut config, labels) = match mode {
        1 => {
            let (v, kv) = val_and_key(map, &["velocity", "velocidad"], cfg.cycle_rpm, "velocity");
            let (a, ka) = val_and_key(map, &["angle", "angulo"], 90.0, "angle");
            (
                ModeConfig::Fixed { angle: a, speed: v },
                FieldLabels {
                    velocity: kv,
                    angle: ka,
                },
            )
        }
        2 => {
            let (ia, _) = val_and_key(map, &["init_angle", "angulo_inicial"], 0.0, "init_angle");
            let (fa, _) = val_and_key(map, &["final_angle", "angulo_final"], 90.0, "final_angle");
            let (sa, _) = val_and_key(map, &["step_angle"], 1.0, "step_angle");
            let (v, kv) = val_and_key(map, &["velocity", "velocidad"], cfg.cycle_rpm, "velocity");
            (
                ModeConfig::AngleLadder {
                    init_angle: ia,
                    final_angle: fa,
                    step_angle: sa,
                    speed: v,
                },
                FieldLabels {
                    velocity: kv,
                    angle: "angle",
                },
            )
        }
        3 => {
            let (a, ka) = val_and_key(map, &["angle", "angulo"], 1.0, "angle");
            let (iv, _) = val_and_key(map, &["init_vel", "velocidad_inicial"], 7.0, "init_vel");
            let (fv, _) = val_and_key(map, &["final_vel", "velocidad_final"], 30.0, "final_vel");
            let (sv, _) = val_and_key(map, &["step_vel"], 1.0, "step_vel");
            (
                ModeConfig::SpeedRamp {
                    angle: a,
                    init_vel: iv,
                    final_vel: fv,
                    step_vel: sv,
                },
                FieldLabels {
                    velocity: "velocidad",
                    angle: ka,
                },
            )
        }
        _ => {
            let (ia, _) = val_and_key(map, &["init_angle", "angulo_inicial"], 0.0, "init_angle");
            let (fa, _) = val_and_key(map, &["final_angle", "angulo_final"], 90.0, "final_angle");
            let (sa, _) = val_and_key(map, &["step_angle"], 1.0, "step_angle");
            let (iv, _) = val_and_key(map, &["init_vel", "velocidad_inicial"], 7.0, "init_vel");
            let (fv, _) = val_and_key(map, &["final_vel", "velocidad_final"], 30.0, "final_vel");
            let (sv, _) = val_and_key(map, &["step_vel"], 1.0, "step_vel");
            (
                ModeConfig::Both {
                    init_angle: ia,
                    final_angle: fa,
                    step_angle: sa,
                    init_vel: iv,
                    final_vel: fv,
                    step_vel: sv,
                },
                FieldLabels {
                    velocity: "velocidad",
                    angle: "angle",
                },
            )
        }
    };

    config.clamp(separation_deg, cfg.rpm_max);
    ModeActivation { config, labels }
}

/// First matching alias wins; a present-but-unparseable value falls
/// through to the next alias, then to the default.
fn val_and_key(
    map: &Map<String, Value>,
    aliases: &[&'static str],
    default: f32,
    default_key: &'static str,
) -> (f32, &'static str) {
    for key in aliases {
        if let Some(v) = map.get(*key) {
            if let Some(n) = value_as_f32(v) {
                return (n, key);
            }
        }
    }
    (default, default_key)
}

fn value_as_f32(v: &Value) -> Option<f32> {
    match v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
