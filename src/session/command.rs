//! Host command-line classification.
//!
//! One line, one command, case-insensitive.  Anything that classifies as
//! `None` is handed to the payload parser — the host activates a mode by
//! sending a dict-shaped line instead of a keyword.

/// A recognised single-line command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `0` — link handshake.
    Handshake,
    Run,
    /// `PAUSE` or the Spanish alias `PAUSA`.
    Pause,
    Stop,
    /// `END` — full session reset, de-arms the handshake.
    End,
    /// `CALIBRACION` — run calibration + homing now.
    Calibrate,
    /// `HOME` — homing only.
    Home,
    /// `ENDPOS` — park on the far sensor.
    EndPos,
    /// `GOTO <angle>` or `GOTO:<angle>` — point move from home.
    Goto(f32),
}

pub fn classify(line: &str) -> Option<Command> {
    let t = line.trim();
    if t.is_empty() {
        return None;
    }
    let upper = t.to_ascii_uppercase();
    match upper.as_str() {
        "0" => Some(Command::Handshake),
        "RUN" => Some(Command::Run),
        "PAUSE" | "PAUSA" => Some(Command::Pause),
        "STOP" => Some(Command::Stop),
        "END" => Some(Command::End),
        "CALIBRACION" => Some(Command::Calibrate),
        "HOME" => Some(Command::Home),
        "ENDPOS" => Some(Command::EndPos),
        _ => {
            let rest = upper.strip_prefix("GOTO")?;
            let rest = rest.trim().trim_start_matches(':').trim();
            rest.parse::<f32>()
                .ok()
                .filter(|a| a.is_finite())
                .map(Command::Goto)
        }
    }
}
