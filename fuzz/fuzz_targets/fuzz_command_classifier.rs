//! Fuzz target: host command classification.
//!
//! The classifier fronts every byte the host sends; it must never panic
//! and a classified GOTO must carry a finite angle.
//!
//! cargo fuzz run fuzz_command_classifier

#![no_main]

use libfuzzer_sys::fuzz_target;

use flexrig::session::command::{Command, classify};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };
    if let Some(Command::Goto(angle)) = classify(line) {
        assert!(angle.is_finite());
    }
});
