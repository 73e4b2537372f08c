//! Serial line transport to the host controller.
//!
//! On ESP-IDF the link is UART0, drained byte-wise and reassembled into
//! newline-framed commands — `poll_line` never blocks, which is what
//! keeps command processing alive between motion ticks.  On host targets
//! a reader thread feeds stdin lines through a channel so the firmware
//! binary can be driven from a terminal during bench bring-up.

use crate::ports::LinkPort;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

pub struct SerialLink {
    #[cfg(target_os = "espidf")]
    rx_buf: String,
    #[cfg(not(target_os = "espidf"))]
    rx: std::sync::mpsc::Receiver<String>,
}

impl SerialLink {
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        Self {
            rx_buf: String::new(),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        use std::io::BufRead;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        Self { rx }
    }
}

impl LinkPort for SerialLink {
    #[cfg(target_os = "espidf")]
    fn poll_line(&mut self) -> Option<String> {
        let mut byte = [0u8; 1];
        while hw_init::uart_read(&mut byte) == 1 {
            match byte[0] {
                b'\n' => return Some(core::mem::take(&mut self.rx_buf)),
                b'\r' => {}
                b => self.rx_buf.push(b as char),
            }
        }
        None
    }

    #[cfg(not(target_os = "espidf"))]
    fn poll_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    #[cfg(target_os = "espidf")]
    fn send_line(&mut self, line: &str) {
        hw_init::uart_write(line.as_bytes());
        hw_init::uart_write(b"\n");
    }

    #[cfg(not(target_os = "espidf"))]
    fn send_line(&mut self, line: &str) {
        println!("{}", line);
    }
}
