//! Adapters binding the port traits to real peripherals and transports.

pub mod hardware;
pub mod serial;
