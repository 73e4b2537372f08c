//! Integration test entry point.
//!
//! Everything runs on the host against the simulated rig; no ESP-IDF
//! toolchain required.

#![cfg(not(target_os = "espidf"))]


mod motion_tests;
mod protocol_tests;
