//! ESP32-S3 firmware-specific modules for the loam logger
//!
//! This crate contains the code that cannot compile on desktop targets:
//! ESP32 peripheral initialization, the bit-banged 1-Wire line, the WiFi,
//! MQTT and SNTP adapters, and the embassy tasks pinned to this board's
//! concrete drivers.

#![no_std]

extern crate alloc;

pub mod config;
pub mod hardware;
pub mod net;
pub mod onewire;
pub mod tasks;
