//! Hardware-independent core library for the loam soil logger
//!
//! This crate contains all platform-agnostic logic of the logger: the
//! acquisition, aggregation, storage and upload stages, the time-sync loop,
//! the shared status record, and the capability traits that concrete drivers
//! implement on the firmware side.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod config;
pub mod network;
pub mod pipeline;
pub mod queue;
pub mod records;
pub mod sensors;
pub mod stats;
pub mod storage;
pub mod time_sync;
