//! Hardware-independent driver core for envbus
//!
//! This crate contains the platform-agnostic logic for an array of I2C
//! environmental sensors and MCP23017 GPIO expanders: the sensor registry,
//! the per-chip register sequences and transfer functions, detection
//! bookkeeping, calibration, report formatting and the expander pin state
//! machine.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests). The
//! I2C transport and delays come from `embedded-hal` traits; bus selection
//! comes from [`bus::MultiBus`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod error;
pub mod expander;
pub mod registry;
pub mod report;
pub mod sensors;
pub mod shared_bus;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use error::Error;
