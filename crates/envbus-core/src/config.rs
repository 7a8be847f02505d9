//! Persistent sensor configuration
//!
//! Holds the feature flags that change how chips are programmed and the
//! per-(bus, sensor) calibration table. The registry only needs read access
//! through [`ConfigStore`]. [`SensorConfig`] is the bundled implementation,
//! persisted as a postcard blob.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::sensors::SensorId;

/// Maximum number of calibration entries kept by [`SensorConfig`].
pub const MAX_CALIBRATIONS: usize = 16;

/// Boolean feature flags.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    /// TSL2550/TSL2560: standard range / 16x gain instead of extended range / 1x.
    pub tsl_high_sensitivity: bool,
    /// BH1750: long measurement window (0.11 lx per count instead of 0.93).
    pub bh_high_sensitivity: bool,
}

/// Names a single flag in [`Flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    TslHighSensitivity,
    BhHighSensitivity,
}

impl Flag {
    pub const ALL: [Flag; 2] = [Flag::TslHighSensitivity, Flag::BhHighSensitivity];

    /// Short name used on configuration interfaces
    pub const fn name(self) -> &'static str {
        match self {
            Self::TslHighSensitivity => "tsl-high-sens",
            Self::BhHighSensitivity => "bh-high-sens",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.name() == name)
    }
}

impl Flags {
    pub const fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::TslHighSensitivity => self.tsl_high_sensitivity,
            Flag::BhHighSensitivity => self.bh_high_sensitivity,
        }
    }

    pub fn set(&mut self, flag: Flag, on: bool) {
        match flag {
            Flag::TslHighSensitivity => self.tsl_high_sensitivity = on,
            Flag::BhHighSensitivity => self.bh_high_sensitivity = on,
        }
    }
}

/// Linear correction applied after the chip's transfer function.
///
/// Both values are in thousandths: a factor of 1000 and an offset of 0 leave
/// the value unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub factor: i32,
    pub offset: i32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            factor: 1000,
            offset: 0,
        }
    }
}

impl Calibration {
    pub const fn new(factor: i32, offset: i32) -> Self {
        Self { factor, offset }
    }

    pub fn apply(&self, cooked: f64) -> f64 {
        cooked * f64::from(self.factor) / 1000.0 + f64::from(self.offset) / 1000.0
    }

    pub fn factor(&self) -> f64 {
        f64::from(self.factor) / 1000.0
    }

    pub fn offset(&self) -> f64 {
        f64::from(self.offset) / 1000.0
    }
}

/// Read access to configuration, as needed by the registry.
pub trait ConfigStore {
    fn flags(&self) -> Flags;

    /// Calibration for a (bus, sensor) pair, the identity when none is stored.
    fn calibration(&self, bus: u8, sensor: SensorId) -> Calibration;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationEntry {
    pub bus: u8,
    pub sensor: SensorId,
    pub calibration: Calibration,
}

/// Flags plus a bounded calibration table.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub flags: Flags,
    calibrations: heapless::Vec<CalibrationEntry, MAX_CALIBRATIONS>,
}

impl SensorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: Flags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        self.flags.set(flag, on);
    }

    /// Store or replace the calibration of a (bus, sensor) pair.
    pub fn set_calibration(
        &mut self,
        bus: u8,
        sensor: SensorId,
        calibration: Calibration,
    ) -> Result<(), Error> {
        if let Some(entry) = self
            .calibrations
            .iter_mut()
            .find(|e| e.bus == bus && e.sensor == sensor)
        {
            entry.calibration = calibration;
            return Ok(());
        }

        self.calibrations
            .push(CalibrationEntry {
                bus,
                sensor,
                calibration,
            })
            .map_err(|_| Error::StoreFull)
    }

    /// Drop a stored calibration. Returns whether one was present.
    pub fn clear_calibration(&mut self, bus: u8, sensor: SensorId) -> bool {
        let before = self.calibrations.len();
        self.calibrations
            .retain(|e| !(e.bus == bus && e.sensor == sensor));
        self.calibrations.len() != before
    }

    pub fn calibrations(&self) -> &[CalibrationEntry] {
        &self.calibrations
    }

    /// Serialize for persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl ConfigStore for SensorConfig {
    fn flags(&self) -> Flags {
        self.flags
    }

    fn calibration(&self, bus: u8, sensor: SensorId) -> Calibration {
        self.calibrations
            .iter()
            .find(|e| e.bus == bus && e.sensor == sensor)
            .map(|e| e.calibration)
            .unwrap_or_default()
    }
}
