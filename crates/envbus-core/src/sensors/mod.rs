//! Sensor table, detection bookkeeping and per-chip decoders
//!
//! Each supported chip lives in its own module and exposes an `init` / `read`
//! pair operating on a [`Context`]. The static [`DESCRIPTORS`] table maps
//! every [`SensorId`] to its bus address, display metadata and decoder
//! [`Channel`]. [`Decoders`] dispatches a channel to its chip module and owns
//! the calibration constants the pressure chips read once at init.

mod am2321;
mod bh1750;
mod bme280;
mod bmp085;
pub mod crc;
mod digipicco;
mod ds1631;
mod htu21;
mod lm75;
mod max44009;
mod si114x;
mod tsl2550;
mod tsl2560;
mod veml6070;
mod veml6075;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};

use crate::bus::{Device, MAX_BUSES};
use crate::config::Flags;
use crate::error::Error;

/// Number of entries in the sensor table.
pub const SENSOR_COUNT: usize = 27;

/// Identifies one sensor channel. The discriminant is the table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorId {
    DigipiccoTemperature = 0,
    DigipiccoHumidity,
    Lm75_0,
    Lm75_1,
    Lm75_2,
    Lm75_3,
    Ds1631_6,
    Lm75_7,
    Bmp085Temperature,
    Bmp085Pressure,
    Tsl2560_0,
    Tsl2550,
    Bh1750,
    Htu21Temperature,
    Htu21Humidity,
    Am2321Temperature,
    Am2321Humidity,
    Veml6070,
    Si114xVisibleLight,
    Si114xInfrared,
    Si114xUltraviolet,
    Bme280Temperature,
    Bme280Humidity,
    Bme280Pressure,
    Tsl2560_1,
    Max44009_0,
    Veml6075,
}

impl SensorId {
    pub const ALL: [SensorId; SENSOR_COUNT] = [
        Self::DigipiccoTemperature,
        Self::DigipiccoHumidity,
        Self::Lm75_0,
        Self::Lm75_1,
        Self::Lm75_2,
        Self::Lm75_3,
        Self::Ds1631_6,
        Self::Lm75_7,
        Self::Bmp085Temperature,
        Self::Bmp085Pressure,
        Self::Tsl2560_0,
        Self::Tsl2550,
        Self::Bh1750,
        Self::Htu21Temperature,
        Self::Htu21Humidity,
        Self::Am2321Temperature,
        Self::Am2321Humidity,
        Self::Veml6070,
        Self::Si114xVisibleLight,
        Self::Si114xInfrared,
        Self::Si114xUltraviolet,
        Self::Bme280Temperature,
        Self::Bme280Humidity,
        Self::Bme280Pressure,
        Self::Tsl2560_1,
        Self::Max44009_0,
        Self::Veml6075,
    ];

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn descriptor(self) -> &'static SensorDescriptor {
        &DESCRIPTORS[self as usize]
    }
}

/// What a sensor channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Temperature,
    Humidity,
    Pressure,
    Light,
    VisibleLight,
    InfraredLight,
    UltravioletLight,
    UvLight,
}

impl Measurement {
    /// Get the display label for this measurement
    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Light => "light",
            Self::VisibleLight => "visible light",
            Self::InfraredLight => "infrared light",
            Self::UltravioletLight => "ultraviolet light",
            Self::UvLight => "uv light",
        }
    }
}

/// Selects the decoder routine of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    DigipiccoTemperature,
    DigipiccoHumidity,
    Lm75,
    Ds1631,
    Bmp085Temperature,
    Bmp085Pressure,
    Tsl2560,
    Tsl2550,
    Bh1750,
    Htu21Temperature,
    Htu21Humidity,
    Am2321Temperature,
    Am2321Humidity,
    Veml6070,
    Si114xVisibleLight,
    Si114xInfrared,
    Si114xUltraviolet,
    Bme280Temperature,
    Bme280Humidity,
    Bme280Pressure,
    Max44009,
    Veml6075,
}

/// Build-time description of one sensor channel.
#[derive(Debug)]
pub struct SensorDescriptor {
    pub id: SensorId,
    pub address: u8,
    pub name: &'static str,
    pub measurement: Measurement,
    pub unit: &'static str,
    /// Decimal places used when displaying the cooked value.
    pub precision: usize,
    pub channel: Channel,
    /// Sibling channel that must be detected first. Derived channels never
    /// touch the hardware during init.
    pub depends_on: Option<SensorId>,
}

impl SensorDescriptor {
    const fn new(
        id: SensorId,
        address: u8,
        name: &'static str,
        measurement: Measurement,
        unit: &'static str,
        precision: usize,
        channel: Channel,
    ) -> Self {
        Self {
            id,
            address,
            name,
            measurement,
            unit,
            precision,
            channel,
            depends_on: None,
        }
    }

    const fn derived_from(mut self, parent: SensorId) -> Self {
        self.depends_on = Some(parent);
        self
    }
}

use Measurement as M;

/// The sensor table, indexed by [`SensorId`].
#[rustfmt::skip]
pub static DESCRIPTORS: [SensorDescriptor; SENSOR_COUNT] = [
    SensorDescriptor::new(SensorId::DigipiccoTemperature, 0x78, "digipicco", M::Temperature, "C", 2, Channel::DigipiccoTemperature),
    SensorDescriptor::new(SensorId::DigipiccoHumidity, 0x78, "digipicco", M::Humidity, "%", 0, Channel::DigipiccoHumidity)
        .derived_from(SensorId::DigipiccoTemperature),
    SensorDescriptor::new(SensorId::Lm75_0, 0x48, "lm75 compatible #0", M::Temperature, "C", 2, Channel::Lm75),
    SensorDescriptor::new(SensorId::Lm75_1, 0x49, "lm75 compatible #1", M::Temperature, "C", 2, Channel::Lm75),
    SensorDescriptor::new(SensorId::Lm75_2, 0x4a, "lm75 compatible #2", M::Temperature, "C", 2, Channel::Lm75),
    SensorDescriptor::new(SensorId::Lm75_3, 0x4b, "lm75 compatible #3", M::Temperature, "C", 2, Channel::Lm75),
    SensorDescriptor::new(SensorId::Ds1631_6, 0x4e, "ds1621/ds1631/ds1731", M::Temperature, "C", 2, Channel::Ds1631),
    SensorDescriptor::new(SensorId::Lm75_7, 0x4f, "lm75 compatible #7", M::Temperature, "C", 2, Channel::Lm75),
    SensorDescriptor::new(SensorId::Bmp085Temperature, 0x77, "bmp085/bmp180", M::Temperature, "C", 2, Channel::Bmp085Temperature),
    SensorDescriptor::new(SensorId::Bmp085Pressure, 0x77, "bmp085/bmp180", M::Pressure, "hPa", 2, Channel::Bmp085Pressure)
        .derived_from(SensorId::Bmp085Temperature),
    SensorDescriptor::new(SensorId::Tsl2560_0, 0x39, "tsl2560/tsl2561 #0", M::VisibleLight, "", 2, Channel::Tsl2560),
    SensorDescriptor::new(SensorId::Tsl2550, 0x39, "tsl2550", M::VisibleLight, "", 2, Channel::Tsl2550),
    SensorDescriptor::new(SensorId::Bh1750, 0x23, "bh1750", M::Light, "", 2, Channel::Bh1750),
    SensorDescriptor::new(SensorId::Htu21Temperature, 0x40, "htu21", M::Temperature, "C", 2, Channel::Htu21Temperature),
    SensorDescriptor::new(SensorId::Htu21Humidity, 0x40, "htu21", M::Humidity, "%", 0, Channel::Htu21Humidity)
        .derived_from(SensorId::Htu21Temperature),
    SensorDescriptor::new(SensorId::Am2321Temperature, 0x5c, "am2321", M::Temperature, "C", 2, Channel::Am2321Temperature),
    SensorDescriptor::new(SensorId::Am2321Humidity, 0x5c, "am2321", M::Humidity, "%", 0, Channel::Am2321Humidity)
        .derived_from(SensorId::Am2321Temperature),
    SensorDescriptor::new(SensorId::Veml6070, 0x38, "veml6070", M::UltravioletLight, "", 1, Channel::Veml6070),
    SensorDescriptor::new(SensorId::Si114xVisibleLight, 0x60, "si114x", M::VisibleLight, "", 1, Channel::Si114xVisibleLight),
    SensorDescriptor::new(SensorId::Si114xInfrared, 0x60, "si114x", M::InfraredLight, "", 1, Channel::Si114xInfrared)
        .derived_from(SensorId::Si114xVisibleLight),
    SensorDescriptor::new(SensorId::Si114xUltraviolet, 0x60, "si114x", M::UltravioletLight, "", 1, Channel::Si114xUltraviolet)
        .derived_from(SensorId::Si114xVisibleLight),
    SensorDescriptor::new(SensorId::Bme280Temperature, 0x76, "bmp280/bme280", M::Temperature, "C", 2, Channel::Bme280Temperature),
    SensorDescriptor::new(SensorId::Bme280Humidity, 0x76, "bmp280/bme280", M::Humidity, "%", 1, Channel::Bme280Humidity)
        .derived_from(SensorId::Bme280Temperature),
    SensorDescriptor::new(SensorId::Bme280Pressure, 0x76, "bmp280/bme280", M::Pressure, "hPa", 2, Channel::Bme280Pressure)
        .derived_from(SensorId::Bme280Temperature),
    SensorDescriptor::new(SensorId::Tsl2560_1, 0x29, "tsl2560/tsl2561 #1", M::VisibleLight, "", 2, Channel::Tsl2560),
    SensorDescriptor::new(SensorId::Max44009_0, 0x4a, "max44009 #0", M::VisibleLight, "", 2, Channel::Max44009),
    SensorDescriptor::new(SensorId::Veml6075, 0x10, "veml6075", M::UvLight, "", 2, Channel::Veml6075),
];

/// One decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Value {
    pub raw: f64,
    /// Physical value after the chip's transfer function.
    pub cooked: f64,
}

impl Value {
    pub const fn new(raw: f64, cooked: f64) -> Self {
        Self { raw, cooked }
    }
}

/// One bit per (bus, sensor) pair recording whether init last succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionState {
    buses: [u8; SENSOR_COUNT],
}

impl DetectionState {
    pub const fn new() -> Self {
        Self {
            buses: [0; SENSOR_COUNT],
        }
    }

    pub fn is_detected(&self, bus: u8, sensor: SensorId) -> bool {
        bus < MAX_BUSES && self.buses[sensor as usize] & (1 << bus) != 0
    }

    /// Whether the sensor was detected on any bus.
    pub fn on_any_bus(&self, sensor: SensorId) -> bool {
        self.buses[sensor as usize] != 0
    }

    pub fn set(&mut self, bus: u8, sensor: SensorId, detected: bool) {
        if bus >= MAX_BUSES {
            return;
        }

        if detected {
            self.buses[sensor as usize] |= 1 << bus;
        } else {
            self.buses[sensor as usize] &= !(1 << bus);
        }
    }

    pub fn clear(&mut self) {
        self.buses = [0; SENSOR_COUNT];
    }
}

/// Everything a decoder needs for one init or read call.
pub struct Context<'a, I, D> {
    pub device: Device<'a, I>,
    pub delay: &'a mut D,
    pub bus: u8,
    pub detection: &'a DetectionState,
    pub flags: Flags,
}

impl<I, D> Context<'_, I, D> {
    /// Whether `sensor` is detected on the bus this call runs on.
    pub fn detected(&self, sensor: SensorId) -> bool {
        self.detection.is_detected(self.bus, sensor)
    }
}

/// Decoder dispatch plus the chip state that outlives a single call.
///
/// The BMP085 and BME280 read their calibration constants once at init and
/// reuse them in every compensation. They are cached per bus.
#[derive(Debug, Default)]
pub struct Decoders {
    bmp085: [Option<bmp085::Calibration>; MAX_BUSES as usize],
    bme280: [Option<bme280::Calibration>; MAX_BUSES as usize],
}

impl Decoders {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(bus: u8) -> Result<usize, Error> {
        if bus < MAX_BUSES {
            Ok(usize::from(bus))
        } else {
            Err(Error::InvalidBus(bus))
        }
    }

    /// Run the init routine of a non-derived channel.
    pub fn init<I: I2c, D: DelayNs>(
        &mut self,
        channel: Channel,
        ctx: &mut Context<'_, I, D>,
    ) -> Result<(), Error> {
        let slot = Self::slot(ctx.bus)?;

        match channel {
            Channel::DigipiccoTemperature => digipicco::init(ctx),
            Channel::Lm75 => lm75::init(ctx),
            Channel::Ds1631 => ds1631::init(ctx),
            Channel::Bmp085Temperature => {
                self.bmp085[slot] = None;
                let calibration = bmp085::init(ctx)?;
                self.bmp085[slot] = Some(calibration);
                Ok(())
            }
            Channel::Tsl2560 => tsl2560::init(ctx),
            Channel::Tsl2550 => tsl2550::init(ctx),
            Channel::Bh1750 => bh1750::init(ctx),
            Channel::Htu21Temperature => htu21::init(ctx),
            Channel::Am2321Temperature => am2321::init(ctx),
            Channel::Veml6070 => veml6070::init(ctx),
            Channel::Si114xVisibleLight => si114x::init(ctx),
            Channel::Bme280Temperature => {
                self.bme280[slot] = None;
                let calibration = bme280::init(ctx)?;
                self.bme280[slot] = Some(calibration);
                Ok(())
            }
            Channel::Max44009 => max44009::init(ctx),
            Channel::Veml6075 => veml6075::init(ctx),
            // Derived channels are gated by the registry and have no init routine
            Channel::DigipiccoHumidity
            | Channel::Bmp085Pressure
            | Channel::Htu21Humidity
            | Channel::Am2321Humidity
            | Channel::Si114xInfrared
            | Channel::Si114xUltraviolet
            | Channel::Bme280Humidity
            | Channel::Bme280Pressure => Ok(()),
        }
    }

    pub fn read<I: I2c, D: DelayNs>(
        &mut self,
        channel: Channel,
        ctx: &mut Context<'_, I, D>,
    ) -> Result<Value, Error> {
        let slot = Self::slot(ctx.bus)?;

        match channel {
            Channel::DigipiccoTemperature => digipicco::read_temperature(ctx),
            Channel::DigipiccoHumidity => digipicco::read_humidity(ctx),
            Channel::Lm75 => lm75::read(ctx),
            Channel::Ds1631 => ds1631::read(ctx),
            Channel::Bmp085Temperature | Channel::Bmp085Pressure => {
                let calibration = self.bmp085[slot].as_ref().ok_or(Error::AddressNak)?;
                let sample = bmp085::read(ctx, calibration)?;
                Ok(if channel == Channel::Bmp085Temperature {
                    sample.temperature
                } else {
                    sample.pressure
                })
            }
            Channel::Tsl2560 => tsl2560::read(ctx),
            Channel::Tsl2550 => tsl2550::read(ctx),
            Channel::Bh1750 => bh1750::read(ctx),
            Channel::Htu21Temperature => htu21::read_temperature(ctx),
            Channel::Htu21Humidity => htu21::read_humidity(ctx),
            Channel::Am2321Temperature => am2321::read(ctx).map(|s| s.temperature),
            Channel::Am2321Humidity => am2321::read(ctx).map(|s| s.humidity),
            Channel::Veml6070 => veml6070::read(ctx),
            Channel::Si114xVisibleLight => si114x::read_visible(ctx),
            Channel::Si114xInfrared => si114x::read_infrared(ctx),
            Channel::Si114xUltraviolet => si114x::read_ultraviolet(ctx),
            Channel::Bme280Temperature | Channel::Bme280Humidity | Channel::Bme280Pressure => {
                let calibration = self.bme280[slot].as_ref().ok_or(Error::AddressNak)?;
                let sample = bme280::read(ctx, calibration)?;
                Ok(match channel {
                    Channel::Bme280Temperature => sample.temperature,
                    Channel::Bme280Humidity => sample.humidity,
                    _ => sample.pressure,
                })
            }
            Channel::Max44009 => max44009::read(ctx),
            Channel::Veml6075 => veml6075::read(ctx),
        }
    }
}
