//! Sensor registry
//!
//! Owns the transport, the delay source, the detection bitmap and the
//! decoder state. Every operation selects the target bus first and always
//! hands the transport back on bus 0, whatever the outcome.

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::bus::{Device, MAX_BUSES, MultiBus};
use crate::config::{Calibration, ConfigStore};
use crate::error::Error;
use crate::sensors::{Context, Decoders, DetectionState, SensorDescriptor, SensorId, Value};

/// A decoded and calibrated sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: Value,
    pub calibration: Calibration,
    /// `value.cooked` after the calibration transform.
    pub calibrated: f64,
}

/// Detection and readout of all table sensors on all buses.
pub struct SensorRegistry<I, D> {
    i2c: I,
    delay: D,
    detection: DetectionState,
    decoders: Decoders,
}

impl<I: MultiBus, D: DelayNs> SensorRegistry<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            i2c,
            delay,
            detection: DetectionState::new(),
            decoders: Decoders::new(),
        }
    }

    /// Number of buses that can be addressed.
    pub fn bus_count(&self) -> u8 {
        self.i2c.bus_count().min(MAX_BUSES)
    }

    /// Detect and configure one sensor on one bus.
    ///
    /// Derived channels never touch the bus. They succeed exactly when their
    /// parent channel is detected on the same bus.
    pub fn init<C: ConfigStore>(
        &mut self,
        bus: u8,
        sensor: SensorId,
        config: &C,
    ) -> Result<(), Error> {
        let descriptor = sensor.descriptor();

        if let Err(e) = self.select(bus) {
            self.detection.set(bus, sensor, false);
            return Err(e);
        }

        let result = match descriptor.depends_on {
            Some(parent) => {
                if self.detection.is_detected(bus, parent) {
                    Ok(())
                } else {
                    Err(Error::AddressNak)
                }
            }
            None => {
                let mut ctx = Context {
                    device: Device::new(&mut self.i2c, descriptor.address),
                    delay: &mut self.delay,
                    bus,
                    detection: &self.detection,
                    flags: config.flags(),
                };
                self.decoders.init(descriptor.channel, &mut ctx)
            }
        };

        self.detection.set(bus, sensor, result.is_ok());
        self.restore();

        match result {
            Ok(()) => info!(
                "Detected {} ({}) on bus {} at {:#04x}",
                descriptor.name,
                descriptor.measurement.label(),
                bus,
                descriptor.address
            ),
            Err(e) => debug!(
                "No {} ({}) on bus {}: {}",
                descriptor.name,
                descriptor.measurement.label(),
                bus,
                e
            ),
        }

        result
    }

    /// Detect every sensor on every bus.
    ///
    /// Buses after bus 0 skip the sensors already detected on bus 0, which
    /// would otherwise be seen again through a transparent multiplexer.
    /// Returns the number of (bus, sensor) pairs detected.
    pub fn init_all<C: ConfigStore>(&mut self, config: &C) -> usize {
        let mut detected = 0;

        for bus in 0..self.bus_count() {
            for sensor in SensorId::ALL {
                if bus > 0 && self.detection.is_detected(0, sensor) {
                    continue;
                }

                if self.init(bus, sensor, config).is_ok() {
                    detected += 1;
                }
            }
        }

        info!("Sensor sweep complete, {} detected", detected);
        detected
    }

    /// Read one sensor and apply its calibration.
    pub fn read<C: ConfigStore>(
        &mut self,
        bus: u8,
        sensor: SensorId,
        config: &C,
    ) -> Result<Reading, Error> {
        self.select(bus)?;
        self.decode(bus, sensor, config)
    }

    /// Route the transport to `bus`. On failure bus 0 is restored.
    pub(crate) fn select(&mut self, bus: u8) -> Result<(), Error> {
        if bus >= self.bus_count() {
            return Err(Error::InvalidBus(bus));
        }

        self.i2c.select_bus(bus).map_err(|e| {
            let e = Error::from_bus(e);
            warn!("Failed to select bus {}: {}", bus, e);
            self.restore();
            e
        })
    }

    /// Read from the currently selected bus, then restore bus 0.
    pub(crate) fn decode<C: ConfigStore>(
        &mut self,
        bus: u8,
        sensor: SensorId,
        config: &C,
    ) -> Result<Reading, Error> {
        let descriptor = sensor.descriptor();
        let result = self.read_value(bus, descriptor, config);
        self.restore();

        let value = result.map_err(|e| {
            warn!("Failed to read {} on bus {}: {}", descriptor.name, bus, e);
            e
        })?;

        let calibration = config.calibration(bus, sensor);

        Ok(Reading {
            value,
            calibration,
            calibrated: calibration.apply(value.cooked),
        })
    }

    fn read_value<C: ConfigStore>(
        &mut self,
        bus: u8,
        descriptor: &SensorDescriptor,
        config: &C,
    ) -> Result<Value, Error> {
        if let Some(parent) = descriptor.depends_on {
            if !self.detection.is_detected(bus, parent) {
                return Err(Error::AddressNak);
            }
        }

        let mut ctx = Context {
            device: Device::new(&mut self.i2c, descriptor.address),
            delay: &mut self.delay,
            bus,
            detection: &self.detection,
            flags: config.flags(),
        };

        self.decoders.read(descriptor.channel, &mut ctx)
    }

    /// Select bus 0 again. Failures are logged only.
    pub(crate) fn restore(&mut self) {
        if let Err(e) = self.i2c.select_bus(0) {
            warn!("Failed to restore bus 0: {}", Error::from_bus(e));
        }
    }

    /// Whether the sensor with table index `index` was detected on `bus`.
    /// Unknown indices and buses are never detected.
    pub fn is_detected(&self, bus: u8, index: u8) -> bool {
        SensorId::from_index(index).is_some_and(|sensor| self.detection.is_detected(bus, sensor))
    }

    pub fn detection(&self) -> &DetectionState {
        &self.detection
    }

    /// Forget every detection result.
    pub fn reset_detection(&mut self) {
        self.detection.clear();
    }

    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::sim::{NoopDelay, SimBus};
    use embedded_hal::i2c::ErrorKind;

    fn attach_lm75(bus: &mut SimBus, number: u8, address: u8) {
        bus.device(number, address)
            .respond(&[0x60])
            .respond(&[0xff, 0x00])
            .respond(&[0x00, 0x00]);
    }

    #[test]
    fn lm75_end_to_end() {
        let mut bus = SimBus::new(1);
        attach_lm75(&mut bus, 0, 0x48);
        bus.device(0, 0x48).respond(&[0x19, 0x00]);

        let mut config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(registry.init(0, SensorId::Lm75_0, &config), Ok(()));
        assert!(registry.is_detected(0, SensorId::Lm75_0.index()));

        config
            .set_calibration(0, SensorId::Lm75_0, Calibration::new(2000, 500))
            .unwrap();
        let reading = registry.read(0, SensorId::Lm75_0, &config).unwrap();

        assert_eq!(reading.value, Value::new(6400.0, 25.0));
        assert!((reading.calibrated - 50.5).abs() < 1e-9);
    }

    #[test]
    fn bmp085_pressure_reuses_cached_calibration() {
        let calibration = [
            0x01, 0x98, 0xff, 0xb8, 0xc7, 0xd1, 0x7f, 0xe5, 0x7f, 0xf5, 0x5a, 0x71, 0x18, 0x2e,
            0x00, 0x04, 0x80, 0x00, 0xdd, 0xf9, 0x0b, 0x34,
        ];
        let mut bus = SimBus::new(1);
        bus.device(0, 0x77)
            .respond(&calibration)
            .respond(&[0x6c, 0xfa])
            .respond(&[0x5d, 0x23, 0x00])
            .respond(&[0x6c, 0xfa])
            .respond(&[0x5d, 0x23, 0x00]);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(registry.init(0, SensorId::Bmp085Temperature, &config), Ok(()));
        let reading = registry.read(0, SensorId::Bmp085Pressure, &config).unwrap();

        assert_eq!(reading.value.raw, 190744.0);
        assert!((reading.value.cooked - 699.64).abs() < 1e-9);

        let (bus, _) = registry.release();
        let calibration_reads = bus
            .writes_to(0x77)
            .into_iter()
            .filter(|w| *w == [0xaa])
            .count();
        assert_eq!(calibration_reads, 1);
    }

    #[test]
    fn failed_init_clears_detection() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x48).fail_with(ErrorKind::Bus);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);
        registry.detection.set(0, SensorId::Lm75_0, true);

        assert_eq!(
            registry.init(0, SensorId::Lm75_0, &config),
            Err(Error::Transport(ErrorKind::Bus))
        );
        assert!(!registry.is_detected(0, SensorId::Lm75_0.index()));
    }

    #[test]
    fn derived_channels_are_gated_without_bus_traffic() {
        let bus = SimBus::new(1);
        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(
            registry.init(0, SensorId::Htu21Humidity, &config),
            Err(Error::AddressNak)
        );
        assert_eq!(
            registry.read(0, SensorId::Bme280Pressure, &config),
            Err(Error::AddressNak)
        );

        let (bus, _) = registry.release();
        assert_eq!(bus.transfer_count(), 0);
    }

    #[test]
    fn derived_channel_follows_parent() {
        let mut bus = SimBus::new(1);
        // HTU21 temperature 0x683a, CRC 0x7c
        bus.device(0, 0x40).respond_always(&[0x68, 0x3a, 0x7c]);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(registry.init(0, SensorId::Htu21Temperature, &config), Ok(()));
        assert_eq!(registry.init(0, SensorId::Htu21Humidity, &config), Ok(()));
        assert!(registry.is_detected(0, SensorId::Htu21Humidity.index()));
    }

    #[test]
    fn crc_corruption_is_reported() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x40).respond_always(&[0x68, 0x3a, 0x7d]);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(
            registry.init(0, SensorId::Htu21Temperature, &config),
            Err(Error::Device(1))
        );
        assert!(!registry.detection().on_any_bus(SensorId::Htu21Temperature));
    }

    #[test]
    fn bus_zero_is_restored() {
        let mut bus = SimBus::new(4);
        attach_lm75(&mut bus, 2, 0x49);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(registry.init(2, SensorId::Lm75_1, &config), Ok(()));
        assert!(registry.is_detected(2, SensorId::Lm75_1.index()));
        assert!(!registry.is_detected(0, SensorId::Lm75_1.index()));
        assert_eq!(
            registry.read(2, SensorId::Lm75_0, &config),
            Err(Error::AddressNak)
        );

        let (bus, _) = registry.release();
        assert_eq!(bus.selected_bus(), 0);
    }

    #[test]
    fn select_failure_clears_detection() {
        let mut bus = SimBus::new(2);
        bus.fail_select(1, ErrorKind::Other);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);
        registry.detection.set(1, SensorId::Bh1750, true);

        assert_eq!(
            registry.init(1, SensorId::Bh1750, &config),
            Err(Error::Transport(ErrorKind::Other))
        );
        assert!(!registry.is_detected(1, SensorId::Bh1750.index()));
        assert_eq!(
            registry.init(5, SensorId::Bh1750, &config),
            Err(Error::InvalidBus(5))
        );
    }

    #[test]
    fn sweep_skips_sensors_found_on_bus_zero() {
        let mut bus = SimBus::new(2);
        // BH1750 answers on both buses, the write-only protocol always succeeds
        bus.device(0, 0x23);
        bus.device(1, 0x23);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(registry.init_all(&config), 1);
        assert!(registry.is_detected(0, SensorId::Bh1750.index()));
        assert!(!registry.is_detected(1, SensorId::Bh1750.index()));

        let (bus, _) = registry.release();
        assert!(bus.writes().iter().all(|t| t.bus == 0));
    }

    #[test]
    fn sweep_retries_later_buses_for_missing_sensors() {
        let mut bus = SimBus::new(3);
        bus.device(2, 0x23);

        let config = SensorConfig::new();
        let mut registry = SensorRegistry::new(bus, NoopDelay);

        assert_eq!(registry.init_all(&config), 1);
        assert!(registry.is_detected(2, SensorId::Bh1750.index()));
    }

    #[test]
    fn unknown_index_is_never_detected() {
        let registry = SensorRegistry::new(SimBus::new(1), NoopDelay);
        assert!(!registry.is_detected(0, 27));
        assert!(!registry.is_detected(9, 0));
    }
}
