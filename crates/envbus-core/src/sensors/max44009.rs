//! MAX44009 ambient light sensor (0x4a).
//!
//! Shares 0x4a with LM75 #2. The register echo checks in init tell the two
//! apart.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

use super::{Context, SensorId, Value};
use crate::error::Error;

const REG_INT_STATUS: u8 = 0x00;
const REG_INT_ENABLE: u8 = 0x01;
const REG_CONFIG: u8 = 0x02;
const REG_LUX_HIGH: u8 = 0x03;
const REG_LUX_LOW: u8 = 0x04;

/// Continuous mode.
const CONFIG_CONTINUOUS: u8 = 0b1000_0000;

/// The high and low bytes are not latched together, so a reading is only
/// accepted once two consecutive ones agree.
const MAX_READS: usize = 8;

const OVERRANGE_EXPONENT: u8 = 0b1111;

fn write_echo<I: I2c, D>(
    ctx: &mut Context<'_, I, D>,
    register: u8,
    value: u8,
) -> Result<u8, Error> {
    let mut echo = [0u8; 1];
    ctx.device.write_register(register, value)?;
    ctx.device.receive(&mut echo)?;
    Ok(echo[0])
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    if ctx.detected(SensorId::Lm75_2) {
        return Err(Error::Device(1));
    }

    // Register echoes identify the chip
    let checks = [
        (REG_INT_STATUS, 0xff, 0x00),
        (REG_INT_ENABLE, 0xff, 0x01),
        (REG_INT_ENABLE, 0x00, 0x00),
    ];

    for (register, value, expected) in checks {
        if write_echo(ctx, register, value)? != expected {
            return Err(Error::Device(2));
        }
    }

    if write_echo(ctx, REG_CONFIG, CONFIG_CONTINUOUS)? & 0xf0 != CONFIG_CONTINUOUS {
        return Err(Error::Device(3));
    }

    Ok(())
}

/// Returns (exponent, mantissa).
fn sample<I: I2c, D>(ctx: &mut Context<'_, I, D>) -> Result<(u8, u8), Error> {
    let high = ctx.device.read_register(REG_LUX_HIGH)?;
    let low = ctx.device.read_register(REG_LUX_LOW)?;

    Ok((high >> 4, (high << 4) | (low & 0x0f)))
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let mut previous = None;
    let mut stable = None;

    for _ in 0..MAX_READS {
        let current = sample(ctx)?;
        if previous == Some(current) {
            stable = Some(current);
            break;
        }
        previous = Some(current);
    }

    let Some((exponent, mantissa)) = stable else {
        debug!("max44009: no two consecutive readings agree");
        return Err(Error::Device(1));
    };

    if exponent == OVERRANGE_EXPONENT {
        return Err(Error::Device(2));
    }

    Ok(Value::new(
        f64::from(exponent) * 10_000.0 + f64::from(mantissa),
        f64::from(1u32 << exponent) * f64::from(mantissa) * 0.045,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Device;
    use crate::config::Flags;
    use crate::sensors::DetectionState;
    use crate::sim::{NoopDelay, SimBus};

    #[test]
    fn read_waits_for_agreeing_samples() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x4a)
            .respond(&[0x35])
            .respond(&[0x0b])
            .respond(&[0x35])
            .respond(&[0x0a])
            .respond(&[0x35])
            .respond(&[0x0a]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x4a),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        let value = read(&mut ctx).unwrap();
        assert_eq!(value.raw, 30090.0);
        assert!((value.cooked - 32.4).abs() < 1e-9);
        assert_eq!(bus.read_count(), 6);
    }

    #[test]
    fn unstable_readings_are_rejected() {
        let mut bus = SimBus::new(1);
        let device = bus.device(0, 0x4a);
        for i in 0..8 {
            device.respond(&[0x10 | i]).respond(&[0x00]);
        }

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x4a),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        assert_eq!(read(&mut ctx), Err(Error::Device(1)));
    }

    #[test]
    fn overrange_is_a_device_error() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x4a).respond_always(&[0xf0]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x4a),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        assert_eq!(read(&mut ctx), Err(Error::Device(2)));
    }

    #[test]
    fn lm75_at_the_same_address_wins() {
        let mut bus = SimBus::new(1);
        let mut detection = DetectionState::new();
        detection.set(0, SensorId::Lm75_2, true);
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x4a),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        assert_eq!(init(&mut ctx), Err(Error::Device(1)));
    }

    #[test]
    fn init_checks_register_echoes() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x4a)
            .respond(&[0x00])
            .respond(&[0x01])
            .respond(&[0x00])
            .respond(&[0x83]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x4a),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        assert_eq!(init(&mut ctx), Ok(()));
    }
}
