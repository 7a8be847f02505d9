//! BH1750 ambient light sensor (0x23).
//!
//! The chip has no readable registers, so any device acknowledging the
//! command sequence at 0x23 is taken to be a BH1750.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

const POWER_ON: u8 = 0b0000_0001;
const RESET: u8 = 0b0000_0111;
const MEASUREMENT_TIME_HIGH: u8 = 0b0100_0000;
const MEASUREMENT_TIME_LOW: u8 = 0b0110_0000;
/// Continuous high resolution mode, one sample every 120 ms.
const CONTINUOUS_HIGH_RES: u8 = 0b0001_0001;

/// Measurement window and resulting lux per count.
const fn window(high_sensitivity: bool) -> (u8, f64) {
    if high_sensitivity { (254, 0.11) } else { (31, 0.93) }
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    let (time, _) = window(ctx.flags.bh_high_sensitivity);

    ctx.device.send(&[POWER_ON])?;
    ctx.device.send(&[RESET])?;
    ctx.device.send(&[MEASUREMENT_TIME_HIGH | ((time >> 5) & 0b111)])?;
    ctx.device.send(&[MEASUREMENT_TIME_LOW | (time & 0b1_1111)])?;
    ctx.device.send(&[CONTINUOUS_HIGH_RES])
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let mut buffer = [0u8; 2];
    ctx.device.receive(&mut buffer)?;

    let (_, lux_per_count) = window(ctx.flags.bh_high_sensitivity);
    let raw = f64::from(u16::from_be_bytes(buffer));

    Ok(Value::new(raw, raw * lux_per_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Device;
    use crate::config::Flags;
    use crate::sensors::DetectionState;
    use crate::sim::{NoopDelay, SimBus};

    #[test]
    fn init_programs_measurement_window() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x23);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x23),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags { bh_high_sensitivity: true, ..Flags::default() },
        };

        assert_eq!(init(&mut ctx), Ok(()));
        assert_eq!(
            bus.writes_to(0x23),
            [&[0x01][..], &[0x07], &[0x47], &[0x7e], &[0x11]]
        );
    }

    #[test]
    fn low_sensitivity_counts() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x23).respond(&[0x01, 0x00]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x23),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        let value = read(&mut ctx).unwrap();
        assert_eq!(value.raw, 256.0);
        assert!((value.cooked - 238.08).abs() < 1e-9);
    }
}
