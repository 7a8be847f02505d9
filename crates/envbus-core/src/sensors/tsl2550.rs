//! TSL2550 ambient light sensor (0x39).

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, SensorId, Value, veml6070};
use crate::bus::{Retry, retry_on_error};
use crate::error::Error;

const CMD_POWER_UP: u8 = 0x03;
const CMD_STANDARD_RANGE: u8 = 0x18;
const CMD_EXTENDED_RANGE: u8 = 0x1d;
/// Echo of either range command.
const RANGE_ACK: u8 = 0x1b;

const CMD_READ_CH0: u8 = 0x43;
const CMD_READ_CH1: u8 = 0x83;

const ADC_VALID: u8 = 0x80;

const CONVERSION_RETRY: Retry = Retry::new(16, 10);

/// ADC chord/step code to count.
const COUNT: [u16; 128] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 18, 20, 22, 24, 26, 28, 30, 32,
    34, 36, 38, 40, 42, 44, 46, 49, 53, 57, 61, 65, 69, 73, 77, 81, 85, 89, 93, 97, 101, 105,
    109, 115, 123, 131, 139, 147, 155, 163, 171, 179, 187, 195, 203, 211, 219, 227, 235, 247,
    263, 279, 295, 311, 327, 343, 359, 375, 391, 407, 423, 439, 455, 471, 487, 511, 543, 575,
    607, 639, 671, 703, 735, 767, 799, 831, 863, 895, 927, 959, 991, 1039, 1103, 1167, 1231,
    1295, 1359, 1423, 1487, 1551, 1615, 1679, 1743, 1807, 1871, 1935, 1999, 2095, 2223, 2351,
    2479, 2607, 2735, 2863, 2991, 3119, 3247, 3375, 3503, 3631, 3759, 3887, 4015,
];

/// Infrared rejection factor in percent, indexed by `ch1 * 128 / ch0`.
const RATIO: [u8; 129] = [
    100, 100, 100, 100, 100, 100, 100, 100, 100, 100, 100, 100, 100, 100, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 98, 98, 98, 98, 98, 98, 98, 97, 97, 97, 97, 97, 96, 96, 96,
    96, 95, 95, 95, 94, 94, 93, 93, 93, 92, 92, 91, 91, 90, 89, 89, 88, 87, 87, 86, 85, 84, 83,
    82, 81, 80, 79, 78, 77, 75, 74, 73, 71, 69, 68, 66, 64, 62, 60, 58, 56, 54, 52, 49, 47, 44,
    42, 41, 40, 40, 39, 39, 38, 38, 37, 37, 37, 36, 36, 36, 35, 35, 35, 35, 34, 34, 34, 34, 33,
    33, 33, 33, 32, 32, 32, 32, 32, 31, 31, 31, 31, 31, 30, 30, 30, 30, 30,
];

fn command<I: I2c, D>(ctx: &mut Context<'_, I, D>, command: u8) -> Result<u8, Error> {
    ctx.device.read_register(command)
}

fn command_check<I: I2c, D>(
    ctx: &mut Context<'_, I, D>,
    cmd: u8,
    expected: u8,
) -> Result<(), Error> {
    if command(ctx, cmd)? != expected {
        return Err(Error::Device(2));
    }

    Ok(())
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    if ctx.detected(SensorId::Tsl2560_0) {
        return Err(Error::Device(1));
    }

    if veml6070::answers_both_addresses(&mut ctx.device) {
        return Err(Error::Device(2));
    }

    command_check(ctx, CMD_POWER_UP, CMD_POWER_UP)?;

    let range = if ctx.flags.tsl_high_sensitivity {
        CMD_STANDARD_RANGE
    } else {
        CMD_EXTENDED_RANGE
    };

    command_check(ctx, range, RANGE_ACK)
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    if ctx.detected(SensorId::Tsl2560_0) {
        return Err(Error::Device(1));
    }

    let Context { device, delay, .. } = ctx;
    let (ch0, ch1) = retry_on_error(&mut **delay, CONVERSION_RETRY, || {
        let ch0 = device.read_register(CMD_READ_CH0)?;
        let ch1 = device.read_register(CMD_READ_CH1)?;

        if ch0 & ADC_VALID != 0 && ch1 & ADC_VALID != 0 {
            Ok((ch0 & !ADC_VALID, ch1 & !ADC_VALID))
        } else {
            // Conversion still running
            Err(Error::Device(3))
        }
    })?;

    let mut lux = lux(ch0, ch1);
    if !ctx.flags.tsl_high_sensitivity {
        lux *= 5.0;
    }

    Ok(Value::new(f64::from(ch0) * 10_000.0 + f64::from(ch1), lux))
}

/// Standard-range lux from the two 7-bit ADC codes.
fn lux(ch0: u8, ch1: u8) -> f64 {
    let count0 = u32::from(COUNT[usize::from(ch0 & 0x7f)]);
    let count1 = u32::from(COUNT[usize::from(ch1 & 0x7f)]);

    let ratio = if count1 <= count0 && count0 > 0 {
        ((count1 * 128) / count0).min(128)
    } else {
        128
    };

    let lux = (f64::from(count0) - f64::from(count1)) * f64::from(RATIO[ratio as usize]) / 2560.0;
    if lux < 0.0 { 0.0 } else { lux }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Device;
    use crate::config::Flags;
    use crate::sensors::DetectionState;
    use crate::sim::{NoopDelay, SimBus};

    #[test]
    fn lux_uses_count_and_ratio_tables() {
        // count 1039 and 0: ratio 0, factor 100
        assert!((lux(96, 0) - 1039.0 * 100.0 / 2560.0).abs() < 1e-9);
        // count 1039 and 511: ratio 62, factor 85
        assert!((lux(96, 80) - (1039.0 - 511.0) * 85.0 / 2560.0).abs() < 1e-9);
        assert_eq!(lux(0, 0), 0.0);
    }

    #[test]
    fn more_infrared_than_visible_is_dark() {
        assert_eq!(lux(10, 20), 0.0);
    }

    #[test]
    fn read_waits_for_both_valid_bits() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x39)
            .respond(&[0x60])
            .respond(&[0x00])
            .respond(&[0x80 | 96])
            .respond(&[0x80]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x39),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags { tsl_high_sensitivity: true, ..Flags::default() },
        };

        let value = read(&mut ctx).unwrap();
        assert_eq!(value.raw, 960_000.0);
        assert!((value.cooked - 1039.0 * 100.0 / 2560.0).abs() < 1e-9);
    }

    #[test]
    fn read_gives_up_when_never_valid() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x39).respond_always(&[0x00]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x39),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        assert_eq!(read(&mut ctx), Err(Error::Device(3)));
        assert_eq!(bus.read_count(), 32);
    }
}
