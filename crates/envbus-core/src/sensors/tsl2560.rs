//! TSL2560 / TSL2561 light-to-digital converter (0x39 and 0x29).
//!
//! The chip at 0x39 shares its address with the TSL2550 and with the upper
//! half of the VEML6070, so init and read refuse to run when either of those
//! already owns the bus.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, SensorId, Value, veml6070};
use crate::error::Error;

const CMD_BYTE: u8 = 0xc0;
const CMD_BLOCK: u8 = 0xd0;

const REG_CONTROL: u8 = 0x00;
const REG_TIMING: u8 = 0x01;
const REG_INTERRUPT: u8 = 0x06;
const REG_ID1: u8 = 0x0a;
const REG_ID2: u8 = 0x0b;
const REG_DATA: u8 = 0x0c;

const POWER_DOWN: u8 = 0x00;
const POWER_UP: u8 = 0x03;

/// 400 ms integration, gain 16x.
const TIMING_HIGH_GAIN: u8 = 0b0001_0010;
/// 400 ms integration, gain 1x.
const TIMING_LOW_GAIN: u8 = 0b0000_0010;

const SATURATED: u16 = u16::MAX;

/// Piecewise lux approximation, one segment per channel ratio range.
struct Segment {
    ratio_top: f64,
    ch0_factor: f64,
    ch1_factor: f64,
}

const SEGMENTS: [Segment; 8] = [
    Segment { ratio_top: 0.125, ch0_factor: 0.03040, ch1_factor: 0.02720 },
    Segment { ratio_top: 0.250, ch0_factor: 0.03250, ch1_factor: 0.04400 },
    Segment { ratio_top: 0.375, ch0_factor: 0.03510, ch1_factor: 0.05440 },
    Segment { ratio_top: 0.500, ch0_factor: 0.03810, ch1_factor: 0.06240 },
    Segment { ratio_top: 0.610, ch0_factor: 0.02240, ch1_factor: 0.03100 },
    Segment { ratio_top: 0.800, ch0_factor: 0.01280, ch1_factor: 0.01530 },
    Segment { ratio_top: 1.300, ch0_factor: 0.00146, ch1_factor: 0.00112 },
    // Above the last ratio the result is zero
    Segment { ratio_top: 0.0, ch0_factor: 0.0, ch1_factor: 0.0 },
];

fn write<I: I2c, D>(ctx: &mut Context<'_, I, D>, register: u8, value: u8) -> Result<(), Error> {
    ctx.device.write_register(CMD_BYTE | register, value)
}

fn read_byte<I: I2c, D>(ctx: &mut Context<'_, I, D>, register: u8) -> Result<u8, Error> {
    ctx.device.read_register(CMD_BYTE | register)
}

fn write_check<I: I2c, D>(
    ctx: &mut Context<'_, I, D>,
    register: u8,
    value: u8,
) -> Result<(), Error> {
    write(ctx, register, value)?;

    if read_byte(ctx, register)? != value {
        return Err(Error::Device(1));
    }

    Ok(())
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    if ctx.device.address() == 0x39 && ctx.detected(SensorId::Tsl2550) {
        return Err(Error::Device(1));
    }

    write_check(ctx, REG_CONTROL, POWER_DOWN)?;

    write(ctx, REG_CONTROL, POWER_UP)?;
    if read_byte(ctx, REG_CONTROL)? & 0x0f != POWER_UP {
        return Err(Error::Device(2));
    }

    write_check(ctx, REG_INTERRUPT, 0x00)?;

    for (register, expected) in [(REG_ID1, 0x50), (REG_ID2, 0x04)] {
        write(ctx, register, 0x00)?;
        if read_byte(ctx, register)? != expected {
            return Err(Error::Device(3));
        }
    }

    let timing = if ctx.flags.tsl_high_sensitivity {
        TIMING_HIGH_GAIN
    } else {
        TIMING_LOW_GAIN
    };

    write_check(ctx, REG_TIMING, timing)
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    if ctx.detected(SensorId::Tsl2550) {
        return Err(Error::Device(1));
    }

    if veml6070::answers_both_addresses(&mut ctx.device) {
        return Err(Error::Device(2));
    }

    let mut buffer = [0u8; 4];
    ctx.device.send(&[CMD_BLOCK | REG_DATA])?;
    ctx.device.receive(&mut buffer)?;

    let ch0 = u16::from_le_bytes([buffer[0], buffer[1]]);
    let ch1 = u16::from_le_bytes([buffer[2], buffer[3]]);

    Ok(Value::new(
        f64::from(ch1) * 1_000_000.0 + f64::from(ch0),
        lux(ch0, ch1, ctx.flags.tsl_high_sensitivity),
    ))
}

/// Saturated channels yield -1.
fn lux(ch0: u16, ch1: u16, high_sensitivity: bool) -> f64 {
    if ch0 == SATURATED || ch1 == SATURATED {
        return -1.0;
    }

    // Low sensitivity runs at 1x gain, normalise to 16x
    let scale = if high_sensitivity { 1.0 } else { 16.0 };
    let ch0 = f64::from(ch0) * scale;
    let ch1 = f64::from(ch1) * scale;

    let ratio = if ch0 >= 1.0 { ch1 / ch0 } else { 0.0 };

    let segment = SEGMENTS
        .iter()
        .find(|s| s.ratio_top == 0.0 || ratio <= s.ratio_top)
        .unwrap_or(&SEGMENTS[SEGMENTS.len() - 1]);

    let lux = ch0 * segment.ch0_factor - ch1 * segment.ch1_factor;
    if lux < 0.0 { 0.0 } else { lux }
}
