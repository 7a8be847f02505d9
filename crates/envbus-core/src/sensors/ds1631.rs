//! DS1621 / DS1631 / DS1731 temperature sensors (0x4e).

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

const CMD_CONFIG: u8 = 0xac;
const CMD_START_CONVERT: u8 = 0x51;
const CMD_READ_TEMPERATURE: u8 = 0xaa;

/// R0 = R1 = 1 (12 bit resolution), continuous conversion.
const CONFIG_MAX_RESOLUTION: u8 = 0x0c;

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    ctx.device.send(&[CMD_CONFIG, CONFIG_MAX_RESOLUTION])?;
    ctx.device.send(&[CMD_START_CONVERT])
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let mut buffer = [0u8; 2];

    ctx.device.send(&[CMD_READ_TEMPERATURE])?;
    ctx.device.receive(&mut buffer)?;

    Ok(convert(u16::from_be_bytes(buffer)))
}

/// Sign bit plus magnitude in 1/256 °C.
fn convert(raw: u16) -> Value {
    let cooked = if raw & 0x8000 != 0 {
        f64::from(raw & !0x8000) / -256.0
    } else {
        f64::from(raw) / 256.0
    };

    Value::new(f64::from(raw), cooked)
}
