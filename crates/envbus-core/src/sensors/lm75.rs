//! LM75 compatible temperature sensors (LM75, LM75BD, TMP275, ...).
//!
//! Identification relies on register behaviour rather than an ID register:
//! the configuration register must echo what was written (or read as zero on
//! the LM75BD), and the over-temperature register must hold both all-ones and
//! all-zeros patterns with the unused low nibble clear.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

const REG_TEMPERATURE: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;
const REG_OVERTEMPERATURE: u8 = 0x03;

/// All defaults, not in shutdown. Selects high resolution on the TMP275.
const CONFIG_DEFAULT: u8 = 0x60;

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    let mut buffer = [0u8; 2];

    ctx.device.send(&[REG_CONFIG, CONFIG_DEFAULT])?;
    ctx.device.receive(&mut buffer[..1])?;
    if buffer[0] != CONFIG_DEFAULT && buffer[0] != 0x00 {
        return Err(Error::Device(1));
    }

    ctx.device.send(&[REG_OVERTEMPERATURE, 0xff, 0xff])?;
    ctx.device.receive(&mut buffer)?;
    if buffer[0] != 0xff || buffer[1] & 0x0f != 0x00 {
        return Err(Error::Device(2));
    }

    ctx.device.send(&[REG_OVERTEMPERATURE, 0x00, 0x00])?;
    ctx.device.receive(&mut buffer)?;
    if buffer != [0x00, 0x00] {
        return Err(Error::Device(3));
    }

    ctx.device.send(&[REG_TEMPERATURE])
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let mut buffer = [0u8; 2];

    ctx.device.send(&[REG_TEMPERATURE])?;
    ctx.device.receive(&mut buffer)?;

    Ok(convert(u16::from_be_bytes(buffer)))
}

fn convert(raw: u16) -> Value {
    let raw = f64::from(raw);
    let mut cooked = raw / 256.0;

    if cooked > 127.0 {
        cooked -= 256.0;
    }

    Value::new(raw, cooked)
}
