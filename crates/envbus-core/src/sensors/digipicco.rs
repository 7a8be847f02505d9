//! DigiPicco combined temperature/humidity module (0x78).
//!
//! The module has no register map. Every read returns four bytes: humidity
//! in the first word, temperature in the second.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

fn fetch<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<[u8; 4], Error> {
    let mut buffer = [0u8; 4];
    ctx.device.receive(&mut buffer)?;
    Ok(buffer)
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    fetch(ctx).map(|_| ())
}

pub fn read_temperature<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let buffer = fetch(ctx)?;
    Ok(temperature(u16::from_be_bytes([buffer[2], buffer[3]])))
}

pub fn read_humidity<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let buffer = fetch(ctx)?;
    Ok(humidity(u16::from_be_bytes([buffer[0], buffer[1]])))
}

fn temperature(raw: u16) -> Value {
    let raw = f64::from(raw);
    Value::new(raw, (raw * 165.0) / 32767.0 - 40.5)
}

fn humidity(raw: u16) -> Value {
    let raw = f64::from(raw);
    Value::new(raw, ((raw * 100.0) / 32768.0).clamp(0.0, 100.0))
}
