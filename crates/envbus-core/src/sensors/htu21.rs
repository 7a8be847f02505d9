//! HTU21D / SHT21 temperature and humidity sensor (0x40).

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::crc::crc8;
use super::{Context, Value};
use crate::error::Error;

/// Measure temperature, hold master.
const CMD_TEMPERATURE: u8 = 0xe3;
/// Measure relative humidity, hold master.
const CMD_HUMIDITY: u8 = 0xe5;

/// The two low bits carry status, not data.
const STATUS_MASK: u16 = 0xfffc;

/// Humidity temperature coefficient in %RH/K. Guessed, not taken from a
/// datasheet.
const HUMIDITY_TEMP_COEFF: f64 = -0.10;

fn measure<I: I2c, D>(ctx: &mut Context<'_, I, D>, command: u8) -> Result<u16, Error> {
    let mut buffer = [0u8; 3];
    ctx.device.send(&[command])?;
    ctx.device.receive(&mut buffer)?;

    if crc8(&buffer[..2]) != buffer[2] {
        return Err(Error::Device(1));
    }

    Ok(u16::from_be_bytes([buffer[0], buffer[1]]) & STATUS_MASK)
}

/// A successful temperature measurement is the presence check.
pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    read_temperature(ctx).map(|_| ())
}

pub fn read_temperature<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let raw = f64::from(measure(ctx, CMD_TEMPERATURE)?);
    Ok(Value::new(raw, raw * 175.72 / 65536.0 - 46.85))
}

/// Humidity is temperature compensated, so this measures both.
pub fn read_humidity<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let temperature = read_temperature(ctx)?.cooked;
    let uncompensated = f64::from(measure(ctx, CMD_HUMIDITY)?) * 125.0 / 65536.0 - 6.0;

    let compensated = uncompensated + (25.0 - temperature) * HUMIDITY_TEMP_COEFF;

    Ok(Value::new(uncompensated, compensated.clamp(0.0, 100.0)))
}
