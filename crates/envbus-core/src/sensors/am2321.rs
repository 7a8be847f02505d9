//! AM2321 temperature and humidity sensor (0x5c).
//!
//! The sensor sleeps between transfers and drops off the bus while doing so.
//! Every access therefore starts with a wake-up write whose NAK is expected,
//! followed by a Modbus-style register read protected by a CRC-16.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

use super::crc::crc16;
use super::{Context, Value};
use crate::bus::{Retry, retry_on_error};
use crate::error::Error;

const FUNCTION_READ: u8 = 0x03;

const REG_HUMIDITY: u8 = 0x00;
const REG_MODEL: u8 = 0x08;

const WAKE_RETRY: Retry = Retry::new(32, 1);

/// Largest register block read in one request.
const MAX_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: Value,
    pub humidity: Value,
}

/// Read `length` registers starting at `offset` into the front of the
/// returned buffer.
fn read_registers<I: I2c, D: DelayNs>(
    ctx: &mut Context<'_, I, D>,
    offset: u8,
    length: usize,
) -> Result<[u8; MAX_LENGTH], Error> {
    let length = length.min(MAX_LENGTH);
    let Context { device, delay, .. } = ctx;

    // Wake up, the sensor does not acknowledge this
    let _ = device.send(&[0x00]);
    delay.delay_ms(WAKE_RETRY.pause_ms);

    retry_on_error(&mut **delay, WAKE_RETRY, || {
        device.send(&[FUNCTION_READ, offset, length as u8])
    })?;

    let mut frame = [0u8; MAX_LENGTH + 4];
    let frame = &mut frame[..length + 4];
    retry_on_error(&mut **delay, WAKE_RETRY, || device.receive(&mut *frame))?;

    if frame[0] != FUNCTION_READ || usize::from(frame[1]) != length {
        return Err(Error::Device(2));
    }

    let received = u16::from_le_bytes([frame[length + 2], frame[length + 3]]);
    if received != crc16(&frame[..length + 2]) {
        debug!("am2321: checksum mismatch");
        return Err(Error::Device(3));
    }

    let mut values = [0u8; MAX_LENGTH];
    values[..length].copy_from_slice(&frame[2..length + 2]);
    Ok(values)
}

/// Reads the model registers. Their content differs between batches, so
/// only the framing and checksum are verified.
pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    read_registers(ctx, REG_MODEL, 2).map(|_| ())
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Sample, Error> {
    let values = read_registers(ctx, REG_HUMIDITY, 4)?;

    let humidity = u16::from_be_bytes([values[0], values[1]]);
    let temperature = u16::from_be_bytes([values[2], values[3]]);

    // Sign and magnitude
    let temperature = if temperature & 0x8000 != 0 {
        -f64::from(temperature & 0x7fff)
    } else {
        f64::from(temperature)
    };

    Ok(Sample {
        temperature: Value::new(temperature, temperature / 10.0),
        humidity: Value::new(
            f64::from(humidity),
            (f64::from(humidity) / 10.0).clamp(0.0, 100.0),
        ),
    })
}
