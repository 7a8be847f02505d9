//! VEML6070 UV sensor.
//!
//! Commands go to 0x38. The result is split over two read-only addresses:
//! the low byte at 0x38 and the high byte at 0x39. The latter collides with
//! the TSL2550 and TSL2560 #0, so a chip answering reads on both addresses
//! is taken to be a VEML6070.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, SensorId, Value};
use crate::bus::Device;
use crate::error::Error;

const ADDRESS_COMMAND: u8 = 0x38;
const ADDRESS_LSB: u8 = 0x38;
const ADDRESS_MSB: u8 = 0x39;

/// Recommended initial setting.
const CMD_INIT: u8 = 0b0000_0110;
/// Integration time 4T.
const CMD_INTEGRATION: u8 = 0b0000_1100;

/// Counts per UV index step at 4T.
const COUNTS_PER_STEP: f64 = 17.6;

/// Whether plain one-byte reads succeed on both 0x39 and 0x38.
pub(crate) fn answers_both_addresses<I: I2c>(device: &mut Device<'_, I>) -> bool {
    let mut buffer = [0u8; 1];

    device.at(ADDRESS_MSB).receive(&mut buffer).is_ok()
        && device.at(ADDRESS_LSB).receive(&mut buffer).is_ok()
}

fn fetch<I: I2c>(device: &mut Device<'_, I>) -> Result<u16, Error> {
    let mut msb = [0u8; 1];
    let mut lsb = [0u8; 1];

    device.at(ADDRESS_MSB).receive(&mut msb)?;
    device.at(ADDRESS_LSB).receive(&mut lsb)?;

    Ok(u16::from_be_bytes([msb[0], lsb[0]]))
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    if ctx.detected(SensorId::Tsl2550) || ctx.detected(SensorId::Tsl2560_0) {
        return Err(Error::Device(1));
    }

    for command in [CMD_INIT, CMD_INTEGRATION] {
        ctx.device.at(ADDRESS_COMMAND).send(&[command])?;
        fetch(&mut ctx.device)?;
    }

    Ok(())
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let raw = f64::from(fetch(&mut ctx.device)?);
    Ok(Value::new(raw, raw / COUNTS_PER_STEP))
}
