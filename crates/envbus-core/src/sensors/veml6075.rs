//! VEML6075 UVA/UVB sensor (0x10).
//!
//! All registers are 16 bit little endian and read with a repeated start.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

const REG_CONF: u8 = 0x00;
const REG_UVA: u8 = 0x07;
const REG_UVB: u8 = 0x09;
const REG_UVCOMP1: u8 = 0x0a;
const REG_UVCOMP2: u8 = 0x0b;
const REG_ID: u8 = 0x0c;

const DEVICE_ID: [u8; 2] = [0x26, 0x00];

const CONF_SHUTDOWN: u8 = 0x01;
const CONF_ACTIVE: u8 = 0b0100_0000;

// Visible and infrared compensation coefficients, open-air responsivity
const UVA_A: f64 = 2.22;
const UVA_B: f64 = 1.33;
const UVB_C: f64 = 2.95;
const UVB_D: f64 = 1.74;
const UVA_RESPONSIVITY: f64 = 0.001461;
const UVB_RESPONSIVITY: f64 = 0.002591;

fn read_word<I: I2c, D>(ctx: &mut Context<'_, I, D>, register: u8) -> Result<u16, Error> {
    let mut buffer = [0u8; 2];
    ctx.device.send_receive(register, &mut buffer)?;
    Ok(u16::from_le_bytes(buffer))
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    let mut id = [0u8; 2];
    ctx.device.send_receive(REG_ID, &mut id)?;

    if id != DEVICE_ID {
        return Err(Error::Device(1));
    }

    ctx.device
        .write_register(REG_CONF, CONF_SHUTDOWN)
        .map_err(|_| Error::Device(2))?;
    ctx.device
        .write_register(REG_CONF, CONF_ACTIVE)
        .map_err(|_| Error::Device(3))
}

pub fn read<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let uva = f64::from(read_word(ctx, REG_UVA)?);
    let uvb = f64::from(read_word(ctx, REG_UVB)?);
    let comp1 = f64::from(read_word(ctx, REG_UVCOMP1)?);
    let comp2 = f64::from(read_word(ctx, REG_UVCOMP2)?);

    Ok(uv_index(uva, uvb, comp1, comp2))
}

fn uv_index(uva: f64, uvb: f64, comp1: f64, comp2: f64) -> Value {
    let uva = (uva - UVA_A * comp1 - UVA_B * comp2).max(0.0);
    let uvb = (uvb - UVB_C * comp1 - UVB_D * comp2).max(0.0);

    let index = (uva * UVA_RESPONSIVITY + uvb * UVB_RESPONSIVITY) / 2.0;

    // Both channels packed into one number for diagnostics
    let raw = (uva as u32) * 10_000 + uvb as u32;

    Value::new(f64::from(raw), index)
}
