//! BMP085 / BMP180 barometric pressure and temperature sensor (0x77).
//!
//! The eleven factory calibration words are read once at init and reused in
//! every compensation. The compensation is the datasheet's integer
//! algorithm. Every division truncates toward zero exactly like the vendor
//! reference, so the order of operations must not be rearranged.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

const REG_CALIBRATION: u8 = 0xaa;
const REG_CONTROL: u8 = 0xf4;
const REG_RESULT: u8 = 0xf6;

const CMD_TEMPERATURE: u8 = 0x2e;
const CMD_PRESSURE: u8 = 0x34;

/// Oversampling setting (ultra high resolution).
const OSS: u32 = 3;

const TEMPERATURE_CONVERSION_MS: u32 = 5;
const PRESSURE_CONVERSION_MS: u32 = 25;

/// Factory calibration constants (registers 0xaa..=0xbf, big endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    fn from_bytes(bytes: &[u8; 22]) -> Self {
        let word = |i: usize| u16::from_be_bytes([bytes[i * 2], bytes[i * 2 + 1]]);

        Self {
            ac1: word(0) as i16,
            ac2: word(1) as i16,
            ac3: word(2) as i16,
            ac4: word(3),
            ac5: word(4),
            ac6: word(5),
            b1: word(6) as i16,
            b2: word(7) as i16,
            mb: word(8) as i16,
            mc: word(9) as i16,
            md: word(10) as i16,
        }
    }
}

/// Both channels are measured on every read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: Value,
    pub pressure: Value,
}

/// Read the calibration block and run one full measurement as a sanity check.
pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Calibration, Error> {
    let mut buffer = [0u8; 22];
    ctx.device.send(&[REG_CALIBRATION])?;
    ctx.device.receive(&mut buffer)?;

    let calibration = Calibration::from_bytes(&buffer);
    read(ctx, &calibration)?;

    Ok(calibration)
}

pub fn read<I: I2c, D: DelayNs>(
    ctx: &mut Context<'_, I, D>,
    calibration: &Calibration,
) -> Result<Sample, Error> {
    ctx.device.send(&[REG_CONTROL, CMD_TEMPERATURE])?;
    ctx.delay.delay_ms(TEMPERATURE_CONVERSION_MS);

    let mut buffer = [0u8; 3];
    ctx.device.send(&[REG_RESULT])?;
    ctx.device.receive(&mut buffer[..2])?;
    let ut = u16::from_be_bytes([buffer[0], buffer[1]]);

    let (b5, temperature) = compensate_temperature(calibration, ut)?;

    ctx.device
        .send(&[REG_CONTROL, CMD_PRESSURE | ((OSS as u8) << 6)])?;
    ctx.delay.delay_ms(PRESSURE_CONVERSION_MS);

    ctx.device.send(&[REG_RESULT])?;
    ctx.device.receive(&mut buffer)?;
    let up = (u32::from(buffer[0]) << 16 | u32::from(buffer[1]) << 8 | u32::from(buffer[2]))
        >> (8 - OSS);

    let pressure = compensate_pressure(calibration, b5, up)?;

    Ok(Sample {
        temperature: Value::new(f64::from(ut), temperature),
        pressure: Value::new(f64::from(up), f64::from(pressure) / 100.0),
    })
}

/// Returns `b5` (needed by the pressure compensation) and °C.
fn compensate_temperature(cal: &Calibration, ut: u16) -> Result<(i32, f64), Error> {
    let x1 = (i32::from(ut) - i32::from(cal.ac6)).wrapping_mul(i32::from(cal.ac5)) / (1 << 15);

    let divisor = x1.wrapping_add(i32::from(cal.md));
    if divisor == 0 {
        return Err(Error::Device(1));
    }

    let x2 = (i32::from(cal.mc) * (1 << 11)) / divisor;
    let b5 = x1.wrapping_add(x2);

    Ok((b5, ((f64::from(b5) + 8.0) / 16.0) / 10.0))
}

/// Returns Pa.
fn compensate_pressure(cal: &Calibration, b5: i32, up: u32) -> Result<i32, Error> {
    let b6 = b5.wrapping_sub(4000);
    let b6_squared = b6.wrapping_mul(b6) / (1 << 12);

    let x1 = i32::from(cal.b2).wrapping_mul(b6_squared) / (1 << 11);
    let x2 = i32::from(cal.ac2).wrapping_mul(b6) / (1 << 11);
    let x3 = x1.wrapping_add(x2);
    let b3 = ((i32::from(cal.ac1) * 4).wrapping_add(x3) << OSS).wrapping_add(2) / 4;

    let x1 = i32::from(cal.ac3).wrapping_mul(b6) / (1 << 13);
    let x2 = i32::from(cal.b1).wrapping_mul(b6_squared) / (1 << 16);
    let x3 = x1.wrapping_add(x2).wrapping_add(2) / (1 << 2);
    let b4 = (i32::from(cal.ac4).wrapping_mul(x3.wrapping_add(32768)) / (1 << 15)) as u32;
    let b7 = up.wrapping_sub(b3 as u32).wrapping_mul(50000 >> OSS);

    if b4 == 0 {
        return Err(Error::Device(2));
    }

    let p = if b7 & 0x8000_0000 != 0 {
        (b7.wrapping_mul(2) / b4) << 1
    } else {
        (b7 / b4).wrapping_mul(2)
    } as i32;

    let x1 = p / (1 << 8);
    let x1 = x1.wrapping_mul(x1);
    let x1 = x1.wrapping_mul(3038) / (1 << 16);
    let x2 = (-7357i32).wrapping_mul(p) / (1 << 16);

    Ok(p.wrapping_add(x1.wrapping_add(x2).wrapping_add(3791) / (1 << 4)))
}
