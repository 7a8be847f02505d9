//! BMP280 / BME280 pressure, temperature and humidity sensor (0x76).
//!
//! Runs in normal mode with 16x oversampling on all channels and the IIR
//! filter at 16. Compensation uses the floating point formulas from the
//! Bosch datasheet. A BMP280 has no humidity block, its humidity reads as 0.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{Context, Value};
use crate::error::Error;

const REG_CALIB_TP: u8 = 0x88;
const REG_CALIB_H1: u8 = 0xa1;
const REG_ID: u8 = 0xd0;
const REG_CALIB_H2: u8 = 0xe1;
const REG_CTRL_HUM: u8 = 0xf2;
const REG_CTRL_MEAS: u8 = 0xf4;
const REG_CONFIG: u8 = 0xf5;
const REG_DATA: u8 = 0xf7;

/// BMP280 samples and mass production, BME280.
const CHIP_IDS: [u8; 4] = [0x56, 0x57, 0x58, 0x60];

const CTRL_MEAS_SLEEP: u8 = 0x00;
/// Humidity oversampling x16.
const CTRL_HUM_X16: u8 = 0b0000_0101;
/// Standby 0.5 ms, filter 16.
const CONFIG_FILTER_16: u8 = 0b0001_0000;
/// Temperature and pressure oversampling x16, normal mode.
const CTRL_MEAS_NORMAL_X16: u8 = 0b1011_0111;

/// Factory trimming parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// `tp` is 0x88..=0x9f, `h1` is 0xa1 and `h` is 0xe1..=0xe7.
    fn from_registers(tp: &[u8; 24], h1: u8, h: &[u8; 7]) -> Self {
        let word = |i: usize| u16::from_le_bytes([tp[i * 2], tp[i * 2 + 1]]);

        Self {
            t1: word(0),
            t2: word(1) as i16,
            t3: word(2) as i16,
            p1: word(3),
            p2: word(4) as i16,
            p3: word(5) as i16,
            p4: word(6) as i16,
            p5: word(7) as i16,
            p6: word(8) as i16,
            p7: word(9) as i16,
            p8: word(10) as i16,
            p9: word(11) as i16,
            h1,
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            // 12-bit values sharing the nibbles of 0xe5
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0f),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: Value,
    pub humidity: Value,
    pub pressure: Value,
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Calibration, Error> {
    let mut status = [0u8; 1];
    ctx.device.receive(&mut status)?;

    let id = ctx.device.read_register(REG_ID)?;
    if !CHIP_IDS.contains(&id) {
        return Err(Error::Device(1));
    }

    let mut tp = [0u8; 24];
    ctx.device.send(&[REG_CALIB_TP])?;
    ctx.device.receive(&mut tp)?;

    let h1 = ctx.device.read_register(REG_CALIB_H1)?;

    let mut h = [0u8; 7];
    ctx.device.send(&[REG_CALIB_H2])?;
    ctx.device.receive(&mut h)?;

    // Configuration registers are only writable in sleep mode
    ctx.device.write_register(REG_CTRL_MEAS, CTRL_MEAS_SLEEP)?;
    ctx.device.write_register(REG_CTRL_HUM, CTRL_HUM_X16)?;
    ctx.device.write_register(REG_CONFIG, CONFIG_FILTER_16)?;
    ctx.device.write_register(REG_CTRL_MEAS, CTRL_MEAS_NORMAL_X16)?;

    Ok(Calibration::from_registers(&tp, h1, &h))
}

/// Burst read of all ADC values so they come from the same sample.
pub fn read<I: I2c, D: DelayNs>(
    ctx: &mut Context<'_, I, D>,
    calibration: &Calibration,
) -> Result<Sample, Error> {
    let mut buffer = [0u8; 8];
    ctx.device.send(&[REG_DATA])?;
    ctx.device.receive(&mut buffer)?;

    let adc_p = u32::from_be_bytes([0, buffer[0], buffer[1], buffer[2]]) >> 4;
    let adc_t = u32::from_be_bytes([0, buffer[3], buffer[4], buffer[5]]) >> 4;
    let adc_h = u16::from_be_bytes([buffer[6], buffer[7]]);

    Ok(compensate(calibration, adc_t, adc_p, adc_h))
}

fn compensate(cal: &Calibration, adc_t: u32, adc_p: u32, adc_h: u16) -> Sample {
    let adc_t_f = f64::from(adc_t);
    let t1 = f64::from(cal.t1);

    let var1 = (adc_t_f / 16384.0 - t1 / 1024.0) * f64::from(cal.t2);
    let delta = adc_t_f / 131072.0 - t1 / 8192.0;
    let var2 = delta * delta * f64::from(cal.t3);

    let t_fine = f64::from((var1 + var2) as i32);
    let temperature = (var1 + var2) / 5120.0;

    // Pressure, Pa
    let mut var1 = t_fine / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * f64::from(cal.p6) / 32768.0;
    var2 += var1 * f64::from(cal.p5) * 2.0;
    var2 = var2 / 4.0 + f64::from(cal.p4) * 65536.0;
    var1 = (f64::from(cal.p3) * var1 * var1 / 524288.0 + f64::from(cal.p2) * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * f64::from(cal.p1);

    let pressure = if var1 < 0.0001 {
        0.0
    } else {
        let p = 1048576.0 - f64::from(adc_p);
        let p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(cal.p9) * p * p / 2147483648.0;
        let var2 = p * f64::from(cal.p8) / 32768.0;
        p + (var1 + var2 + f64::from(cal.p7)) / 16.0
    };

    // Relative humidity, %
    let h = t_fine - 76800.0;
    let h = (f64::from(adc_h) - (f64::from(cal.h4) * 64.0 + f64::from(cal.h5) / 16384.0 * h))
        * (f64::from(cal.h2) / 65536.0
            * (1.0
                + f64::from(cal.h6) / 67108864.0 * h * (1.0 + f64::from(cal.h3) / 67108864.0 * h)));
    let humidity = h * (1.0 - f64::from(cal.h1) * h / 524288.0);

    Sample {
        temperature: Value::new(adc_t_f, temperature),
        humidity: Value::new(f64::from(adc_h), humidity.clamp(0.0, 100.0)),
        pressure: Value::new(f64::from(adc_p), pressure / 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Device;
    use crate::config::Flags;
    use crate::sensors::DetectionState;
    use crate::sim::{NoopDelay, SimBus};

    // Trimming values from the datasheet example, typical humidity trimming
    const TP: [u8; 24] = [
        0x70, 0x6b, 0x43, 0x67, 0x18, 0xfc, 0x7d, 0x8e, 0x43, 0xd6, 0xd0, 0x0b, 0x27, 0x0b, 0x8c,
        0x00, 0xf9, 0xff, 0x8c, 0x3c, 0xf8, 0xc6, 0x70, 0x17,
    ];
    const H1: u8 = 75;
    const H: [u8; 7] = [0x6a, 0x01, 0x00, 0x14, 0x04, 0x00, 0x1e];

    #[test]
    fn trimming_words_are_little_endian() {
        let cal = Calibration::from_registers(&TP, H1, &H);
        assert_eq!(cal.t1, 27504);
        assert_eq!(cal.t3, -1000);
        assert_eq!(cal.p1, 36477);
        assert_eq!(cal.p8, -14600);
        assert_eq!(cal.h2, 362);
        assert_eq!(cal.h4, 324);
        assert_eq!(cal.h5, 0);
        assert_eq!(cal.h6, 30);
    }

    #[test]
    fn datasheet_compensation() {
        let cal = Calibration::from_registers(&TP, H1, &H);
        let sample = compensate(&cal, 519888, 415148, 30000);

        assert!((sample.temperature.cooked - 25.0825).abs() < 1e-3);
        assert!((sample.pressure.cooked - 1006.5326).abs() < 1e-3);
        assert!((sample.humidity.cooked - 51.9602).abs() < 1e-3);
    }

    #[test]
    fn init_and_read_over_the_bus() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x76)
            .respond(&[0x00])
            .respond(&[0x60])
            .respond(&TP)
            .respond(&[H1])
            .respond(&H)
            .respond(&[0x65, 0x5a, 0xc0, 0x7e, 0xed, 0x00, 0x75, 0x30]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x76),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        let cal = init(&mut ctx).unwrap();
        let sample = read(&mut ctx, &cal).unwrap();
        assert_eq!(sample.temperature.raw, 519888.0);
        assert_eq!(sample.pressure.raw, 415148.0);
        assert!((sample.pressure.cooked - 1006.5326).abs() < 1e-3);

        let writes = bus.writes_to(0x76);
        assert_eq!(&writes[4..8], [&[0xf4, 0x00][..], &[0xf2, 0x05], &[0xf5, 0x10], &[0xf4, 0xb7]]);
    }

    #[test]
    fn unknown_chip_id_is_rejected() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x76).respond(&[0x00]).respond(&[0x55]);

        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(&mut bus, 0x76),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };

        assert_eq!(init(&mut ctx), Err(Error::Device(1)));
    }

    #[test]
    fn zero_trimming_gives_zero_pressure() {
        let sample = compensate(&Calibration::default(), 519888, 415148, 30000);
        assert_eq!(sample.pressure.cooked, 0.0);
    }
}
