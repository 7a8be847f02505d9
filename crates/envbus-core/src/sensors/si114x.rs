//! Si1145 / Si1146 / Si1147 UV index, visible and infrared light sensor (0x60).
//!
//! The chip runs an internal sequencer programmed through a parameter RAM.
//! Commands are acknowledged by a change of the response counter, so every
//! command waits for the counter to settle, issues the command and then
//! waits for the counter to move. All waits are bounded.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

use super::{Context, Value};
use crate::bus::{Retry, poll_until};
use crate::error::Error;

// Registers
const REG_PART_ID: u8 = 0x00;
const REG_INT_CFG: u8 = 0x03;
const REG_IRQ_ENABLE: u8 = 0x04;
const REG_HW_KEY: u8 = 0x07;
const REG_MEAS_RATE_LOW: u8 = 0x08;
const REG_MEAS_RATE_HIGH: u8 = 0x09;
const REG_UCOEF: [u8; 4] = [0x13, 0x14, 0x15, 0x16];
const REG_PARAM_WR: u8 = 0x17;
const REG_COMMAND: u8 = 0x18;
const REG_RESPONSE: u8 = 0x20;
const REG_ALS_VIS_DATA: u8 = 0x22;
const REG_ALS_IR_DATA: u8 = 0x24;
const REG_AUX_DATA: u8 = 0x2c;
const REG_CHIP_STAT: u8 = 0x30;

// Parameter RAM
const PARAM_CHLIST: u8 = 0x01;
const PARAM_PSLED12_SELECT: u8 = 0x02;
const PARAM_PSLED3_SELECT: u8 = 0x03;
const PARAM_ALS_ENCODING: u8 = 0x06;
const PARAM_ALS_IR_ADCMUX: u8 = 0x0e;
const PARAM_AUX_ADCMUX: u8 = 0x0f;

// Commands
const CMD_NOP: u8 = 0x00;
const CMD_RESET: u8 = 0x01;
const CMD_PSALS_PAUSE: u8 = 0x0b;
const CMD_PSALS_AUTO: u8 = 0x0f;
const CMD_PARAM_SET: u8 = 0xa0;

const HW_KEY: u8 = 0x17;
const CHIP_STAT_SLEEP: u8 = 0x01;
/// Default UV coefficients from the datasheet.
const UCOEF: [u8; 4] = [0x7b, 0x6b, 0x01, 0x00];
/// Measurement interval in 31.25 µs steps.
const MEASURE_RATE: u16 = 16384;
/// UV index, visible and infrared.
const CHANNELS: u8 = 0b1011_0000;
/// Ties the AUX ADC input to ground.
const AUX_ADCMUX_GND: u8 = 0x65;

const ATTEMPTS: u32 = 16;
const RETRY: Retry = Retry::new(ATTEMPTS, 1);

fn read_register<I: I2c, D>(ctx: &mut Context<'_, I, D>, register: u8) -> Result<u8, Error> {
    ctx.device.read_register(register)
}

fn read_word<I: I2c, D>(ctx: &mut Context<'_, I, D>, register: u8) -> Result<u16, Error> {
    let low = read_register(ctx, register)?;
    let high = read_register(ctx, register + 1)?;
    Ok(u16::from_be_bytes([high, low]))
}

fn write_register<I: I2c, D>(
    ctx: &mut Context<'_, I, D>,
    register: u8,
    value: u8,
) -> Result<(), Error> {
    ctx.device.write_register(register, value)
}

fn wait_idle<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    let Context { device, delay, .. } = ctx;

    poll_until(&mut **delay, RETRY, Error::Device(1), || {
        Ok((device.read_register(REG_CHIP_STAT)? == CHIP_STAT_SLEEP).then_some(()))
    })
}

/// Issue `command` and return the new response register value.
///
/// A NOP clears the response register without acknowledging, so its result
/// is the value seen before the command.
fn send_command<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>, command: u8) -> Result<u8, Error> {
    let mut previous = read_register(ctx, REG_RESPONSE)?;

    if command == CMD_NOP {
        wait_idle(ctx)?;
        write_register(ctx, REG_COMMAND, command)?;
        return Ok(previous);
    }

    let mut settled = false;
    for _ in 0..ATTEMPTS {
        wait_idle(ctx)?;

        let response = read_register(ctx, REG_RESPONSE)?;
        if response == previous {
            settled = true;
            break;
        }

        previous = response;
        ctx.delay.delay_ms(RETRY.pause_ms);
    }

    if !settled {
        return Err(Error::Device(1));
    }

    write_register(ctx, REG_COMMAND, command)?;

    let Context { device, delay, .. } = ctx;
    poll_until(&mut **delay, RETRY, Error::Device(2), || {
        let response = device.read_register(REG_RESPONSE)?;
        Ok((response != previous).then_some(response))
    })
}

fn set_param<I: I2c, D: DelayNs>(
    ctx: &mut Context<'_, I, D>,
    param: u8,
    value: u8,
) -> Result<(), Error> {
    wait_idle(ctx)?;
    write_register(ctx, REG_PARAM_WR, value)?;

    let response = send_command(ctx, CMD_PARAM_SET | (param & 0x1f))?;

    match response & 0xf0 {
        0 => Ok(()),
        0x80 => {
            debug!("si114x: parameter {param:#04x} rejected");
            let _ = send_command(ctx, CMD_NOP);
            Err(Error::Device(1))
        }
        _ => {
            // Counter overflow, clear it
            let _ = send_command(ctx, CMD_NOP);
            Ok(())
        }
    }
}

/// Start or pause autonomous measurements.
fn start_stop<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>, start: bool) -> Result<(), Error> {
    let command = if start { CMD_PSALS_AUTO } else { CMD_PSALS_PAUSE };

    for _ in 0..ATTEMPTS {
        let mut cleared = false;
        for _ in 0..ATTEMPTS {
            if read_register(ctx, REG_RESPONSE)? == 0 {
                cleared = true;
                break;
            }

            send_command(ctx, CMD_NOP)?;
            ctx.delay.delay_ms(RETRY.pause_ms);
        }

        if !cleared {
            return Err(Error::Device(5));
        }

        send_command(ctx, command)?;

        let Context { device, delay, .. } = &mut *ctx;
        let response = poll_until(&mut **delay, RETRY, Error::Device(5), || {
            let response = device.read_register(REG_RESPONSE)?;
            Ok((response != 0).then_some(response))
        })?;

        if response == 1 {
            break;
        }
    }

    Ok(())
}

fn reset<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    ctx.delay.delay_ms(25);
    write_register(ctx, REG_COMMAND, CMD_RESET)?;
    ctx.delay.delay_ms(20);
    write_register(ctx, REG_HW_KEY, HW_KEY)
}

pub fn init<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<(), Error> {
    let part = read_register(ctx, REG_PART_ID)?;
    if !(0x45..=0x47).contains(&part) {
        return Err(Error::Device(1));
    }

    start_stop(ctx, false)?;
    reset(ctx)?;

    write_register(ctx, REG_INT_CFG, 0x00)?;
    write_register(ctx, REG_IRQ_ENABLE, 0x00)?;
    write_register(ctx, REG_HW_KEY, HW_KEY)?;

    let [rate_high, rate_low] = MEASURE_RATE.to_be_bytes();
    write_register(ctx, REG_MEAS_RATE_LOW, rate_low)?;
    write_register(ctx, REG_MEAS_RATE_HIGH, rate_high)?;

    for (register, value) in REG_UCOEF.into_iter().zip(UCOEF) {
        write_register(ctx, register, value)?;
    }

    // All LEDs off, low sensitivity ADC, small IR photodiode
    set_param(ctx, PARAM_PSLED12_SELECT, 0x00)?;
    set_param(ctx, PARAM_PSLED3_SELECT, 0x00)?;
    set_param(ctx, PARAM_ALS_ENCODING, 0x00)?;
    set_param(ctx, PARAM_ALS_IR_ADCMUX, 0x00)?;
    set_param(ctx, PARAM_AUX_ADCMUX, AUX_ADCMUX_GND)?;
    set_param(ctx, PARAM_CHLIST, CHANNELS)?;

    start_stop(ctx, true)
}

pub fn read_visible<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let raw = f64::from(read_word(ctx, REG_ALS_VIS_DATA)?);
    Ok(Value::new(raw, raw))
}

pub fn read_infrared<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let raw = f64::from(read_word(ctx, REG_ALS_IR_DATA)?);
    Ok(Value::new(raw, raw))
}

/// UV index, reported by the chip in hundredths.
pub fn read_ultraviolet<I: I2c, D: DelayNs>(ctx: &mut Context<'_, I, D>) -> Result<Value, Error> {
    let raw = f64::from(read_word(ctx, REG_AUX_DATA)?);
    Ok(Value::new(raw, raw / 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Device;
    use crate::config::Flags;
    use crate::sensors::DetectionState;
    use crate::sim::{NoopDelay, SimBus};

    fn run<T>(bus: &mut SimBus, f: impl FnOnce(&mut Context<'_, SimBus, NoopDelay>) -> T) -> T {
        let detection = DetectionState::new();
        let mut delay = NoopDelay;
        let mut ctx = Context {
            device: Device::new(bus, 0x60),
            delay: &mut delay,
            bus: 0,
            detection: &detection,
            flags: Flags::default(),
        };
        f(&mut ctx)
    }

    #[test]
    fn unknown_part_id_is_rejected() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x60).respond(&[0x32]);

        assert_eq!(run(&mut bus, |ctx| init(ctx)), Err(Error::Device(1)));
    }

    #[test]
    fn command_waits_for_response_counter() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x60)
            .respond(&[0x00]) // response before
            .respond(&[0x01]) // chip idle
            .respond(&[0x00]) // response settled
            .respond(&[0x00]) // not acknowledged yet
            .respond(&[0x01]); // acknowledged

        assert_eq!(run(&mut bus, |ctx| send_command(ctx, CMD_PSALS_AUTO)), Ok(0x01));
        assert_eq!(
            bus.writes_to(0x60),
            [&[0x20][..], &[0x30], &[0x20], &[0x18, 0x0f], &[0x20], &[0x20]]
        );
    }

    #[test]
    fn command_times_out_when_never_acknowledged() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x60)
            .respond(&[0x00])
            .respond(&[0x01])
            .respond(&[0x00])
            .respond_always(&[0x00]);

        assert_eq!(
            run(&mut bus, |ctx| send_command(ctx, CMD_PSALS_AUTO)),
            Err(Error::Device(2))
        );
    }

    #[test]
    fn rejected_parameter_is_a_device_error() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x60)
            .respond(&[0x01]) // idle before PARAM_WR
            .respond(&[0x00])
            .respond(&[0x01])
            .respond(&[0x00])
            .respond(&[0x80]) // invalid setting
            .respond(&[0x80]) // NOP: response before
            .respond(&[0x01]); // NOP: idle

        assert_eq!(
            run(&mut bus, |ctx| set_param(ctx, PARAM_CHLIST, 0xff)),
            Err(Error::Device(1))
        );
        assert_eq!(bus.writes_to(0x60).last(), Some(&&[0x18, 0x00][..]));
    }

    #[test]
    fn ultraviolet_index_is_in_hundredths() {
        let mut bus = SimBus::new(1);
        bus.device(0, 0x60).respond(&[0xf4]).respond(&[0x01]);

        let value = run(&mut bus, |ctx| read_ultraviolet(ctx)).unwrap();
        assert_eq!(value, Value::new(500.0, 5.0));
        assert_eq!(bus.writes_to(0x60), [&[0x2c][..], &[0x2d]]);
    }
}
