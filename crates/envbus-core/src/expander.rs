//! MCP23017 16-pin GPIO expander
//!
//! Pins 0..=7 live in bank A, pins 8..=15 in bank B. Each pin runs in one of
//! four modes: disabled, digital input, digital output or falling-edge
//! counter. Counters are driven by [`Mcp23017::poll`], which must be called
//! periodically with the elapsed time since the previous call.
//!
//! Output levels are kept in a per-bank latch cache, so setting one pin
//! never needs a read-modify-write of the GPIO register.

use core::fmt::Write;

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::bus::Device;
use crate::error::Error;

pub const PIN_COUNT: u8 = 16;

// Register addresses in IOCON.BANK = 0 layout; bank B is at +1
const IODIR: u8 = 0x00;
const IPOL: u8 = 0x02;
const GPINTEN: u8 = 0x04;
const DEFVAL: u8 = 0x06;
const INTCON: u8 = 0x08;
const IOCON: u8 = 0x0a;
const GPPU: u8 = 0x0c;
const INTF: u8 = 0x0e;
const INTCAP: u8 = 0x10;
const GPIO: u8 = 0x12;
const OLAT: u8 = 0x14;

const IOCON_INTPOL: u8 = 1 << 1;
const IOCON_DISSLW: u8 = 1 << 4;

const INVALID_MODE: &str = "invalid mode for this pin";

/// Requested behaviour of one pin.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    #[default]
    Disabled,
    InputDigital,
    OutputDigital,
    /// Counts falling edges, with debounce.
    Counter,
    /// Not supported by this chip.
    InputAnalog,
    /// Not supported by this chip.
    OutputPwm,
}

impl PinMode {
    const fn is_supported(self) -> bool {
        !matches!(self, Self::InputAnalog | Self::OutputPwm)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub mode: PinMode,
    pub pullup: bool,
    /// Counter pins ignore further edges for this long after counting one.
    pub debounce_ms: u32,
}

impl PinConfig {
    pub const fn new(mode: PinMode) -> Self {
        Self {
            mode,
            pullup: false,
            debounce_ms: 0,
        }
    }

    pub const fn with_pullup(mut self) -> Self {
        self.pullup = true;
        self
    }

    pub const fn with_debounce(mut self, debounce_ms: u32) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PinState {
    config: PinConfig,
    counter: u32,
    /// Remaining debounce time.
    debounce_ms: u32,
}

/// Bank index and bit mask of a pin.
#[derive(Debug, Clone, Copy)]
struct Location {
    bank: u8,
    mask: u8,
}

impl Location {
    fn of(pin: u8) -> Result<Self, Error> {
        if pin >= PIN_COUNT {
            return Err(Error::InvalidPin(pin));
        }

        Ok(Self {
            bank: pin >> 3,
            mask: 1 << (pin & 0x07),
        })
    }
}

const fn on_off(level: bool) -> &'static str {
    if level { "on" } else { "off" }
}

/// One MCP23017 at a fixed address.
pub struct Mcp23017<I> {
    i2c: I,
    address: u8,
    pins: [PinState; PIN_COUNT as usize],
    latch: [u8; 2],
}

impl<I: I2c> Mcp23017<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            pins: [PinState::default(); PIN_COUNT as usize],
            latch: [0; 2],
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I {
        self.i2c
    }

    fn device(&mut self) -> Device<'_, I> {
        Device::new(&mut self.i2c, self.address)
    }

    fn clear_set(&mut self, register: u8, clear: u8, set: u8) -> Result<(), Error> {
        let mut device = self.device();
        let value = device.read_register(register)?;
        device.write_register(register, (value & !clear) | set)
    }

    /// Program IOCON and reset all software pin state.
    ///
    /// IOCON is written through its bank A address and read back through the
    /// bank B alias. Anything that does not mirror the value is not an
    /// MCP23017.
    pub fn init(&mut self) -> Result<(), Error> {
        let iocon = IOCON_DISSLW | IOCON_INTPOL;
        let mut echo = [0u8; 1];

        let mut device = self.device();
        device.write_register(IOCON, iocon)?;
        device.send_receive(IOCON + 1, &mut echo)?;

        if echo[0] != iocon {
            return Err(Error::Device(1));
        }

        for pin in self.pins.iter_mut() {
            pin.counter = 0;
            pin.debounce_ms = 0;
        }
        self.latch = [0; 2];

        info!("MCP23017 initialized at {:#04x}", self.address);
        Ok(())
    }

    /// Program the registers of one pin for `config`.
    pub fn configure_pin(&mut self, pin: u8, config: PinConfig) -> Result<(), Error> {
        let Location { bank, mask } = Location::of(pin)?;

        if !config.mode.is_supported() {
            return Err(Error::Configuration(INVALID_MODE));
        }

        self.pins[usize::from(pin)] = PinState::default();
        self.latch[usize::from(bank)] &= !mask;

        for register in [IPOL, GPINTEN, DEFVAL, INTCON, GPPU, GPIO, OLAT] {
            self.clear_set(register + bank, mask, 0)?;
        }

        match config.mode {
            PinMode::InputDigital | PinMode::Counter => {
                self.clear_set(IODIR + bank, 0, mask)?;

                if config.pullup {
                    self.clear_set(GPPU + bank, 0, mask)?;
                }

                if config.mode == PinMode::Counter {
                    self.clear_set(GPINTEN + bank, 0, mask)?;
                }
            }
            PinMode::OutputDigital => self.clear_set(IODIR + bank, mask, 0)?,
            _ => {}
        }

        self.pins[usize::from(pin)].config = config;
        Ok(())
    }

    /// Sample the interrupt registers and advance the counter pins.
    ///
    /// Returns whether any counter was incremented.
    pub fn poll(&mut self, tick_ms: u32) -> Result<bool, Error> {
        let (flags, captures) = self.sample_interrupts().map_err(|e| {
            warn!("MCP23017 at {:#04x}: poll failed: {}", self.address, e);
            e
        })?;

        let mut triggered = false;

        for (pin, state) in self.pins.iter_mut().enumerate() {
            if state.config.mode != PinMode::Counter {
                continue;
            }

            if state.debounce_ms != 0 {
                state.debounce_ms = state.debounce_ms.saturating_sub(tick_ms);
                continue;
            }

            let bank = pin >> 3;
            let mask = 1 << (pin & 0x07);

            // Inputs idle high through the pull-up, so count falling edges only
            if flags[bank] & mask != 0 && captures[bank] & mask == 0 {
                state.counter = state.counter.wrapping_add(1);
                state.debounce_ms = state.config.debounce_ms;
                triggered = true;
            }
        }

        Ok(triggered)
    }

    /// Returns INTF and INTCAP, both banks.
    fn sample_interrupts(&mut self) -> Result<([u8; 2], [u8; 2]), Error> {
        let mut device = self.device();

        let flags = [device.read_register(INTF)?, device.read_register(INTF + 1)?];
        let captures = [
            device.read_register(INTCAP)?,
            device.read_register(INTCAP + 1)?,
        ];

        Ok((flags, captures))
    }

    /// Digital pins return the live level (0 or 1), counter pins the count.
    pub fn read_pin(&mut self, pin: u8) -> Result<u32, Error> {
        let Location { bank, mask } = Location::of(pin)?;
        let state = self.pins[usize::from(pin)];

        match state.config.mode {
            PinMode::InputDigital | PinMode::OutputDigital => {
                let level = self.device().read_register(GPIO + bank)?;
                Ok(u32::from(level & mask != 0))
            }
            PinMode::Counter => Ok(state.counter),
            _ => Err(Error::Configuration(INVALID_MODE)),
        }
    }

    /// Output pins take any non-zero value as high, counter pins overwrite
    /// the count.
    pub fn write_pin(&mut self, pin: u8, value: u32) -> Result<(), Error> {
        let Location { bank, mask } = Location::of(pin)?;

        match self.pins[usize::from(pin)].config.mode {
            PinMode::OutputDigital => {
                let bank_index = usize::from(bank);
                if value != 0 {
                    self.latch[bank_index] |= mask;
                } else {
                    self.latch[bank_index] &= !mask;
                }

                let latch = self.latch[bank_index];
                self.device().write_register(GPIO + bank, latch)
            }
            PinMode::Counter => {
                self.pins[usize::from(pin)].counter = value;
                Ok(())
            }
            _ => Err(Error::Configuration(INVALID_MODE)),
        }
    }

    /// Append a diagnostic line for `pin` to `dst`.
    pub fn describe_pin<W: Write>(&mut self, dst: &mut W, pin: u8) -> Result<(), Error> {
        let Location { bank, mask } = Location::of(pin)?;
        let state = self.pins[usize::from(pin)];

        match state.config.mode {
            PinMode::InputDigital => {
                let io = self.device().read_register(GPIO + bank)? & mask != 0;
                write!(dst, "current io: {}", on_off(io))?;
            }
            PinMode::Counter => {
                let io = self.device().read_register(GPIO + bank)? & mask != 0;
                write!(
                    dst,
                    "current io: {}, debounce: {}",
                    on_off(io),
                    state.debounce_ms
                )?;
            }
            PinMode::OutputDigital => {
                let mut device = self.device();
                let io = device.read_register(GPIO + bank)? & mask != 0;
                let latch = device.read_register(OLAT + bank)? & mask != 0;
                let cached = self.latch[usize::from(bank)] & mask != 0;

                write!(
                    dst,
                    "current latch: {}, io: {}, cache: {}",
                    on_off(latch),
                    on_off(io),
                    on_off(cached)
                )?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Current count of a counter pin, `None` for other modes.
    pub fn counter(&self, pin: u8) -> Option<u32> {
        self.pins
            .get(usize::from(pin))
            .filter(|state| state.config.mode == PinMode::Counter)
            .map(|state| state.counter)
    }

    pub fn pin_config(&self, pin: u8) -> Option<PinConfig> {
        self.pins.get(usize::from(pin)).map(|state| state.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;
    use alloc::string::String;

    const ADDRESS: u8 = 0x20;

    /// Reads issued by `configure_pin` before any mode specific step.
    const CLEAR_READS: usize = 7;

    fn script_reads(bus: &mut SimBus, count: usize) {
        let device = bus.device(0, ADDRESS);
        for _ in 0..count {
            device.respond(&[0x00]);
        }
    }

    fn script_poll(bus: &mut SimBus, intf: [u8; 2], intcap: [u8; 2]) {
        bus.device(0, ADDRESS)
            .respond(&[intf[0]])
            .respond(&[intf[1]])
            .respond(&[intcap[0]])
            .respond(&[intcap[1]]);
    }

    #[test]
    fn init_checks_iocon_through_bank_b() {
        let mut bus = SimBus::new(1);
        bus.device(0, ADDRESS).respond(&[0x12]);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        assert_eq!(expander.init(), Ok(()));
        drop(expander);

        assert_eq!(bus.writes_to(ADDRESS), [&[0x0a, 0x12][..], &[0x0b]]);
    }

    #[test]
    fn init_rejects_other_chips() {
        let mut bus = SimBus::new(1);
        bus.device(0, ADDRESS).respond(&[0x00]);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        assert_eq!(expander.init(), Err(Error::Device(1)));
    }

    #[test]
    fn unsupported_modes_fail_without_bus_traffic() {
        let mut bus = SimBus::new(1);
        bus.device(0, ADDRESS);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        for mode in [PinMode::InputAnalog, PinMode::OutputPwm] {
            assert_eq!(
                expander.configure_pin(4, PinConfig::new(mode)),
                Err(Error::Configuration(INVALID_MODE))
            );
        }
        assert_eq!(
            expander.configure_pin(16, PinConfig::new(PinMode::InputDigital)),
            Err(Error::InvalidPin(16))
        );
        drop(expander);

        assert_eq!(bus.transfer_count(), 0);
    }

    #[test]
    fn counter_pin_programs_bank_b() {
        let mut bus = SimBus::new(1);
        bus.device(0, ADDRESS).respond_always(&[0xff]);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        expander
            .configure_pin(9, PinConfig::new(PinMode::Counter).with_pullup())
            .unwrap();
        drop(expander);

        let writes: alloc::vec::Vec<&[u8]> = bus
            .writes_to(ADDRESS)
            .into_iter()
            .filter(|w| w.len() == 2)
            .collect();

        assert_eq!(
            writes,
            [
                &[0x03, 0xfd][..], // IPOL
                &[0x05, 0xfd],     // GPINTEN
                &[0x07, 0xfd],     // DEFVAL
                &[0x09, 0xfd],     // INTCON
                &[0x0d, 0xfd],     // GPPU
                &[0x13, 0xfd],     // GPIO
                &[0x15, 0xfd],     // OLAT
                &[0x01, 0xff],     // IODIR input
                &[0x0d, 0xff],     // GPPU on
                &[0x05, 0xff],     // GPINTEN on
            ]
        );
    }

    #[test]
    fn one_count_per_debounce_window() {
        let mut bus = SimBus::new(1);
        // configure: clears, IODIR, GPINTEN
        script_reads(&mut bus, CLEAR_READS + 2);
        for _ in 0..5 {
            script_poll(&mut bus, [0x08, 0x00], [0x00, 0x00]);
        }

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        expander
            .configure_pin(3, PinConfig::new(PinMode::Counter).with_debounce(30))
            .unwrap();

        assert_eq!(expander.poll(10), Ok(true));
        assert_eq!(expander.read_pin(3), Ok(1));

        // Edges inside the window are ignored while it runs down
        assert_eq!(expander.poll(10), Ok(false));
        assert_eq!(expander.poll(10), Ok(false));
        assert_eq!(expander.poll(10), Ok(false));
        assert_eq!(expander.read_pin(3), Ok(1));

        assert_eq!(expander.poll(10), Ok(true));
        assert_eq!(expander.counter(3), Some(2));
    }

    #[test]
    fn rising_edges_are_not_counted() {
        let mut bus = SimBus::new(1);
        script_reads(&mut bus, CLEAR_READS + 2);
        script_poll(&mut bus, [0x00, 0x01], [0x00, 0x01]);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        expander
            .configure_pin(8, PinConfig::new(PinMode::Counter))
            .unwrap();

        assert_eq!(expander.poll(10), Ok(false));
        assert_eq!(expander.read_pin(8), Ok(0));
    }

    #[test]
    fn counter_can_be_overwritten() {
        let mut bus = SimBus::new(1);
        script_reads(&mut bus, CLEAR_READS + 2);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        expander
            .configure_pin(0, PinConfig::new(PinMode::Counter))
            .unwrap();

        expander.write_pin(0, 1234).unwrap();
        assert_eq!(expander.read_pin(0), Ok(1234));
    }

    #[test]
    fn output_writes_only_touch_their_latch_bit() {
        let mut bus = SimBus::new(1);
        // three output pins: clears plus IODIR each
        script_reads(&mut bus, 3 * (CLEAR_READS + 1));

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        for pin in [0, 1, 8] {
            expander
                .configure_pin(pin, PinConfig::new(PinMode::OutputDigital))
                .unwrap();
        }

        expander.write_pin(0, 1).unwrap();
        expander.write_pin(1, 1).unwrap();
        expander.write_pin(1, 0).unwrap();
        expander.write_pin(8, 1).unwrap();
        drop(expander);

        let writes = bus.writes_to(ADDRESS);
        assert_eq!(
            writes[writes.len() - 4..],
            [&[0x12, 0x01][..], &[0x12, 0x03], &[0x12, 0x01], &[0x13, 0x01]]
        );
    }

    #[test]
    fn reconfigured_pin_drops_its_latch_bit() {
        let mut bus = SimBus::new(1);
        // two outputs, then pin 0 again
        script_reads(&mut bus, 3 * (CLEAR_READS + 1));

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        let output = PinConfig::new(PinMode::OutputDigital);
        expander.configure_pin(0, output).unwrap();
        expander.configure_pin(1, output).unwrap();

        expander.write_pin(0, 1).unwrap();
        expander.configure_pin(0, output).unwrap();
        expander.write_pin(1, 1).unwrap();
        drop(expander);

        let writes = bus.writes_to(ADDRESS);
        assert_eq!(writes.last(), Some(&&[0x12, 0x02][..]));
    }

    #[test]
    fn inputs_cannot_be_written() {
        let mut bus = SimBus::new(1);
        script_reads(&mut bus, CLEAR_READS + 1);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        expander
            .configure_pin(5, PinConfig::new(PinMode::InputDigital))
            .unwrap();

        assert_eq!(
            expander.write_pin(5, 1),
            Err(Error::Configuration(INVALID_MODE))
        );
        assert_eq!(expander.read_pin(6), Err(Error::Configuration(INVALID_MODE)));
    }

    #[test]
    fn describe_output_pin() {
        let mut bus = SimBus::new(1);
        script_reads(&mut bus, CLEAR_READS + 1);
        // GPIO then OLAT
        bus.device(0, ADDRESS).respond(&[0x00]).respond(&[0x04]);

        let mut expander = Mcp23017::new(&mut bus, ADDRESS);
        expander
            .configure_pin(2, PinConfig::new(PinMode::OutputDigital))
            .unwrap();

        let mut out = String::new();
        expander.describe_pin(&mut out, 2).unwrap();
        assert_eq!(out, "current latch: on, io: off, cache: off");
    }
}
