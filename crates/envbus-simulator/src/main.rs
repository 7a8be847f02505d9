//! Desktop simulator for envbus.
//!
//! Wires `envbus-core` to a scripted two-bus I2C transport, runs a detection
//! sweep, prints a report line for every detected sensor and then polls a
//! simulated MCP23017 with a counter input and an output pin.
//!
//! Set `RUST_LOG=debug` to see detection failures during the sweep.

use core::cell::RefCell;
use std::time::Duration;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::delay::DelayNs;
use log::{error, info};

use envbus_core::config::{Calibration, Flag, SensorConfig};
use envbus_core::expander::{Mcp23017, PinConfig, PinMode};
use envbus_core::registry::SensorRegistry;
use envbus_core::report::ReportOptions;
use envbus_core::sensors::SensorId;
use envbus_core::sensors::crc::crc8;
use envbus_core::shared_bus::SharedI2c;
use envbus_core::sim::SimBus;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const BUS_COUNT: u8 = 2;

const EXPANDER_ADDRESS: u8 = 0x20;
const COUNTER_PIN: u8 = 0;
const OUTPUT_PIN: u8 = 8;

/// Expander poll period.
const TICK: Duration = Duration::from_millis(10);
const TICKS: u32 = 24;

/// Every third tick delivers a falling edge on the counter pin.
const EDGE_EVERY: u32 = 3;

// ---------------------------------------------------------------------------
// Scripted hardware
// ---------------------------------------------------------------------------

/// Delay backed by the host scheduler.
struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// HTU21 measurement frame with status bits clear and a valid CRC.
fn htu21_frame(raw: u16) -> [u8; 3] {
    let [high, low] = (raw & 0xfffc).to_be_bytes();
    [high, low, crc8(&[high, low])]
}

/// Attach the sensors and the expander to a fresh transport.
fn build_bus() -> SimBus {
    let mut bus = SimBus::new(BUS_COUNT);

    // LM75 on bus 0: config echo, both T_os patterns, then 22.5 C forever
    bus.device(0, 0x48)
        .respond(&[0x60])
        .respond(&[0xff, 0x00])
        .respond(&[0x00, 0x00])
        .respond_always(&[0x16, 0x80]);

    // BH1750 on bus 0: 300 counts
    bus.device(0, 0x23).respond_always(&[0x01, 0x2c]);

    // HTU21 behind the multiplexer on bus 1: init, temperature report,
    // humidity report (temperature first)
    let temperature = htu21_frame(0x6838);
    let humidity = htu21_frame(0x4e84);
    bus.device(1, 0x40)
        .respond(&temperature)
        .respond(&temperature)
        .respond(&temperature)
        .respond(&humidity);

    script_expander(&mut bus);
    bus
}

fn script_expander(bus: &mut SimBus) {
    let device = bus.device(0, EXPANDER_ADDRESS);

    // IOCON echo through bank B
    device.respond(&[0x12]);

    // Counter pin with pull-up: seven clears, IODIR, GPPU, GPINTEN
    // Output pin: seven clears, IODIR
    for _ in 0..(10 + 8) {
        device.respond(&[0x00]);
    }

    for tick in 0..TICKS {
        let edge = if tick % EDGE_EVERY == 0 { 1 << COUNTER_PIN } else { 0 };
        // INTF A/B, INTCAP A/B
        device
            .respond(&[edge])
            .respond(&[0x00])
            .respond(&[0x00])
            .respond(&[0x00]);
    }

    // describe_pin: counter GPIO, then output GPIO and OLAT
    device
        .respond(&[0x01])
        .respond(&[0x01])
        .respond(&[0x01]);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn build_config() -> SensorConfig {
    let mut config = SensorConfig::new();
    config.set_flag(Flag::BhHighSensitivity, true);

    let htu21 = Calibration::new(1000, -500);
    if let Err(e) = config.set_calibration(1, SensorId::Htu21Temperature, htu21) {
        error!("Failed to store calibration: {}", e);
    }

    // Round trip through the persisted form, as a device would on boot
    match config.to_bytes() {
        Ok(bytes) => {
            info!("Configuration blob is {} bytes", bytes.len());
            match SensorConfig::from_bytes(&bytes) {
                Ok(restored) => restored,
                Err(e) => {
                    error!("Failed to decode configuration: {}", e);
                    config
                }
            }
        }
        Err(e) => {
            error!("Failed to encode configuration: {}", e);
            config
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting envbus simulator ({} buses)", BUS_COUNT);

    let config = build_config();
    let shared = Mutex::<CriticalSectionRawMutex, _>::new(RefCell::new(build_bus()));

    // --- Sensor sweep -----------------------------------------------------
    let mut registry = SensorRegistry::new(SharedI2c::new(&shared), StdDelay);
    let detected = registry.init_all(&config);
    info!("{} sensor channels detected", detected);

    // --- Reports ------------------------------------------------------------
    for bus in 0..registry.bus_count() {
        for sensor in SensorId::ALL {
            if !registry.is_detected(bus, sensor.index()) {
                continue;
            }

            let options = if sensor == SensorId::Htu21Temperature {
                ReportOptions::TEXT.verbose()
            } else {
                ReportOptions::TEXT
            };

            let mut line = String::new();
            match registry.report(&mut line, bus, sensor.index(), options, &config) {
                Ok(_) => println!("{line}"),
                Err(e) => error!("Report failed: {}", e),
            }
        }
    }

    // --- Expander -----------------------------------------------------------
    let mut expander = Mcp23017::new(SharedI2c::new(&shared), EXPANDER_ADDRESS);

    if let Err(e) = expander.init() {
        error!("Expander init failed: {}", e);
        return;
    }

    let counter = PinConfig::new(PinMode::Counter)
        .with_pullup()
        .with_debounce(20);

    let output = PinConfig::new(PinMode::OutputDigital);

    if let Err(e) = expander
        .configure_pin(COUNTER_PIN, counter)
        .and_then(|()| expander.configure_pin(OUTPUT_PIN, output))
    {
        error!("Pin configuration failed: {}", e);
        return;
    }

    let tick_ms = TICK.as_millis() as u32;
    for _ in 0..TICKS {
        match expander.poll(tick_ms) {
            Ok(true) => info!("Counter pin {} triggered", COUNTER_PIN),
            Ok(false) => {}
            Err(e) => error!("Expander poll failed: {}", e),
        }
        std::thread::sleep(TICK);
    }

    if let Err(e) = expander.write_pin(OUTPUT_PIN, 1) {
        error!("Output write failed: {}", e);
    }

    for pin in [COUNTER_PIN, OUTPUT_PIN] {
        let mut line = String::new();
        match expander.describe_pin(&mut line, pin) {
            Ok(()) => println!("pin {pin:>2}: {line}"),
            Err(e) => error!("Pin {} description failed: {}", pin, e),
        }
    }

    match expander.read_pin(COUNTER_PIN) {
        Ok(count) => info!("Counted {} edges in {} ticks", count, TICKS),
        Err(e) => error!("Counter read failed: {}", e),
    }

    info!("Simulator exiting");
}
