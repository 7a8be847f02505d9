//! Text and HTML sensor reports
//!
//! The line layout is parsed by existing dashboards, so field order and the
//! literal tokens (`[`, `]`, `error`, the table cell markup) are fixed.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;

use crate::bus::MultiBus;
use crate::config::ConfigStore;
use crate::error::Error;
use crate::registry::SensorRegistry;
use crate::sensors::SensorId;

/// Report layout switches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Append uncalibrated and raw values, error details and calibration.
    pub verbose: bool,
    /// Emit table cells instead of a text line.
    pub html: bool,
}

impl ReportOptions {
    pub const TEXT: Self = Self {
        verbose: false,
        html: false,
    };

    pub const fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub const fn html(mut self) -> Self {
        self.html = true;
        self
    }
}

impl<I: MultiBus, D: DelayNs> SensorRegistry<I, D> {
    /// Read the sensor with table index `index` on `bus` and write a report.
    ///
    /// Returns `Ok(false)` when the sensor index is unknown or the bus
    /// cannot be selected. Both cases are also described in `dst`. A failed
    /// read is still a report and returns `Ok(true)`. `Err` only means
    /// `dst` refused the output.
    pub fn report<W: Write, C: ConfigStore>(
        &mut self,
        dst: &mut W,
        bus: u8,
        index: u8,
        options: ReportOptions,
        config: &C,
    ) -> Result<bool, Error> {
        let Some(sensor) = SensorId::from_index(index) else {
            writeln!(dst, "i2c sensor read: sensor #{index} unknown")?;
            return Ok(false);
        };

        if let Err(e) = self.select(bus) {
            write!(dst, "i2c sensor read: select bus #{bus} error ({e})")?;
            return Ok(false);
        }

        let descriptor = sensor.descriptor();
        let label = descriptor.measurement.label();
        let precision = descriptor.precision;

        let header = if options.html {
            write!(
                dst,
                "{bus}</td><td align=\"right\">{index}</td><td align=\"right\">0x{:02x}</td>\
                 <td>{}</td><td>{label}</td>",
                descriptor.address, descriptor.name
            )
        } else {
            let marker = if self.detection().on_any_bus(sensor) { '+' } else { ' ' };
            write!(
                dst,
                "{marker} sensor {bus}/{index:02}@{:02x}: {}, {label}: ",
                descriptor.address, descriptor.name
            )
        };

        // The bus is selected at this point and only decode() restores it
        if let Err(e) = header {
            self.restore();
            return Err(e.into());
        }

        match self.decode(bus, sensor, config) {
            Ok(reading) => {
                if options.html {
                    write!(
                        dst,
                        "<td align=\"right\">{:.precision$} {}",
                        reading.calibrated, descriptor.unit
                    )?;
                } else {
                    write!(dst, "[{:.precision$}] {}", reading.calibrated, descriptor.unit)?;
                }

                if options.verbose {
                    write!(
                        dst,
                        " (uncalibrated: {:.precision$}, raw: {:.0})",
                        reading.value.cooked, reading.value.raw
                    )?;
                }
            }
            Err(e) => {
                dst.write_str("error")?;
                if options.verbose {
                    write!(dst, " ({e})")?;
                }
            }
        }

        if options.verbose {
            let calibration = config.calibration(bus, sensor);
            write!(
                dst,
                ", calibration: factor={:.4}, offset={:.4}",
                calibration.factor(),
                calibration.offset()
            )?;
        }

        Ok(true)
    }
}
