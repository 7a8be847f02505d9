//! Scripted I2C transport
//!
//! [`SimBus`] stands in for real hardware in host-side tests and in the
//! desktop simulator. Devices are attached per (bus, address). Writes always
//! succeed and are logged. Reads pop the next scripted response, or repeat a
//! fixed response once the queue is empty. Unattached addresses NACK.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::bus::MultiBus;

/// Transport error produced by [`SimBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError(pub ErrorKind);

impl i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// A logged write transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub bus: u8,
    pub address: u8,
    pub bytes: Vec<u8>,
}

/// One simulated device on the bus.
#[derive(Debug)]
pub struct SimDevice {
    bus: u8,
    address: u8,
    responses: VecDeque<Vec<u8>>,
    repeat: Option<Vec<u8>>,
    failure: Option<ErrorKind>,
}

impl SimDevice {
    fn new(bus: u8, address: u8) -> Self {
        Self {
            bus,
            address,
            responses: VecDeque::new(),
            repeat: None,
            failure: None,
        }
    }

    /// Queue the response for the next read.
    pub fn respond(&mut self, bytes: &[u8]) -> &mut Self {
        self.responses.push_back(bytes.to_vec());
        self
    }

    /// Response returned by every read once the queue is drained.
    pub fn respond_always(&mut self, bytes: &[u8]) -> &mut Self {
        self.repeat = Some(bytes.to_vec());
        self
    }

    /// Make every transfer to this device fail with `kind`.
    pub fn fail_with(&mut self, kind: ErrorKind) -> &mut Self {
        self.failure = Some(kind);
        self
    }

    pub fn recover(&mut self) -> &mut Self {
        self.failure = None;
        self
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    fn next_response(&mut self) -> Option<Vec<u8>> {
        self.responses.pop_front().or_else(|| self.repeat.clone())
    }
}

/// Scripted multi-bus I2C transport.
#[derive(Debug)]
pub struct SimBus {
    bus_count: u8,
    selected: u8,
    devices: Vec<SimDevice>,
    writes: Vec<Transfer>,
    reads: usize,
    select_failure: Option<(u8, ErrorKind)>,
}

impl SimBus {
    pub fn new(bus_count: u8) -> Self {
        Self {
            bus_count,
            selected: 0,
            devices: Vec::new(),
            writes: Vec::new(),
            reads: 0,
            select_failure: None,
        }
    }

    /// The device at (`bus`, `address`), attaching it first if needed.
    pub fn device(&mut self, bus: u8, address: u8) -> &mut SimDevice {
        let index = match self
            .devices
            .iter()
            .position(|d| d.bus == bus && d.address == address)
        {
            Some(index) => index,
            None => {
                self.devices.push(SimDevice::new(bus, address));
                self.devices.len() - 1
            }
        };

        &mut self.devices[index]
    }

    pub fn detach(&mut self, bus: u8, address: u8) {
        self.devices.retain(|d| !(d.bus == bus && d.address == address));
    }

    /// Make selecting `bus` fail with `kind`.
    pub fn fail_select(&mut self, bus: u8, kind: ErrorKind) {
        self.select_failure = Some((bus, kind));
    }

    pub fn selected_bus(&self) -> u8 {
        self.selected
    }

    pub fn writes(&self) -> &[Transfer] {
        &self.writes
    }

    /// Payloads written to `address`, in order.
    pub fn writes_to(&self, address: u8) -> Vec<&[u8]> {
        self.writes
            .iter()
            .filter(|t| t.address == address)
            .map(|t| t.bytes.as_slice())
            .collect()
    }

    /// Number of read operations served so far.
    pub fn read_count(&self) -> usize {
        self.reads
    }

    /// Total number of transfers (writes and reads) so far.
    pub fn transfer_count(&self) -> usize {
        self.writes.len() + self.reads
    }

    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.reads = 0;
    }
}

impl ErrorType for SimBus {
    type Error = SimError;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let bus = self.selected;
        let Some(device) = self
            .devices
            .iter_mut()
            .find(|d| d.bus == bus && d.address == address)
        else {
            return Err(SimError(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address,
            )));
        };

        if let Some(kind) = device.failure {
            return Err(SimError(kind));
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => self.writes.push(Transfer {
                    bus,
                    address,
                    bytes: bytes.to_vec(),
                }),
                Operation::Read(buffer) => {
                    let response = device.next_response().ok_or(SimError(ErrorKind::Other))?;
                    if response.len() != buffer.len() {
                        return Err(SimError(ErrorKind::Other));
                    }
                    buffer.copy_from_slice(&response);
                    self.reads += 1;
                }
            }
        }

        Ok(())
    }
}

impl MultiBus for SimBus {
    fn bus_count(&self) -> u8 {
        self.bus_count
    }

    fn select_bus(&mut self, bus: u8) -> Result<(), Self::Error> {
        if let Some((failing, kind)) = self.select_failure {
            if failing == bus {
                return Err(SimError(kind));
            }
        }

        self.selected = bus;
        Ok(())
    }
}

/// Delay that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
