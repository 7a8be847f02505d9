//! Bus access helpers
//!
//! [`MultiBus`] extends an `embedded-hal` I2C bus with bus (mux channel)
//! selection. [`Device`] binds a bus to one 7-bit address and maps transport
//! errors into [`Error`]. [`poll_until`] and [`retry_on_error`] implement the
//! bounded busy-wait loops several chips need.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorType, I2c, Operation};

use crate::error::Error;

/// Maximum number of buses a registry tracks.
pub const MAX_BUSES: u8 = 8;

/// An I2C bus that can switch between several downstream buses.
///
/// Bus 0 is the default bus. The registry always returns to it after a
/// transaction sequence so that other users of the transport (such as GPIO
/// expanders) find it selected.
pub trait MultiBus: I2c {
    /// Number of selectable buses.
    fn bus_count(&self) -> u8;

    /// Route subsequent transactions to `bus`.
    fn select_bus(&mut self, bus: u8) -> Result<(), Self::Error>;
}

/// Adapter for a plain I2C bus without a multiplexer.
pub struct SingleBus<I> {
    i2c: I,
}

impl<I> SingleBus<I> {
    pub const fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: ErrorType> ErrorType for SingleBus<I> {
    type Error = I::Error;
}

impl<I: I2c> I2c for SingleBus<I> {
    #[inline]
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.i2c.transaction(address, operations)
    }
}

impl<I: I2c> MultiBus for SingleBus<I> {
    fn bus_count(&self) -> u8 {
        1
    }

    fn select_bus(&mut self, _bus: u8) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A bus bound to one device address.
pub struct Device<'a, I> {
    i2c: &'a mut I,
    address: u8,
}

impl<'a, I: I2c> Device<'a, I> {
    pub fn new(i2c: &'a mut I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Borrow the same bus at a different address.
    ///
    /// Used by init routines that need to look at a neighbouring address, e.g. to
    /// tell chips sharing 0x38/0x39 apart.
    pub fn at(&mut self, address: u8) -> Device<'_, I> {
        Device {
            i2c: &mut *self.i2c,
            address,
        }
    }

    /// Write `bytes` in a single transaction.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.i2c.write(self.address, bytes).map_err(Error::from_bus)
    }

    /// Read `buffer.len()` bytes in a single transaction.
    pub fn receive(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        self.i2c.read(self.address, buffer).map_err(Error::from_bus)
    }

    /// Write a register pointer, then read with a repeated start.
    pub fn send_receive(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Error> {
        self.i2c
            .write_read(self.address, &[register], buffer)
            .map_err(Error::from_bus)
    }

    /// Select `register` with a separate write, then read one byte.
    pub fn read_register(&mut self, register: u8) -> Result<u8, Error> {
        let mut buffer = [0u8; 1];
        self.send(&[register])?;
        self.receive(&mut buffer)?;
        Ok(buffer[0])
    }

    /// Write one byte to `register`.
    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), Error> {
        self.send(&[register, value])
    }
}

/// Bounds a busy-wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    pub attempts: u32,
    pub pause_ms: u32,
}

impl Retry {
    pub const fn new(attempts: u32, pause_ms: u32) -> Self {
        Self { attempts, pause_ms }
    }
}

/// Poll until `poll` reports a value.
///
/// `Ok(None)` means "not ready yet" and is followed by a pause. Errors abort
/// immediately. Running out of attempts yields `timeout`.
pub fn poll_until<D, T, F>(
    delay: &mut D,
    retry: Retry,
    timeout: Error,
    mut poll: F,
) -> Result<T, Error>
where
    D: DelayNs,
    F: FnMut() -> Result<Option<T>, Error>,
{
    for _ in 0..retry.attempts {
        if let Some(value) = poll()? {
            return Ok(value);
        }
        delay.delay_ms(retry.pause_ms);
    }

    Err(timeout)
}

/// Repeat `attempt` until it succeeds.
///
/// Every failure is followed by a pause. When all attempts fail, the last
/// error is returned.
pub fn retry_on_error<D, T, F>(delay: &mut D, retry: Retry, mut attempt: F) -> Result<T, Error>
where
    D: DelayNs,
    F: FnMut() -> Result<T, Error>,
{
    let mut last = Error::AddressNak;

    for _ in 0..retry.attempts {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(e) => last = e,
        }
        delay.delay_ms(retry.pause_ms);
    }

    Err(last)
}
