//! Blocking I2C bus sharing
//!
//! The sensor registry and every expander own their transport. To put them
//! on one physical bus, wrap the bus in a blocking mutex once and hand each
//! of them a [`SharedI2c`] handle.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::i2c::{ErrorType, I2c, Operation};

use crate::bus::MultiBus;

/// Handle to an I2C bus shared through an embassy blocking mutex.
///
/// The lock is held for exactly one transaction (or one bus selection). Bus
/// selection itself is shared state: a handle that selects a bus other than
/// bus 0 must select bus 0 again before another handle transacts, which the
/// registry always does.
///
/// # Example
///
/// ```
/// use core::cell::RefCell;
/// use embassy_sync::blocking_mutex::Mutex;
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use envbus_core::bus::MultiBus;
/// use envbus_core::shared_bus::SharedI2c;
///
/// fn share<B: MultiBus>(bus: B) {
///     let shared = Mutex::<NoopRawMutex, _>::new(RefCell::new(bus));
///     let _sensors = SharedI2c::new(&shared);
///     let _expander = SharedI2c::new(&shared);
/// }
/// ```
pub struct SharedI2c<'a, M: RawMutex, T> {
    bus: &'a Mutex<M, RefCell<T>>,
}

impl<'a, M: RawMutex, T> SharedI2c<'a, M, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<M, RefCell<T>>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, T> Clone for SharedI2c<'_, M, T> {
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<M: RawMutex, T: ErrorType> ErrorType for SharedI2c<'_, M, T> {
    type Error = T::Error;
}

impl<M: RawMutex, T: I2c> I2c for SharedI2c<'_, M, T> {
    #[inline]
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock(|bus| bus.borrow_mut().read(address, read))
    }

    #[inline]
    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock(|bus| bus.borrow_mut().write(address, write))
    }

    #[inline]
    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus
            .lock(|bus| bus.borrow_mut().write_read(address, write, read))
    }

    #[inline]
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus
            .lock(|bus| bus.borrow_mut().transaction(address, operations))
    }
}

impl<M: RawMutex, T: MultiBus> MultiBus for SharedI2c<'_, M, T> {
    fn bus_count(&self) -> u8 {
        self.bus.lock(|bus| bus.borrow().bus_count())
    }

    fn select_bus(&mut self, bus: u8) -> Result<(), Self::Error> {
        self.bus.lock(|inner| inner.borrow_mut().select_bus(bus))
    }
}
