//! Error taxonomy shared by the sensor decoders, the registry and the expander.

use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource};
use thiserror_no_std::Error;

/// Errors reported by envbus operations.
///
/// Every failure is reported upward as a value. The numeric discriminant of
/// [`Error::Device`] identifies which validation step failed and is meant for
/// diagnostics only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bus-level failure passed through from the transport.
    #[error("bus error: {0:?}")]
    Transport(ErrorKind),

    /// The expected device did not acknowledge its address.
    #[error("address not acknowledged")]
    AddressNak,

    /// Protocol-level validation failure (bad id, checksum, echo or busy timeout).
    #[error("device error {0}")]
    Device(u8),

    /// Invalid pin mode request.
    #[error("configuration error: {0}")]
    Configuration(&'static str),

    #[error("sensor #{0} unknown")]
    UnknownSensor(u8),

    #[error("bus #{0} not available")]
    InvalidBus(u8),

    #[error("pin #{0} out of range")]
    InvalidPin(u8),

    /// The calibration table has no free slot left.
    #[error("calibration store full")]
    StoreFull,

    /// The report destination ran out of space.
    #[error("formatting failed")]
    Format,
}

impl Error {
    /// Classify a transport error.
    ///
    /// An address NACK means "device absent", everything else is passed
    /// through as a bus failure.
    pub fn from_bus<E: i2c::Error>(error: E) -> Self {
        match error.kind() {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => Self::AddressNak,
            kind => Self::Transport(kind),
        }
    }
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::Format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimError;

    #[test]
    fn address_nak_is_device_absent() {
        let err = SimError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        assert_eq!(Error::from_bus(err), Error::AddressNak);
    }

    #[test]
    fn other_kinds_pass_through() {
        let data_nak = SimError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        assert_eq!(
            Error::from_bus(data_nak),
            Error::Transport(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))
        );
        assert_eq!(
            Error::from_bus(SimError(ErrorKind::ArbitrationLoss)),
            Error::Transport(ErrorKind::ArbitrationLoss)
        );
    }
}
