//! Checksums used by the humidity/temperature chips.

use crc::{Algorithm, CRC_16_MODBUS, Crc};

/// CRC-8 as used by the HTU21/SHT2x: polynomial 0x31, initial value 0,
/// MSB first, no final XOR.
const CRC_8_HTU21: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x31,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xa2,
    residue: 0x00,
};

static HTU21: Crc<u8> = Crc::<u8>::new(&CRC_8_HTU21);

/// The AM2321 frame checksum is CRC-16/MODBUS.
static AM2321: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

pub fn crc8(data: &[u8]) -> u8 {
    HTU21.checksum(data)
}

pub fn crc16(data: &[u8]) -> u16 {
    AM2321.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_matches_htu21_datasheet_example() {
        // Datasheet example: 0x683a -> 0x7c
        assert_eq!(crc8(&[0x68, 0x3a]), 0x7c);
        assert_eq!(crc8(&[0x4e, 0x85]), 0x6b);
    }

    #[test]
    fn crc8_check_value() {
        assert_eq!(crc8(b"123456789"), 0xa2);
    }

    #[test]
    fn crc16_check_value() {
        // CRC-16/MODBUS check value
        assert_eq!(crc16(b"123456789"), 0x4b37);
    }

    #[test]
    fn crc16_empty_is_init() {
        assert_eq!(crc16(&[]), 0xffff);
    }
}
