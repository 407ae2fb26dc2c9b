//! CRC-16/MCRF4XX.
//!
//! Reflected polynomial 0x8408 (0x1021 bit-reversed), initial value 0xFFFF,
//! no final XOR. Check value for `"123456789"` is `0x6F91`.

const POLY: u16 = 0x8408;
const INIT: u16 = 0xFFFF;

/// Compute the CRC-16/MCRF4XX of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, &byte| update(crc, byte))
}

fn update(mut crc: u16, byte: u8) -> u16 {
    crc ^= u16::from(byte);
    for _ in 0..8 {
        crc = if crc & 1 != 0 {
            (crc >> 1) ^ POLY
        } else {
            crc >> 1
        };
    }
    crc
}
