//! The two 32-bit byte orders used by the VRI loader
//!
//! Neither is plain big or little endian. Header fields swap the bytes
//! within each 16-bit half and store the low half first; payload words keep
//! the low byte first within each half and store the high half first.

/// Encode a header field (`addr`, `size`, `flags`, `extension`).
///
/// `0x12345678` becomes `56 78 12 34`.
pub fn header_word(v: u32) -> [u8; 4] {
    [(v >> 8) as u8, v as u8, (v >> 24) as u8, (v >> 16) as u8]
}

/// Encode a literal payload word.
///
/// `0x12345678` becomes `34 12 78 56`.
pub fn payload_word(v: u32) -> [u8; 4] {
    [(v >> 16) as u8, (v >> 24) as u8, v as u8, (v >> 8) as u8]
}

#[cfg(test)]
pub fn decode_header_word(b: [u8; 4]) -> u32 {
    (b[0] as u32) << 8 | b[1] as u32 | (b[2] as u32) << 24 | (b[3] as u32) << 16
}

#[cfg(test)]
pub fn decode_payload_word(b: [u8; 4]) -> u32 {
    (b[0] as u32) << 16 | (b[1] as u32) << 24 | b[2] as u32 | (b[3] as u32) << 8
}
