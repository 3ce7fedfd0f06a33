//! X.25 checksum used by MAVLink frames.
//!
//! CRC-16/MCRF4XX: polynomial 0x1021 (reflected), initial value 0xFFFF, no final
//! XOR. MAVLink runs it over every frame byte after the start marker, then folds
//! in a per-message `CRC_EXTRA` seed so that sender and receiver must agree on
//! the message layout for the checksum to pass.

const X25_INIT: u16 = 0xFFFF;

/// Running X.25 checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X25(u16);

impl X25 {
    pub fn new() -> Self {
        Self(X25_INIT)
    }

    /// Fold one byte into the checksum.
    pub fn accumulate(&mut self, byte: u8) {
        let mut tmp = byte ^ (self.0 & 0xFF) as u8;
        tmp ^= tmp << 4;
        let tmp = tmp as u16;
        self.0 = (self.0 >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4);
    }

    pub fn accumulate_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.accumulate(byte);
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl Default for X25 {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of a frame body (bytes after the start marker, up to the end of the
/// payload) seeded with the message's `CRC_EXTRA`.
pub fn frame_checksum(body: &[u8], crc_extra: u8) -> u16 {
    let mut crc = X25::new();
    crc.accumulate_slice(body);
    crc.accumulate(crc_extra);
    crc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_mcrf4xx_check_value() {
        let mut crc = X25::new();
        crc.accumulate_slice(b"123456789");
        assert_eq!(crc.value(), 0x6F91);
    }

    #[test]
    fn empty_input_is_initial_value() {
        assert_eq!(X25::new().value(), 0xFFFF);
    }

    #[test]
    fn crc_extra_changes_the_result() {
        let body = [9u8, 0, 1, 1, 0, 4, 0, 0, 0];
        assert_ne!(frame_checksum(&body, 50), frame_checksum(&body, 51));
    }

    #[test]
    fn single_bit_flip_is_detected() {
        let body = [28u8, 0, 0, 7, 1, 1, 33, 0, 0];
        let original = frame_checksum(&body, 104);
        for bit in 0..body.len() * 8 {
            let mut flipped = body;
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(frame_checksum(&flipped, 104), original, "bit {bit} not detected");
        }
    }
}
