//! Capabilities of the board which the protocol engine touches directly: the switch bank, the hex
//! display, the environment sensor, and a blocking delay.
//!
//! These are injected into the [controller](crate::controller::Controller) rather than reached as
//! memory-mapped statics, so that the engine can be exercised against a fake board. The real
//! implementations live in [the board module](crate::board) behind the `board` feature.

use crate::cipher::Block;
use crate::cursor::{ReadCursor, WriteCursor};

/// Board I/O used while handling requests
pub trait HardwareIo {
    /// Current state of the digital switch bank, one bit per switch
    fn switches(&self) -> u8;

    /// Shows the 24-bit challenge on the six-digit hex display
    fn show_challenge(&mut self, code: u32);

    /// Blanks the hex display
    fn clear_challenge(&mut self);

    /// Busy-waits for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Environmental sensor feeding the key derivation
pub trait Sensor {
    /// Reads a 32-bit environment value (orientation/motion, as exposed by the sensor bridge)
    fn read_environment(&mut self) -> u32;
}

/// Loads a block into the four data words of an AES unit.
///
/// The units take the block as big-endian words in reverse order: word 0 holds bytes 12..16 and
/// word 3 holds bytes 0..4. Keys are loaded the same way.
pub fn block_to_words(block: &Block) -> [u32; 4] {
    let mut words = [0_u32; 4];
    let mut cur = ReadCursor::new(block);
    for word in words.iter_mut().rev() {
        *word = cur.read_u32();
    }
    words
}

/// Reassembles a block from the four result words of an AES unit
pub fn words_to_block(words: &[u32; 4]) -> Block {
    let mut block = [0_u8; 16];
    words
        .iter()
        .rev()
        .fold(WriteCursor::new(&mut block), |cur, word| cur.write_u32(*word));
    block
}

/// Bytes read from the motion sensor in one burst, starting at its interrupt status register
pub const MOTION_BURST_SZ: usize = 22;

/// One reading of the motion sensor
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MotionSample {
    pub gyro: [i16; 3],
    pub mag: [i16; 3],
}

impl MotionSample {
    /// Unpacks a register burst. `None` if the sensor had no fresh data.
    ///
    /// Gyroscope counts are big-endian at bytes 9..15; magnetometer counts are little-endian at
    /// bytes 15..21, as the magnetometer hands them to the sensor's auxiliary bus.
    pub fn from_burst(burst: &[u8; MOTION_BURST_SZ]) -> Option<Self> {
        if burst[0] & 0x01 == 0 {
            return None;
        }
        let be = |i: usize| i16::from_be_bytes([burst[i], burst[i + 1]]);
        let le = |i: usize| i16::from_le_bytes([burst[i], burst[i + 1]]);
        Some(MotionSample {
            gyro: [be(9), be(11), be(13)],
            mag: [le(15), le(17), le(19)],
        })
    }

    /// Folds the sample into the environment value used for key derivation.
    ///
    /// Each byte is 10 when its condition holds and a distinct marker otherwise, so small jitter
    /// in the raw counts doesn't change the key: byte 0 says whether the board is stationary, bytes
    /// 1..4 whether it faces the enrolled heading on each magnetometer axis.
    pub fn environment(&self) -> u32 {
        let [gx, gy, gz] = self.gyro;
        let [mx, my, mz] = self.mag;
        let flag = |holds: bool, marker: u8| if holds { 10 } else { marker };

        let stationary = i32::from(gx).abs() <= 200
            && i32::from(gy).abs() <= 100
            && i32::from(gz).abs() <= 200;
        u32::from_be_bytes([
            flag((-150..=50).contains(&mz), 53),
            flag(i32::from(my).abs() <= 90, 52),
            flag(i32::from(mx).abs() <= 40, 51),
            flag(stationary, 50),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_load_as_reversed_words() {
        let block: Block = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
        let words = block_to_words(&block);
        assert_eq!(words, [0x0C0D_0E0F, 0x0809_0A0B, 0x0405_0607, 0x0001_0203]);
        assert_eq!(words_to_block(&words), block);
    }

    #[test]
    fn burst_without_fresh_data_is_ignored() {
        assert_eq!(MotionSample::from_burst(&[0; MOTION_BURST_SZ]), None);
    }

    #[test]
    fn burst_unpacks_both_byte_orders() {
        let mut burst = [0_u8; MOTION_BURST_SZ];
        burst[0] = 0x01;
        burst[9..15].copy_from_slice(&[0x01, 0x02, 0xff, 0xfe, 0x00, 0x05]);
        burst[15..21].copy_from_slice(&[0x02, 0x01, 0xfe, 0xff, 0x05, 0x00]);
        let sample = MotionSample::from_burst(&burst).unwrap();
        assert_eq!(sample.gyro, [0x0102, -2, 5]);
        assert_eq!(sample.mag, [0x0102, -2, 5]);
    }

    #[test]
    fn still_and_aligned_board() {
        let sample = MotionSample {
            gyro: [-200, 100, 0],
            mag: [40, -90, -150],
        };
        assert_eq!(sample.environment(), 0x0A0A_0A0A);
    }

    #[test]
    fn each_condition_has_its_own_marker() {
        let sample = MotionSample {
            gyro: [0, 101, 0],
            mag: [-41, 91, 51],
        };
        assert_eq!(sample.environment(), u32::from_be_bytes([53, 52, 51, 50]));
    }
}
