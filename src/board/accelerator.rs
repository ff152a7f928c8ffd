//! The FPGA AES-128 units, one for each direction.
//!
//! A unit takes its key in words 0..4 and its input block in words 4..8. Writing word 8 expands
//! the key schedule and runs the block; writing word 9 runs the block on the schedule already
//! expanded. The result is read back from words 0..4.

use cty::uintptr_t;
use volatile_register::RW;

use crate::cipher::{Block, Mode, Peer};
use crate::hardware::{block_to_words, words_to_block};
use crate::keys::Key;

const ENCRYPT_BASE: uintptr_t = 0xFF20_3000;
const DECRYPT_BASE: uintptr_t = 0xFF20_4000;

#[repr(C)]
struct Unit {
    /// Key on write, result on read
    key: [RW<u32>; 4],
    input: [RW<u32>; 4],
    expand: RW<u32>,
    reuse: RW<u32>,
}

/// Both AES units
pub struct AesAccelerator {
    encryptor: &'static mut Unit,
    decryptor: &'static mut Unit,
}

impl AesAccelerator {
    /// Claims both units
    pub fn new() -> Self {
        unsafe {
            AesAccelerator {
                encryptor: &mut *(ENCRYPT_BASE as *mut Unit),
                decryptor: &mut *(DECRYPT_BASE as *mut Unit),
            }
        }
    }
}

impl Peer for AesAccelerator {
    fn cipher_block(&mut self, key: &Key, input: &Block, first_block: bool, mode: Mode) -> Block {
        let unit: &Unit = match mode {
            Mode::Encrypt => &*self.encryptor,
            Mode::Decrypt => &*self.decryptor,
        };

        unsafe {
            for (reg, word) in unit.input.iter().zip(&block_to_words(input)) {
                reg.write(*word);
            }
            if first_block {
                for (reg, word) in unit.key.iter().zip(&block_to_words(key.as_bytes())) {
                    reg.write(*word);
                }
                unit.expand.write(0);
            } else {
                unit.reuse.write(0);
            }
        }

        let mut result = [0_u32; 4];
        for (word, reg) in result.iter_mut().zip(&unit.key) {
            *word = reg.read();
        }
        words_to_block(&result)
    }
}
