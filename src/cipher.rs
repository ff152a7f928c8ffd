//! The block cipher pipeline: payloads in, 16-byte cipher blocks out, and back again.
//!
//! The board's AES units are opaque peers which take one block at a time. A unit has to expand the
//! key schedule before its first block and reuses that schedule for every later block, so the
//! [`Pipeline`] tracks, per direction, whether the schedule for its key has been expanded yet and
//! passes that on to the [`Peer`] as the `first_block` flag. The flag is set exactly once per
//! direction over the lifetime of a pipeline, however many packets the transfer spans.
//!
//! Payloads are NUL-terminated text, and a payload shorter than the limit ends in an implicit NUL.
//! Encryption stops after the block which holds the first NUL (the rest of that block is
//! zero-filled); decryption has no length signal at all and returns
//! every block it was given, so callers strip the zero fill themselves.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::min;

use aes::cipher::generic_array::GenericArray;
use aes::{Aes128, NewBlockCipher};
use block_modes::block_padding::NoPadding;
use block_modes::{BlockMode, Ecb};

use crate::keys::Key;

/// Size of a cipher block in bytes
pub const BLOCK_SZ: usize = 16;

/// One cipher block
pub type Block = [u8; BLOCK_SZ];

/// Direction of a cipher operation
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// Errors raised on the ciphertext side of the pipeline
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// Ciphertext isn't upper- or lower-case hex digit pairs of the expected length
    BadHex,
    /// Ciphertext isn't a whole number of blocks
    Misaligned,
}

/// Result type for ciphertext handling
pub type Result<T> = core::result::Result<T, Error>;

/// A single-block AES-128 engine.
///
/// `first_block` asks the engine to expand the schedule for `key` before processing `input`; when
/// it is false the engine reuses the schedule from the last expansion in the same `mode`.
pub trait Peer {
    fn cipher_block(&mut self, key: &Key, input: &Block, first_block: bool, mode: Mode) -> Block;
}

type Aes128Ecb = Ecb<Aes128, NoPadding>;

/// Software AES peer with the same first-block contract as the hardware units.
///
/// Each direction keeps its own expanded schedule, as the two hardware units do.
#[derive(Default)]
pub struct SoftPeer {
    encryptor: Option<Aes128Ecb>,
    decryptor: Option<Aes128Ecb>,
}

impl SoftPeer {
    pub fn new() -> Self {
        Self::default()
    }

    fn expand(key: &Key) -> Aes128Ecb {
        let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
        Aes128Ecb::new(cipher, &Default::default())
    }
}

impl Peer for SoftPeer {
    fn cipher_block(&mut self, key: &Key, input: &Block, first_block: bool, mode: Mode) -> Block {
        let unit = match mode {
            Mode::Encrypt => &mut self.encryptor,
            Mode::Decrypt => &mut self.decryptor,
        };
        if first_block {
            *unit = None;
        }
        let unit = unit.get_or_insert_with(|| SoftPeer::expand(key));

        let mut output = *input;
        let block = GenericArray::from_mut_slice(&mut output);
        match mode {
            Mode::Encrypt => unit.encrypt_blocks(core::slice::from_mut(block)),
            Mode::Decrypt => unit.decrypt_blocks(core::slice::from_mut(block)),
        }
        output
    }
}

/// Feeds payloads for one key through a cipher peer
#[derive(Debug)]
pub struct Pipeline {
    key: Key,
    /// Whether the peer has expanded the schedule, indexed by [`Pipeline::slot`]
    expanded: [bool; 2],
    /// Largest payload handled per call, in bytes
    limit: usize,
}

impl Pipeline {
    /// Creates a pipeline for `key` which handles at most `limit` bytes per call
    pub fn new(key: Key, limit: usize) -> Self {
        Pipeline {
            key,
            expanded: [false; 2],
            limit,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    fn slot(mode: Mode) -> usize {
        match mode {
            Mode::Encrypt => 0,
            Mode::Decrypt => 1,
        }
    }

    fn block<P: Peer>(&mut self, peer: &mut P, input: &Block, mode: Mode) -> Block {
        let expanded = &mut self.expanded[Pipeline::slot(mode)];
        let first_block = !*expanded;
        *expanded = true;
        peer.cipher_block(&self.key, input, first_block, mode)
    }

    /// Encrypts the payload up to and including the block which holds its terminator, or up to the
    /// limit when the terminator doesn't fit.
    ///
    /// The terminator is the first NUL, or the end of a payload shorter than the limit. An empty
    /// payload therefore still yields one all-zero block.
    pub fn encrypt_all<P: Peer>(&mut self, peer: &mut P, plaintext: &[u8]) -> Vec<u8> {
        let capped = &plaintext[..min(plaintext.len(), self.limit)];
        let (text, terminated) = match capped.iter().position(|b| *b == 0) {
            Some(end) => (&capped[..end], true),
            None => (capped, plaintext.len() < self.limit),
        };

        let mut ciphertext = Vec::with_capacity(text.len() + BLOCK_SZ);
        for chunk in text.chunks(BLOCK_SZ) {
            let mut block = [0_u8; BLOCK_SZ];
            block[..chunk.len()].copy_from_slice(chunk);
            ciphertext.extend_from_slice(&self.block(peer, &block, Mode::Encrypt));
        }
        // the terminator starts a block of its own
        if terminated && text.len() % BLOCK_SZ == 0 {
            ciphertext.extend_from_slice(&self.block(peer, &[0; BLOCK_SZ], Mode::Encrypt));
        }
        ciphertext
    }

    /// Decrypts every whole block up to the limit
    pub fn decrypt_all<P: Peer>(&mut self, peer: &mut P, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() % BLOCK_SZ != 0 {
            return Err(Error::Misaligned);
        }
        let limit = self.limit - self.limit % BLOCK_SZ;
        let ciphertext = &ciphertext[..min(ciphertext.len(), limit)];

        let mut plaintext = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks_exact(BLOCK_SZ) {
            let mut block = [0_u8; BLOCK_SZ];
            block.copy_from_slice(chunk);
            plaintext.extend_from_slice(&self.block(peer, &block, Mode::Decrypt));
        }
        Ok(plaintext)
    }
}

/// Upper-case hex, two digits per byte
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Parses one block from its hex form
pub fn block_from_hex(digits: &str) -> Result<Block> {
    let mut block = [0_u8; BLOCK_SZ];
    hex::decode_to_slice(digits, &mut block).map_err(|_| Error::BadHex)?;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];

    /// Records the flags it is called with and applies a trivial keyed transform
    #[derive(Default)]
    struct RecordingPeer {
        calls: Vec<(bool, Mode)>,
    }

    impl Peer for RecordingPeer {
        fn cipher_block(&mut self, key: &Key, input: &Block, first: bool, mode: Mode) -> Block {
            self.calls.push((first, mode));
            let mut out = *input;
            for (o, k) in out.iter_mut().zip(key.as_bytes()) {
                *o ^= k;
            }
            out
        }
    }

    #[test]
    fn soft_peer_matches_fips_197() {
        // FIPS-197 appendix C.1
        let plaintext: Block = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let mut peer = SoftPeer::new();
        let key = Key::from(KEY);
        let ciphertext = peer.cipher_block(&key, &plaintext, true, Mode::Encrypt);
        assert_eq!(to_hex(&ciphertext), "69C4E0D86A7B0430D8CDB78070B4C55A");
        assert_eq!(
            peer.cipher_block(&key, &ciphertext, true, Mode::Decrypt),
            plaintext
        );
    }

    #[test]
    fn first_block_flag_is_set_once_per_direction() {
        let mut peer = RecordingPeer::default();
        let mut pipeline = Pipeline::new(Key::from(KEY), 512);
        let ciphertext = pipeline.encrypt_all(&mut peer, &[b'x'; 40]);
        assert_eq!(ciphertext.len(), 48);
        pipeline.encrypt_all(&mut peer, b"more");
        pipeline.decrypt_all(&mut peer, &ciphertext).unwrap();
        let first: Vec<bool> = peer.calls.iter().map(|(first, _)| *first).collect();
        assert_eq!(first, [true, false, false, false, true, false, false]);
    }

    #[test]
    fn encryption_stops_after_the_terminator_block() {
        let mut peer = RecordingPeer::default();
        let mut pipeline = Pipeline::new(Key::from([0; 16]), 512);
        let mut payload = [b'a'; 40];
        payload[20] = 0;
        let ciphertext = pipeline.encrypt_all(&mut peer, &payload);
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(&ciphertext[16..20], b"aaaa");
        assert_eq!(&ciphertext[20..], &[0; 12]);
    }

    #[test]
    fn terminator_block_is_always_emitted() {
        let mut peer = RecordingPeer::default();
        let mut pipeline = Pipeline::new(Key::from([0; 16]), 512);
        assert_eq!(pipeline.encrypt_all(&mut peer, b""), [0; 16]);
        assert_eq!(pipeline.encrypt_all(&mut peer, &[0, 1, 2]), [0; 16]);

        let ciphertext = pipeline.encrypt_all(&mut peer, &[b'a'; 16]);
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(&ciphertext[16..], &[0; 16]);

        let ciphertext = pipeline.encrypt_all(&mut peer, &[b'a'; 17]);
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(&ciphertext[..17], &[b'a'; 17]);
        assert_eq!(&ciphertext[17..], &[0; 15]);
    }

    #[test]
    fn full_payload_has_no_terminator_block() {
        let mut peer = RecordingPeer::default();
        let mut pipeline = Pipeline::new(Key::from([0; 16]), 32);
        assert_eq!(pipeline.encrypt_all(&mut peer, &[b'a'; 32]).len(), 32);
        assert_eq!(pipeline.encrypt_all(&mut peer, &[b'a'; 31]).len(), 32);
        assert_eq!(pipeline.encrypt_all(&mut peer, &[b'a'; 16]).len(), 32);
    }

    #[test]
    fn payload_is_capped_at_the_limit() {
        let mut peer = RecordingPeer::default();
        let mut pipeline = Pipeline::new(Key::from(KEY), 32);
        assert_eq!(pipeline.encrypt_all(&mut peer, &[1; 100]).len(), 32);
        assert_eq!(pipeline.decrypt_all(&mut peer, &[1; 64]).unwrap().len(), 32);
    }

    #[test]
    fn round_trip_through_soft_peer() {
        let mut peer = SoftPeer::new();
        let message = b"the quick brown fox jumps over the lazy dog";
        let mut encrypting = Pipeline::new(Key::from(KEY), 512);
        let ciphertext = encrypting.encrypt_all(&mut peer, message);
        assert_eq!(ciphertext.len(), 48);

        let mut decrypting = Pipeline::new(Key::from(KEY), 512);
        let plaintext = decrypting.decrypt_all(&mut peer, &ciphertext).unwrap();
        assert_eq!(&plaintext[..message.len()], &message[..]);
        assert!(plaintext[message.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn ciphertext_must_be_whole_blocks() {
        let mut pipeline = Pipeline::new(Key::from(KEY), 512);
        assert_eq!(
            pipeline.decrypt_all(&mut SoftPeer::new(), &[0; 17]),
            Err(Error::Misaligned)
        );
    }

    #[test]
    fn blocks_parse_from_hex() {
        let block = block_from_hex("000102030405060708090a0B0C0D0E0F").unwrap();
        assert_eq!(block, KEY);
        assert_eq!(block_from_hex("0001"), Err(Error::BadHex));
        assert_eq!(block_from_hex("zz0102030405060708090A0B0C0D0E0F"), Err(Error::BadHex));
    }
}
