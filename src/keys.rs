//! Derivation of the per-transfer AES key.
//!
//! A key is never stored. An upload derives a fresh one and hands its first four bytes, the
//! *component*, back to the client; a later download presents the component again and the device
//! rebuilds the identical key from it. Everything else in the key comes from device-side inputs:
//!
//! | bytes  | source                                                      |
//! |--------|-------------------------------------------------------------|
//! | 0..4   | component (random on upload, supplied on download), BE      |
//! | 4..8   | hash of the first four characters of the stored secret      |
//! | 8..11  | hash of the `latitude|longitude|altitude` location string   |
//! | 11     | switch bank                                                 |
//! | 12..16 | environment sensor reading, BE                              |
//!
//! Regeneration therefore only reproduces the key while the secret, switches and sensor reading
//! are unchanged and the client repeats the location string it uploaded with.

use alloc::string::String;
use core::fmt;

use num::ToPrimitive;
use rand::RngCore;

use crate::cursor::WriteCursor;

/// Size of a derived key in bytes
pub const KEY_SZ: usize = 16;

/// Errors raised while handling key material from the client
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// The component isn't eight hex digits
    BadComponent,
}

/// Result type for key handling
pub type Result<T> = core::result::Result<T, Error>;

/// A derived AES-128 key
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Key([u8; KEY_SZ]);

impl Key {
    pub fn as_bytes(&self) -> &[u8; KEY_SZ] {
        &self.0
    }

    /// The component: bytes 0..4 as a big-endian integer
    pub fn component(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl From<[u8; KEY_SZ]> for Key {
    fn from(bytes: [u8; KEY_SZ]) -> Self {
        Key(bytes)
    }
}

// Only the component is ever shown; the rest of the key stays out of logs
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:08X}..)", self.component())
    }
}

/// Builds keys from the device-side inputs captured at construction
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    secret_hash: [u8; 4],
    switches: u8,
    environment: u32,
}

impl KeyDeriver {
    /// Captures the inputs of one transfer
    pub fn new(secret: &str, switches: u8, environment: u32) -> Self {
        KeyDeriver {
            secret_hash: secret_hash(secret),
            switches,
            environment,
        }
    }

    /// Derives a key around a freshly drawn component
    pub fn generate<R: RngCore>(&self, rng: &mut R, location: &str) -> (Key, u32) {
        let component = rng.next_u32();
        (self.regenerate(component, location), component)
    }

    /// Rebuilds the key belonging to a component handed out earlier
    pub fn regenerate(&self, component: u32, location: &str) -> Key {
        let mut key = [0_u8; KEY_SZ];
        WriteCursor::new(&mut key)
            .write_u32(component)
            .write(&self.secret_hash)
            .write(&location_hash(location, &self.secret_hash))
            .write_u8(self.switches)
            .write_u32(self.environment);
        Key(key)
    }
}

/// Four order-sensitive mixes of the secret's first four bytes, one per cyclic rotation.
/// Secrets shorter than four bytes are padded with zeros.
fn secret_hash(secret: &str) -> [u8; 4] {
    let mut p = [0_i32; 4];
    for (dst, src) in p.iter_mut().zip(secret.bytes()) {
        *dst = i32::from(src);
    }

    let mut hash = [0_u8; 4];
    for (i, byte) in hash.iter_mut().enumerate() {
        let (a, b, c, d) = (p[i], p[(i + 1) % 4], p[(i + 2) % 4], p[(i + 3) % 4]);
        // always in 0..256 after rem_euclid
        *byte = (a * b + c * d - b * c + a - d).rem_euclid(256) as u8;
    }
    hash
}

/// Three mixes of the location coordinates, one per cyclic rotation.
///
/// A coordinate which is missing or doesn't parse is replaced by the matching byte of the secret
/// hash, and so is any mix which isn't a finite number.
fn location_hash(location: &str, secret_hash: &[u8; 4]) -> [u8; 3] {
    let mut v = [0_f64; 3];
    let mut parts = location.split('|');
    for (i, coord) in v.iter_mut().enumerate() {
        *coord = parts
            .next()
            .and_then(|part| part.trim().parse::<f64>().ok())
            .unwrap_or_else(|| f64::from(secret_hash[i]));
    }

    let mut hash = [0_u8; 3];
    for (i, byte) in hash.iter_mut().enumerate() {
        let (a, b, c) = (v[i], v[(i + 1) % 3], v[(i + 2) % 3]);
        let mut mixed = (a * b + b * c - c * a + a - c) % 256.0;
        if mixed < 0.0 {
            mixed += 256.0;
        }
        *byte = mixed.to_u8().unwrap_or(secret_hash[i]);
    }
    hash
}

/// Parses a component from its wire form, eight hex digits
pub fn parse_component(hex: &str) -> Result<u32> {
    let mut bytes = [0_u8; 4];
    hex::decode_to_slice(hex, &mut bytes).map_err(|_| Error::BadComponent)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Formats a component as eight upper-case hex digits
pub fn format_component(component: u32) -> String {
    hex::encode_upper(component.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_hc::Hc128Rng;

    const SECRET: &str = "1234567890abc";
    const LOCATION: &str = "37.422|-122.084|5.285";

    fn deriver() -> KeyDeriver {
        KeyDeriver::new(SECRET, 0xA5, 0xDEAD_BEEF)
    }

    #[test]
    fn key_layout() {
        let key = deriver().regenerate(0x0102_ABCD, LOCATION);
        assert_eq!(
            hex::encode_upper(key.as_bytes()),
            "0102ABCDF58FFB59FC79F1A5DEADBEEF"
        );
        assert_eq!(key.component(), 0x0102_ABCD);
    }

    #[test]
    fn bad_location_falls_back_to_secret_hash() {
        let key = deriver().regenerate(0x0102_ABCD, "garbage");
        assert_eq!(
            hex::encode_upper(key.as_bytes()),
            "0102ABCDF58FFB59D32B49A5DEADBEEF"
        );
    }

    #[test]
    fn short_secret_and_partial_location() {
        let key = KeyDeriver::new("ab", 0, 1).regenerate(0, "1|2");
        assert_eq!(
            hex::encode_upper(key.as_bytes()),
            "000000008301C0DE033F000000000001"
        );
    }

    #[test]
    fn regenerate_reproduces_generated_key() {
        let mut rng = Hc128Rng::from_seed([7; 32]);
        let deriver = deriver();
        let (key, component) = deriver.generate(&mut rng, LOCATION);
        assert_eq!(key.component(), component);
        assert_eq!(deriver.regenerate(component, LOCATION), key);
        assert_ne!(deriver.regenerate(component, "1|2|3"), key);
    }

    #[test]
    fn component_wire_form() {
        assert_eq!(format_component(0x0102_ABCD), "0102ABCD");
        assert_eq!(parse_component("0102abcd"), Ok(0x0102_ABCD));
        assert_eq!(parse_component("0102ABC"), Err(Error::BadComponent));
        assert_eq!(parse_component("0102ABCDEF"), Err(Error::BadComponent));
        assert_eq!(parse_component("zz02ABCD"), Err(Error::BadComponent));
    }

    #[test]
    fn debug_hides_key_material() {
        let key = deriver().regenerate(0x0102_ABCD, LOCATION);
        assert_eq!(format!("{:?}", key), "Key(0102ABCD..)");
    }
}
