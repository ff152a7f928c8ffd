//! Runtime tunables of the protocol engine.
//!
//! The defaults mirror the constants the device shipped with. The firmware binary overrides the
//! response delay from the build-time values generated by `build.rs`.

/// Capacity of the link reassembly buffer: 512 bytes of file data plus 1536 bytes of allowance for
/// the JSON envelope and the other request fields.
pub const LINK_BUFFER_SZ: usize = 2048;

/// Largest plaintext payload carried by a single upload or download packet.
pub const MAX_FILE_DATA_SZ: usize = 0x0200;

/// Longest secret the device stores; longer secrets are truncated.
pub const MAX_SECRET_LEN: usize = 32;

/// Pause between a complete request and its response. The link is half-duplex and the client
/// needs time to turn around after the framing acknowledgement.
pub const RESPONSE_DELAY_MS: u32 = 1000;

/// Tunables handed to the [controller](crate::controller::Controller) at construction
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    /// Minimum delay between receiving a complete request and emitting its response
    pub response_delay_ms: u32,
    /// Maximum plaintext bytes per transfer packet; a multiple of the cipher block size
    pub max_file_data: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            response_delay_ms: RESPONSE_DELAY_MS,
            max_file_data: MAX_FILE_DATA_SZ,
        }
    }
}

impl Config {
    /// Overrides the response delay
    pub fn with_response_delay_ms(mut self, ms: u32) -> Self {
        self.response_delay_ms = ms;
        self
    }

    /// Overrides the packet payload size, rounded down to whole cipher blocks (minimum one block)
    pub fn with_max_file_data(mut self, bytes: usize) -> Self {
        let blocks = core::cmp::max(bytes / crate::cipher::BLOCK_SZ, 1);
        self.max_file_data = blocks * crate::cipher::BLOCK_SZ;
        self
    }

    /// Number of cipher blocks which make up one full packet
    pub fn blocks_per_packet(&self) -> usize {
        self.max_file_data / crate::cipher::BLOCK_SZ
    }
}
