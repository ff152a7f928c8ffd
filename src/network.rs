//! The remote storage collaborator.
//!
//! Files are stored as numbered ciphertext blocks in hex form. The protocol engine only needs to
//! join a network and to move single blocks; how the driver talks to the storage service is its
//! own business. [`LoopbackStore`] keeps the blocks in memory instead, for running the engine
//! without a modem.
//!
//! The storage service speaks HTTP/1.1 with one JSON object per response body, whose first value
//! is the answer. [`StorageRequest`] renders the requests and [`response_value`] picks the answer
//! out of a raw response, so the modem driver only moves bytes.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};

use crate::codec::Fields;
use crate::debug;

/// Access to the storage service
pub trait Network {
    /// Joins a wireless network; true on success
    fn join_network(&mut self, ssid: &str, password: &str) -> bool;

    /// Stores one hex-encoded ciphertext block at `block_index` of `file_id`; true on success.
    ///
    /// Block 0 starts a new file: every block stored earlier under `file_id` is discarded, so a
    /// shorter upload never inherits the tail of a longer one.
    fn upload_block(&mut self, file_id: &str, block_index: usize, hex: &str) -> bool;

    /// Fetches the hex-encoded ciphertext block at `block_index` of `file_id`
    fn download_block(&mut self, file_id: &str, block_index: usize) -> Option<String>;

    /// Number of blocks stored for `file_id`
    fn file_block_count(&mut self, file_id: &str) -> Option<usize>;
}

/// In-memory storage, keyed by file id and block index
#[derive(Debug, Default)]
pub struct LoopbackStore {
    files: BTreeMap<String, BTreeMap<usize, String>>,
    joined: Option<String>,
}

impl LoopbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The network most recently joined
    pub fn joined(&self) -> Option<&str> {
        self.joined.as_deref()
    }

    /// Every block stored for a file, in index order
    pub fn blocks(&self, file_id: &str) -> impl Iterator<Item = (&usize, &String)> {
        self.files.get(file_id).into_iter().flatten()
    }
}

impl Network for LoopbackStore {
    fn join_network(&mut self, ssid: &str, _password: &str) -> bool {
        self.joined = Some(ssid.to_string());
        true
    }

    fn upload_block(&mut self, file_id: &str, block_index: usize, hex: &str) -> bool {
        let blocks = self.files.entry(file_id.to_string()).or_default();
        if block_index == 0 {
            blocks.clear();
        }
        blocks.insert(block_index, hex.to_string());
        true
    }

    fn download_block(&mut self, file_id: &str, block_index: usize) -> Option<String> {
        let block = self.files.get(file_id)?.get(&block_index).cloned();
        if block.is_none() {
            debug!("No block {} stored for {}", block_index, file_id);
        }
        block
    }

    /// Blocks are counted up to the first gap in the indices
    fn file_block_count(&mut self, file_id: &str) -> Option<usize> {
        let blocks = self.files.get(file_id)?;
        Some((0_usize..).take_while(|i| blocks.contains_key(i)).count())
    }
}

/// A call on the storage service
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StorageRequest<'a> {
    /// `POST /file/{id}/{index}`, answered with a status
    StoreBlock {
        file_id: &'a str,
        block_index: usize,
        hex: &'a str,
    },
    /// `GET /file/{id}`, answered with the number of blocks
    BlockCount { file_id: &'a str },
    /// `GET /file/{id}/{index}`, answered with the block
    FetchBlock { file_id: &'a str, block_index: usize },
}

impl StorageRequest<'_> {
    /// Renders the full HTTP request for `host`
    pub fn to_http(&self, host: &str) -> String {
        match self {
            StorageRequest::StoreBlock {
                file_id,
                block_index,
                hex,
            } => {
                let body = format!("{{\"fileData\":\"{}\"}}", hex);
                format!(
                    "POST /file/{}/{} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                    file_id,
                    block_index,
                    host,
                    body.len(),
                    body
                )
            }
            StorageRequest::BlockCount { file_id } => {
                format!("GET /file/{} HTTP/1.1\r\nHost: {}\r\n\r\n", file_id, host)
            }
            StorageRequest::FetchBlock {
                file_id,
                block_index,
            } => format!(
                "GET /file/{}/{} HTTP/1.1\r\nHost: {}\r\n\r\n",
                file_id, block_index, host
            ),
        }
    }
}

/// The first value of the JSON body of a raw HTTP response
pub fn response_value(response: &[u8]) -> Option<String> {
    let start = response.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let body = &response[start..];
    let end = body.iter().rposition(|b| *b == b'}')? + 1;
    let fields = Fields::parse(&body[..end]).ok()?;
    fields.take(1).ok()?.first().cloned()
}
