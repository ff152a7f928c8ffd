//! Scripted fakes for every collaborator of the controller.

#![allow(dead_code)]

use std::collections::VecDeque;

use cloudlockr::cipher::{Block, Mode, Peer, SoftPeer};
use cloudlockr::keys::Key;
use cloudlockr::config::Config;
use cloudlockr::controller::{Controller, Result};
use cloudlockr::hardware::{HardwareIo, Sensor};
use cloudlockr::link::{Link, MESSAGE_END};
use cloudlockr::network::{LoopbackStore, Network};

pub const SECRET: &str = "1234567890abc";
pub const LOCATION: &str = "37.422|-122.084|5.285";

/// A link which replays queued input and records everything sent.
///
/// Running out of input panics, so a test never blocks waiting for bytes that will not come.
#[derive(Default)]
pub struct ScriptedLink {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl ScriptedLink {
    /// Queues a complete message
    pub fn push_message(&mut self, message: &str) {
        self.push_raw(message.as_bytes());
        self.push_raw(&MESSAGE_END);
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Every response sent so far, terminators stripped, and forgets them
    pub fn take_responses(&mut self) -> Vec<String> {
        let output = std::mem::take(&mut self.output);
        let text = String::from_utf8(output).expect("responses are text");
        text.split("\x0b\n")
            .filter(|r| !r.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl Link for ScriptedLink {
    fn send(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    fn try_receive_byte(&mut self) -> Option<u8> {
        Some(self.input.pop_front().expect("link script exhausted"))
    }
}

/// Switches, display and delays
#[derive(Default)]
pub struct FakeBoard {
    pub switches: u8,
    pub shown: Option<u32>,
    pub delays: Vec<u32>,
}

impl HardwareIo for FakeBoard {
    fn switches(&self) -> u8 {
        self.switches
    }

    fn show_challenge(&mut self, code: u32) {
        self.shown = Some(code);
    }

    fn clear_challenge(&mut self) {
        self.shown = None;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}

pub struct FakeSensor(pub u32);

impl Sensor for FakeSensor {
    fn read_environment(&mut self) -> u32 {
        self.0
    }
}

/// Loop-back storage which can be told to fail
pub struct Storage {
    pub store: LoopbackStore,
    pub join_ok: bool,
    pub upload_ok: bool,
    /// Block count reported instead of the stored one
    pub reported_count: Option<usize>,
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            store: LoopbackStore::new(),
            join_ok: true,
            upload_ok: true,
            reported_count: None,
        }
    }
}

impl Network for Storage {
    fn join_network(&mut self, ssid: &str, password: &str) -> bool {
        self.join_ok && self.store.join_network(ssid, password)
    }

    fn upload_block(&mut self, file_id: &str, block_index: usize, hex: &str) -> bool {
        self.upload_ok && self.store.upload_block(file_id, block_index, hex)
    }

    fn download_block(&mut self, file_id: &str, block_index: usize) -> Option<String> {
        self.store.download_block(file_id, block_index)
    }

    fn file_block_count(&mut self, file_id: &str) -> Option<usize> {
        self.reported_count.or_else(|| self.store.file_block_count(file_id))
    }
}

/// Software AES which records the schedule flag of every block
#[derive(Default)]
pub struct RecordingPeer {
    inner: SoftPeer,
    pub calls: Vec<(bool, Mode)>,
}

impl RecordingPeer {
    /// The schedule flags of every block in one direction, in order
    pub fn first_block_flags(&self, mode: Mode) -> Vec<bool> {
        self.calls
            .iter()
            .filter(|(_, m)| *m == mode)
            .map(|(first, _)| *first)
            .collect()
    }
}

impl Peer for RecordingPeer {
    fn cipher_block(&mut self, key: &Key, input: &Block, first_block: bool, mode: Mode) -> Block {
        self.calls.push((first_block, mode));
        self.inner.cipher_block(key, input, first_block, mode)
    }
}

pub type TestController = Controller<ScriptedLink, Storage, FakeSensor, FakeBoard, RecordingPeer>;

pub fn controller_with(storage: Storage, config: Config) -> TestController {
    Controller::new(
        ScriptedLink::default(),
        storage,
        FakeSensor(0xDEAD_BEEF),
        FakeBoard {
            switches: 0xA5,
            ..FakeBoard::default()
        },
        RecordingPeer::default(),
        [9; 32],
        config,
    )
}

pub fn controller() -> TestController {
    controller_with(Storage::default(), Config::default().with_response_delay_ms(0))
}

/// Queues one message and handles it
pub fn send(controller: &mut TestController, message: &str) -> Result<()> {
    controller.link_mut().push_message(message);
    controller.handle_next()
}

/// A controller whose session has been verified, with the responses so far discarded
pub fn verified(mut controller: TestController) -> TestController {
    send(&mut controller, &format!(r#"{{"type":7,"password":"{}"}}"#, SECRET)).unwrap();
    send(&mut controller, r#"{"type":1}"#).unwrap();
    let code = controller.hardware().shown.expect("challenge shown");
    let verify = format!(
        r#"{{"type":2,"password":"{}","hex":"{:06X}"}}"#,
        SECRET, code
    );
    send(&mut controller, &verify).unwrap();
    controller.link_mut().take_responses();
    controller
}

pub fn upload_packet(file_id: &str, number: u32, total: u32, data: &str) -> String {
    format!(
        r#"{{"type":3,"fileId":"{}","packetNumber":{},"totalPackets":{},"location":"{}","fileData":"{}"}}"#,
        file_id, number, total, LOCATION, data
    )
}

pub fn download(component: &str, file_id: &str) -> String {
    format!(
        r#"{{"type":4,"localEncryptionComponent":"{}","fileId":"{}","location":"{}"}}"#,
        component, file_id, LOCATION
    )
}

pub const OK: &str = r#"{"status":1}"#;
pub const REJECTED: &str = r#"{"status":0}"#;
