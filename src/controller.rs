//! The request dispatcher: one framed message in, one response out.
//!
//! The [controller struct](Controller) owns every collaborator of the protocol engine and is generic
//! over each of them, so the same dispatcher drives the memory-mapped board in the firmware and
//! scripted fakes in the tests. A [`Link`] carries the client's requests, a [`Network`] stores the
//! encrypted blocks, a [`Sensor`] and the [`HardwareIo`] feed the key derivation and show the
//! challenge, and a cipher [`Peer`] does the AES work.
//!
//! [`handle_next`](Controller::handle_next) performs one full request cycle. The message is framed
//! (and acknowledged) by the [channel](crate::link::Channel), decoded by the [codec](crate::codec),
//! checked against the [session](crate::session::Session) and handled. Every failure is mapped onto
//! a wire status by [`Error::status`] and answered; none of them stop the
//! [run loop](Controller::run).
//!
//! Uploads and downloads span several packets. Once one begins it owns the link until its last
//! packet: an upload answers each intermediate packet with status 1 and then reads the next one
//! itself, and a download streams all of its packets back to back. A continuation which doesn't
//! follow on from the previous packet aborts the upload with status 0.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::{max, min};
use core::convert::TryFrom;

use rand::SeedableRng;
use rand_hc::Hc128Rng;

use crate::cipher::{self, Peer, Pipeline, BLOCK_SZ};
use crate::codec::{self, DownloadPacket, Fields, Request, Status, UploadComplete, UploadPacket};
use crate::config::Config;
use crate::debug;
use crate::hardware::{HardwareIo, Sensor};
use crate::keys::{self, KeyDeriver};
use crate::link::{self, Channel, Link};
use crate::network::Network;
use crate::session::{self, Session};

/// Reasons a request could not be handled
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// A fragment overflowed the link buffer; the client has already been told
    FramingOverflow,
    /// The message isn't a request the codec understands
    MalformedMessage,
    /// The request isn't legal in the current session state; carries the status to answer with
    PreconditionViolation(Status),
    /// The request is legal but its content was refused
    Rejected,
    /// The network or the storage service failed, or returned unusable data
    CollaboratorFailure,
}

impl Error {
    /// The status the client is answered with
    pub fn status(&self) -> Status {
        match self {
            Error::FramingOverflow => Status::Overflow,
            Error::PreconditionViolation(status) => *status,
            Error::MalformedMessage | Error::Rejected | Error::CollaboratorFailure => {
                Status::Rejected
            }
        }
    }
}

impl From<link::Overflow> for Error {
    fn from(_: link::Overflow) -> Self {
        Error::FramingOverflow
    }
}

impl From<codec::Error> for Error {
    fn from(_: codec::Error) -> Self {
        Error::MalformedMessage
    }
}

impl From<session::Error> for Error {
    fn from(err: session::Error) -> Self {
        match err {
            session::Error::NotConfigured => Error::PreconditionViolation(Status::NotConfigured),
            session::Error::OutOfOrder => Error::PreconditionViolation(Status::Rejected),
            session::Error::Mismatch => Error::Rejected,
        }
    }
}

impl From<keys::Error> for Error {
    fn from(_: keys::Error) -> Self {
        Error::Rejected
    }
}

impl From<cipher::Error> for Error {
    fn from(_: cipher::Error) -> Self {
        Error::CollaboratorFailure
    }
}

/// Simple result type for methods in [`Controller`](Controller)
pub type Result<T> = core::result::Result<T, Error>;

/// What a handler leaves for the dispatcher to send
#[derive(Debug, Eq, PartialEq)]
enum Reply {
    /// A bare status
    Status(Status),
    /// The final response of an upload
    Component(String),
    /// The handler has already streamed its responses
    Streamed,
}

/// Progress of an upload across its packets
#[derive(Debug)]
struct Transfer {
    file_id: String,
    packet_number: u32,
    total_packets: u32,
    /// Storage index of the next ciphertext block
    next_block: usize,
}

impl Transfer {
    /// Opens a transfer from its first packet, which must be packet 1
    fn start(packet: &UploadPacket<'_>) -> Result<Self> {
        let packet_number = parse_count(packet.packet_number)?;
        let total_packets = parse_count(packet.total_packets)?;
        if packet_number != 1 || total_packets == 0 {
            debug!("Upload must start at packet 1 of at least 1");
            return Err(Error::Rejected);
        }
        Ok(Transfer {
            file_id: String::from(packet.file_id),
            packet_number,
            total_packets,
            next_block: 0,
        })
    }

    /// Accepts the next packet if it directly follows the previous one
    fn advance(&mut self, packet: &UploadPacket<'_>) -> Result<()> {
        let packet_number = parse_count(packet.packet_number)?;
        let total_packets = parse_count(packet.total_packets)?;
        if packet.file_id != self.file_id
            || total_packets != self.total_packets
            || Some(packet_number) != self.packet_number.checked_add(1)
        {
            debug!(
                "Packet {} of {} doesn't follow packet {} of {}",
                packet_number, total_packets, self.packet_number, self.total_packets
            );
            return Err(Error::Rejected);
        }
        self.packet_number = packet_number;
        Ok(())
    }

    fn complete(&self) -> bool {
        self.packet_number >= self.total_packets
    }
}

fn parse_count(text: &str) -> Result<u32> {
    text.trim().parse().map_err(|_| Error::Rejected)
}

/// Length of the unfinished UTF-8 sequence at the end of `bytes`, zero if there is none
fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    let lead = match (start..bytes.len()).rev().find(|i| bytes[*i] & 0xc0 != 0x80) {
        Some(lead) => lead,
        None => return 0,
    };
    match core::str::from_utf8(&bytes[lead..]) {
        Err(err) if err.valid_up_to() == 0 && err.error_len().is_none() => bytes.len() - lead,
        _ => 0,
    }
}

/// The protocol engine
pub struct Controller<L: Link, N: Network, S: Sensor, H: HardwareIo, P: Peer> {
    /// Link to the paired client
    channel: Channel<L>,
    /// Remote block storage
    network: N,
    /// Environment sensor feeding the key derivation
    sensor: S,
    /// Switches, display and delays
    hw: H,
    /// AES engine
    peer: P,
    /// Authentication state
    session: Session,
    /// Source of challenges and key components, seeded once per boot
    random: Hc128Rng,
    /// Tunables
    config: Config,
}

impl<L: Link, N: Network, S: Sensor, H: HardwareIo, P: Peer> Controller<L, N, S, H, P> {
    /// Creates a controller with an unauthenticated session.
    ///
    /// `seed` seeds the random source for the lifetime of the controller; the firmware draws it
    /// once per boot.
    pub fn new(
        link: L,
        network: N,
        sensor: S,
        hw: H,
        peer: P,
        seed: [u8; 32],
        config: Config,
    ) -> Self {
        Controller {
            channel: Channel::new(link),
            network,
            sensor,
            hw,
            peer,
            session: Session::new(),
            random: Hc128Rng::from_seed(seed),
            config,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn link(&self) -> &L {
        self.channel.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.channel.link_mut()
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receives, handles and answers one request.
    ///
    /// A framing overflow has already been answered with status 3 by the channel and is only
    /// reported. Every other failure is answered with [`Error::status`].
    pub fn handle_next(&mut self) -> Result<()> {
        let message = self.channel.receive()?;

        match self.dispatch(&message) {
            Ok(reply) => {
                self.respond(reply);
                Ok(())
            }
            Err(err) => {
                debug!("Request failed: {:?}", err);
                self.respond(Reply::Status(err.status()));
                Err(err)
            }
        }
    }

    /// Handles requests forever
    pub fn run(&mut self) -> ! {
        loop {
            let _ignored = self.handle_next();
        }
    }

    fn dispatch(&mut self, message: &[u8]) -> Result<Reply> {
        let fields = Fields::parse(message)?;
        let request = fields.request()?;
        debug!("Request: {:?}", request);

        match request {
            Request::SetSecret { password } => {
                self.session.set_secret(password);
                Ok(Reply::Status(Status::Ok))
            }
            Request::ConfigureNetwork { ssid, password } => {
                self.handle_configure_network(ssid, password)
            }
            Request::GenerateChallenge => self.handle_generate_challenge(),
            Request::Verify { password, hex } => self.handle_verify(password, hex),
            Request::Upload(packet) => self.handle_upload(&packet),
            Request::Download {
                component,
                file_id,
                location,
            } => self.handle_download(component, file_id, location),
            Request::Unknown => {
                self.session.reset();
                Err(Error::Rejected)
            }
        }
    }

    fn respond(&mut self, reply: Reply) {
        if reply == Reply::Streamed {
            return;
        }

        self.hw.delay_ms(self.config.response_delay_ms);
        match reply {
            Reply::Status(status) => self.channel.send_status(status),
            Reply::Component(component) => self.channel.send(&UploadComplete {
                status: Status::Ok,
                local_encryption_component: &component,
            }),
            Reply::Streamed => {}
        }
    }

    fn handle_configure_network(&mut self, ssid: &str, password: &str) -> Result<Reply> {
        let joined = self.network.join_network(ssid, password);
        self.session.set_network_configured(joined);
        if !joined {
            debug!("Failed to join {}", ssid);
            return Err(Error::CollaboratorFailure);
        }
        Ok(Reply::Status(Status::Ok))
    }

    fn handle_generate_challenge(&mut self) -> Result<Reply> {
        let challenge = self.session.issue_challenge(&mut self.random)?;
        self.hw.show_challenge(challenge.code());
        Ok(Reply::Status(Status::Ok))
    }

    fn handle_verify(&mut self, password: &str, hex: &str) -> Result<Reply> {
        self.session.verify(password, hex)?;
        self.hw.clear_challenge();
        Ok(Reply::Status(Status::Ok))
    }

    /// Captures the device-side key inputs as they are right now
    fn deriver(&mut self) -> Result<KeyDeriver> {
        let secret = self
            .session
            .secret()
            .ok_or(Error::PreconditionViolation(Status::NotConfigured))?;
        Ok(KeyDeriver::new(
            secret,
            self.hw.switches(),
            self.sensor.read_environment(),
        ))
    }

    fn handle_upload(&mut self, first: &UploadPacket<'_>) -> Result<Reply> {
        self.session.require_verified()?;
        let mut transfer = Transfer::start(first)?;

        let (key, component) = self.deriver()?.generate(&mut self.random, first.location);
        debug!("Uploading {} with {:?}", transfer.file_id, key);
        let mut pipeline = Pipeline::new(key, self.config.max_file_data);
        self.upload_packet(&mut pipeline, &mut transfer, first.file_data)?;

        while !transfer.complete() {
            self.respond(Reply::Status(Status::Ok));
            let message = self.receive_continuation();
            let fields = Fields::parse(&message)?;
            let packet = match fields.request()? {
                Request::Upload(packet) => packet,
                other => {
                    debug!("Expected an upload packet, got {:?}", other);
                    return Err(Error::Rejected);
                }
            };
            transfer.advance(&packet)?;
            self.upload_packet(&mut pipeline, &mut transfer, packet.file_data)?;
        }

        Ok(Reply::Component(keys::format_component(component)))
    }

    /// Waits for the next message of a transfer; overflowing fragments are resent by the client
    fn receive_continuation(&mut self) -> Vec<u8> {
        loop {
            if let Ok(message) = self.channel.receive() {
                return message;
            }
        }
    }

    fn upload_packet(
        &mut self,
        pipeline: &mut Pipeline,
        transfer: &mut Transfer,
        file_data: &str,
    ) -> Result<()> {
        if file_data.len() > self.config.max_file_data {
            debug!("Packet of {} bytes is too large", file_data.len());
            return Err(Error::Rejected);
        }

        let ciphertext = pipeline.encrypt_all(&mut self.peer, file_data.as_bytes());
        for block in ciphertext.chunks(BLOCK_SZ) {
            let hex = cipher::to_hex(block);
            if !self
                .network
                .upload_block(&transfer.file_id, transfer.next_block, &hex)
            {
                debug!("Storing block {} failed", transfer.next_block);
                return Err(Error::CollaboratorFailure);
            }
            transfer.next_block += 1;
        }
        Ok(())
    }

    fn handle_download(&mut self, component: &str, file_id: &str, location: &str) -> Result<Reply> {
        self.session.require_verified()?;
        let component = keys::parse_component(component)?;
        let key = self.deriver()?.regenerate(component, location);

        let blocks = self
            .network
            .file_block_count(file_id)
            .ok_or(Error::CollaboratorFailure)?;
        let per_packet = self.config.blocks_per_packet();
        let total_packets = max(1, blocks / per_packet + usize::from(blocks % per_packet != 0));
        if u32::try_from(total_packets).is_err() {
            debug!("Storage reports {} blocks for {}", blocks, file_id);
            return Err(Error::CollaboratorFailure);
        }
        debug!("Downloading {} in {} packets with {:?}", file_id, total_packets, key);

        let mut pipeline = Pipeline::new(key, self.config.max_file_data);
        // bytes of a character split across packets, held back for the next one
        let mut carry = Vec::new();
        for packet in 0..total_packets {
            let first = packet * per_packet;
            let last = min(blocks, first + per_packet);

            let mut ciphertext = Vec::with_capacity((last - first) * BLOCK_SZ);
            for index in first..last {
                let hex = self
                    .network
                    .download_block(file_id, index)
                    .ok_or(Error::CollaboratorFailure)?;
                ciphertext.extend_from_slice(&cipher::block_from_hex(&hex)?);
            }

            let mut plaintext = core::mem::take(&mut carry);
            plaintext.extend(
                pipeline
                    .decrypt_all(&mut self.peer, &ciphertext)?
                    .into_iter()
                    .filter(|b| *b != 0),
            );
            if packet + 1 < total_packets {
                let split = plaintext.len() - incomplete_tail(&plaintext);
                carry = plaintext.split_off(split);
            }
            let file_data = String::from_utf8_lossy(&plaintext);

            self.hw.delay_ms(self.config.response_delay_ms);
            self.channel.send(&DownloadPacket {
                status: Status::Ok,
                packet_number: packet + 1,
                total_packets,
                file_data: &file_data,
            });
        }

        Ok(Reply::Streamed)
    }
}
