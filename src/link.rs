//! The serial link to the paired client, and the reassembly of its byte stream into requests.
//!
//! A request arrives as one or more fragments. Each fragment ends with `\r\n` and is acknowledged
//! with status 2; the last one ends with vertical-tab + `\n`, which completes the message and is
//! acknowledged with status 1 before the request is handled. Control characters never reach the
//! message buffer, they only drive the terminator detection.
//!
//! The [`Framer`] is the pure state machine over single bytes. The [`Channel`] pairs a framer with
//! a [`Link`] and performs the acknowledgement choreography, which is the wire contract the client
//! relies on. There is no idle timeout: a half-received message waits indefinitely for the rest of
//! its bytes.

use alloc::vec::Vec;
use core::fmt::Write;

use heapless::{String as FixedString, Vec as FixedVec};
use serde::Serialize;

use crate::codec::Status;
use crate::config::LINK_BUFFER_SZ;
use crate::debug;

/// Carriage return, first byte of a fragment terminator
pub const CR: u8 = b'\r';
/// Line feed, last byte of both terminators
pub const LF: u8 = b'\n';
/// Vertical tab, first byte of a message terminator
pub const VT: u8 = 0x0b;

/// Ends one fragment of a message
pub const FRAGMENT_END: [u8; 2] = [CR, LF];
/// Ends a complete message
pub const MESSAGE_END: [u8; 2] = [VT, LF];

/// Byte-level access to the serial link.
///
/// The physical driver polls its receive FIFO; nothing here blocks except where noted.
pub trait Link {
    /// Transmits every byte, blocking while the transmit FIFO is full
    fn send(&mut self, bytes: &[u8]);

    /// Takes one received byte, if one is waiting
    fn try_receive_byte(&mut self) -> Option<u8>;
}

/// Something the framer has to report after consuming a byte
#[derive(Debug, Eq, PartialEq)]
pub enum Frame {
    /// A complete message, terminators stripped
    Message(Vec<u8>),
    /// A fragment boundary; the bytes stay buffered
    Fragment,
    /// The buffer filled before a terminator; the current fragment was discarded
    Overflow,
}

/// Reassembles link bytes into messages inside a fixed-capacity buffer
#[derive(Debug)]
pub struct Framer<const N: usize = LINK_BUFFER_SZ> {
    /// Message bytes accumulated so far, across fragments
    buf: FixedVec<u8, N>,
    /// Bytes of `buf` which belong to the fragment still being received
    fragment_len: usize,
    /// The last two raw bytes seen, control characters included
    last: [u8; 2],
}

impl<const N: usize> Default for Framer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Framer<N> {
    pub fn new() -> Self {
        Framer {
            buf: FixedVec::new(),
            fragment_len: 0,
            last: [0; 2],
        }
    }

    /// Number of message bytes currently buffered
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops everything buffered
    pub fn reset(&mut self) {
        self.buf.clear();
        self.fragment_len = 0;
        self.last = [0; 2];
    }

    /// Consumes one raw byte from the link
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.last = [self.last[1], byte];

        if is_control(byte) {
            return match self.last {
                MESSAGE_END => {
                    let message = Vec::from(&self.buf[..]);
                    self.reset();
                    Some(Frame::Message(message))
                }
                FRAGMENT_END => {
                    self.fragment_len = 0;
                    self.last = [0; 2];
                    Some(Frame::Fragment)
                }
                _ => None,
            };
        }

        if self.buf.push(byte).is_err() {
            // only the unterminated fragment goes; earlier fragments were acknowledged
            let keep = self.buf.len() - self.fragment_len;
            self.buf.truncate(keep);
            self.fragment_len = 0;
            return Some(Frame::Overflow);
        }

        self.fragment_len += 1;
        None
    }
}

/// Whether the byte is one of the framing control characters
fn is_control(byte: u8) -> bool {
    matches!(byte, CR | LF | VT)
}

/// Reported by [`Channel::receive`] when a fragment overflowed the buffer
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Overflow;

/// A link together with its framer: receives whole messages and sends terminated responses
pub struct Channel<L: Link, const N: usize = LINK_BUFFER_SZ> {
    link: L,
    framer: Framer<N>,
}

impl<L: Link, const N: usize> Channel<L, N> {
    pub fn new(link: L) -> Self {
        Channel {
            link,
            framer: Framer::new(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Blocks until the next complete message, acknowledging fragments on the way.
    ///
    /// A complete message is acknowledged with status 1 before it is returned. An overflowing
    /// fragment is reported to the client with status 3 and surfaces as [`Overflow`]; the
    /// fragments received before it stay buffered, so the client may resend the fragment.
    pub fn receive(&mut self) -> Result<Vec<u8>, Overflow> {
        loop {
            let byte = match self.link.try_receive_byte() {
                Some(byte) => byte,
                None => continue,
            };

            match self.framer.push(byte) {
                Some(Frame::Message(message)) => {
                    self.send_status(Status::Ok);
                    return Ok(message);
                }
                Some(Frame::Fragment) => self.send_status(Status::FragmentAck),
                Some(Frame::Overflow) => {
                    debug!("Link buffer overflow, fragment dropped");
                    self.send_status(Status::Overflow);
                    return Err(Overflow);
                }
                None => {}
            }
        }
    }

    /// Sends a bare `{"status":N}` response
    pub fn send_status(&mut self, status: Status) {
        let mut response: FixedString<24> = FixedString::new();
        // 24 bytes hold the longest status object
        write!(response, "{{\"status\":{}}}", u8::from(status)).ok();
        self.send_frame(response.as_bytes());
    }

    /// Sends a structured response as a JSON object
    pub fn send<T: Serialize>(&mut self, response: &T) {
        match serde_json::to_vec(response) {
            Ok(bytes) => self.send_frame(&bytes),
            Err(_) => {
                debug!("Response could not be encoded");
                self.send_status(Status::Rejected)
            }
        }
    }

    /// Sends one message followed by the message terminator
    fn send_frame(&mut self, bytes: &[u8]) {
        self.link.send(bytes);
        self.link.send(&MESSAGE_END);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;

    fn feed<const N: usize>(framer: &mut Framer<N>, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|b| framer.push(*b)).collect()
    }

    #[test]
    fn complete_message_strips_terminator() {
        let mut framer: Framer<64> = Framer::new();
        let frames = feed(&mut framer, b"{\"type\":1}\x0b\n");
        assert_eq!(frames, vec![Frame::Message(b"{\"type\":1}".to_vec())]);
        assert!(framer.is_empty());
    }

    #[test]
    fn same_message_twice_frames_identically() {
        let mut framer: Framer<64> = Framer::new();
        let input = b"{\"type\":7,\"password\":\"abc\"}\x0b\n";
        let first = feed(&mut framer, input);
        assert!(framer.is_empty());
        let second = feed(&mut framer, input);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn fragments_accumulate_into_one_message() {
        let mut framer: Framer<64> = Framer::new();
        let frames = feed(&mut framer, b"{\"type\":2,\r\n\"hex\":\"AB\"}\x0b\n");
        assert_eq!(
            frames,
            vec![
                Frame::Fragment,
                Frame::Message(b"{\"type\":2,\"hex\":\"AB\"}".to_vec())
            ]
        );
    }

    #[test]
    fn lone_control_characters_are_dropped() {
        let mut framer: Framer<64> = Framer::new();
        assert_eq!(feed(&mut framer, b"a\rb\nc\x0bd"), vec![]);
        assert_eq!(framer.len(), 4);
    }

    #[test]
    fn overflow_without_terminator_reports_once() {
        let mut framer: Framer<8> = Framer::new();
        let frames = feed(&mut framer, b"123456789");
        assert_eq!(frames, vec![Frame::Overflow]);
        assert!(framer.is_empty());
    }

    #[test]
    fn overflow_keeps_earlier_fragments() {
        let mut framer: Framer<8> = Framer::new();
        assert_eq!(feed(&mut framer, b"abc\r\n"), vec![Frame::Fragment]);
        assert_eq!(feed(&mut framer, b"defghi"), vec![Frame::Overflow]);
        assert_eq!(framer.len(), 3);
        let frames = feed(&mut framer, b"xy\x0b\n");
        assert_eq!(frames, vec![Frame::Message(b"abcxy".to_vec())]);
    }

    struct Script {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl Link for Script {
        fn send(&mut self, bytes: &[u8]) {
            self.output.extend_from_slice(bytes);
        }

        fn try_receive_byte(&mut self) -> Option<u8> {
            Some(self.input.pop_front().expect("script exhausted"))
        }
    }

    #[test]
    fn channel_acknowledges_fragments_then_message() {
        let mut channel: Channel<Script, 64> = Channel::new(Script {
            input: b"{\"type\":\r\n1}\x0b\n".iter().copied().collect(),
            output: Vec::new(),
        });
        let message = channel.receive().unwrap();
        assert_eq!(message, b"{\"type\":1}".to_vec());
        assert_eq!(
            channel.link().output,
            b"{\"status\":2}\x0b\n{\"status\":1}\x0b\n".to_vec()
        );
    }

    #[test]
    fn channel_reports_overflow_status() {
        let mut channel: Channel<Script, 4> = Channel::new(Script {
            input: b"12345".iter().copied().collect(),
            output: Vec::new(),
        });
        assert_eq!(channel.receive(), Err(Overflow));
        assert_eq!(channel.link().output, b"{\"status\":3}\x0b\n".to_vec());
    }
}
