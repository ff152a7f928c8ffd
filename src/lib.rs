// Generate this documentation in a prettier form with `cargo doc --open`

//! CloudLockr appliance firmware: the request protocol engine.
//!
//! The appliance pairs with a mobile client over a short-range serial link, verifies the user
//! against a stored secret and a challenge shown on the board, then streams file content to and
//! from a remote storage service in encrypted 16-byte blocks. The only cryptographic primitive
//! available on the board is a hardware AES block.
//!
//! ## Building
//!
//! The protocol engine is a `no_std` library which builds and tests on the host:
//! `cargo test`. The firmware image additionally needs the `board` feature and a Cortex-M target:
//!
//!  - Install the `thumbv7m-none-eabi` target via rustup: `rustup target add thumbv7m-none-eabi`
//!  - Build it! `cargo build --release --features board --target thumbv7m-none-eabi`.
//!    Optionally add `--features semihosted` to log debug information to the host through QEMU
//!    semihosting.
//!  - `CLOUDLOCKR_RESPONSE_DELAY_MS` and `CLOUDLOCKR_STORAGE_HOST` may be set at build time to
//!    override the values baked into the image.
//!
//! The image uses the `lm3s6965` memory layout and is meant for an emulated board (QEMU
//! `lm3s6965evb` with the CloudLockr peripherals mapped at their fabric addresses). See the
//! `board` module for the peripheral map.
//!
//! ## Design
//!
//! The engine is split into leaves which know nothing of each other, composed by the
//! [controller](controller::Controller):
//!
//!  - the [framer](link::Framer) reassembles the raw link byte stream into request messages,
//!    acknowledging fragments and reporting overflow; the [channel](link::Channel) pairs it with
//!    the send side of the link
//!  - the [codec](codec) turns a message into an ordered list of field strings and a typed
//!    [request](codec::Request), and encodes responses
//!  - the [key deriver](keys::KeyDeriver) produces and reproduces the per-transfer AES key
//!  - the [block cipher pipeline](cipher::Pipeline) feeds payloads through the cipher
//!    [peer](cipher::Peer) one block at a time
//!  - the [session](session::Session) is the authentication state machine which gates every
//!    request
//!
//! Every piece of hardware is reached through a trait: [`Link`](link::Link),
//! [`Network`](network::Network), [`Sensor`](hardware::Sensor),
//! [`HardwareIo`](hardware::HardwareIo) and the cipher [`Peer`](cipher::Peer). The memory-mapped
//! implementations live in the `board` module; the tests substitute fakes.
//!
//! The controller is single-threaded and cooperative. One message is framed, decoded, dispatched
//! and answered before the next byte is read, and a multi-packet transfer owns the link until it
//! finishes or fails.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cipher;
pub mod codec;
pub mod config;
pub mod controller;
pub mod cursor;
pub mod hardware;
pub mod keys;
pub mod link;
pub mod network;
pub mod session;

#[cfg(feature = "board")]
pub mod board;

pub use crate::controller::Controller;

/// Logs to the debugging host when semihosting is enabled; compiles to nothing otherwise
#[macro_export]
macro_rules! debug {
    ($($args: expr),+) => {
        #[cfg(feature = "semihosted")]
        ::cortex_m_semihosting::hprintln!($($args),+).ok();
    }
}
