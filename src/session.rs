//! The authentication state machine.
//!
//! ```text
//!                  set_secret                issue_challenge              verify (match)
//!   (no secret) ─────────────▶ Unauthenticated ───────────▶ ChallengeIssued ─────────▶ Verified
//!                                    ▲                         │    ▲                    │
//!                                    │                         └────┘ verify (mismatch)  │
//!                                    └──────── set_secret / reset ───────────────────────┘
//! ```
//!
//! A challenge can be issued again from any state once a secret exists, which returns the session
//! to `ChallengeIssued`. A failed verification leaves the session where it was.

use heapless::String as FixedString;
use rand::RngCore;

use crate::config::MAX_SECRET_LEN;
use crate::debug;

/// Verification state
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Unauthenticated,
    ChallengeIssued,
    Verified,
}

/// Why the session refused a transition
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// No secret has been configured
    NotConfigured,
    /// The request isn't legal in the current state
    OutOfOrder,
    /// The password or the challenge didn't match
    Mismatch,
}

/// Result type for session transitions
pub type Result<T> = core::result::Result<T, Error>;

/// The 24-bit code shown on the hex display
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Challenge(u32);

impl Challenge {
    /// Draws a new code from three random bytes
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0_u8; 3];
        rng.fill_bytes(&mut bytes);
        Challenge(u32::from(bytes[2]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[0]))
    }

    pub fn code(&self) -> u32 {
        self.0
    }

    /// Compares against the six upper-case hex digits the client read off the display
    pub fn matches(&self, hex: &str) -> bool {
        let mut expected: FixedString<8> = FixedString::new();
        if core::fmt::write(&mut expected, format_args!("{:06X}", self.0)).is_err() {
            return false;
        }
        expected.as_str() == hex
    }
}

impl From<u32> for Challenge {
    fn from(code: u32) -> Self {
        Challenge(code & 0x00ff_ffff)
    }
}

/// The device's authentication state, from power-on to power-off
#[derive(Debug)]
pub struct Session {
    state: State,
    secret: Option<FixedString<MAX_SECRET_LEN>>,
    network_configured: bool,
    challenge: Option<Challenge>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: State::Unauthenticated,
            secret: None,
            network_configured: false,
            challenge: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.as_str())
    }

    pub fn secret_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn network_configured(&self) -> bool {
        self.network_configured
    }

    pub fn challenge(&self) -> Option<Challenge> {
        self.challenge
    }

    /// Stores a new secret, truncated to what the device holds. Any verification is dropped.
    pub fn set_secret(&mut self, secret: &str) {
        self.secret = Some(truncate(secret));
        self.state = State::Unauthenticated;
        self.challenge = None;
        debug!("Secret configured; session unauthenticated");
    }

    pub fn set_network_configured(&mut self, configured: bool) {
        self.network_configured = configured;
    }

    /// Issues a fresh challenge, replacing any earlier one
    pub fn issue_challenge<R: RngCore>(&mut self, rng: &mut R) -> Result<Challenge> {
        if !self.secret_configured() {
            return Err(Error::NotConfigured);
        }
        let challenge = Challenge::generate(rng);
        self.challenge = Some(challenge);
        self.state = State::ChallengeIssued;
        debug!("Challenge issued; session awaiting verification");
        Ok(challenge)
    }

    /// Checks the password and the echoed challenge. Only legal while a challenge is outstanding.
    pub fn verify(&mut self, password: &str, hex: &str) -> Result<()> {
        let (secret, challenge) = match (&self.secret, self.challenge) {
            (Some(secret), Some(challenge)) if self.state == State::ChallengeIssued => {
                (secret, challenge)
            }
            _ => return Err(Error::OutOfOrder),
        };

        if truncate(password) != *secret || !challenge.matches(hex) {
            debug!("Verification failed");
            return Err(Error::Mismatch);
        }

        self.state = State::Verified;
        debug!("Session verified");
        Ok(())
    }

    /// Fails unless the session is verified
    pub fn require_verified(&self) -> Result<()> {
        match self.state {
            State::Verified => Ok(()),
            _ => Err(Error::OutOfOrder),
        }
    }

    /// Drops verification and any outstanding challenge; the secret is kept
    pub fn reset(&mut self) {
        self.state = State::Unauthenticated;
        self.challenge = None;
        debug!("Session reset");
    }
}

/// The longest prefix of `s` which fits the secret store and ends on a character boundary
fn truncate(s: &str) -> FixedString<MAX_SECRET_LEN> {
    let mut out = FixedString::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
