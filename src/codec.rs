//! Decoding of request messages and encoding of structured responses.
//!
//! A request is a flat JSON object whose values are read positionally: the first value is always
//! the integer message kind, and the kind fixes how many further values follow and what they mean.
//! Key names are not consulted. Values are kept as text and no semantic validation happens here;
//! the [controller](crate::controller) validates what it uses.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Serialize, Serializer};

/// Status codes carried by every response
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    /// Request rejected or invalid
    Rejected,
    /// Request handled
    Ok,
    /// A fragment of a message was received
    FragmentAck,
    /// A fragment overflowed the link buffer and was dropped
    Overflow,
    /// No secret has been configured yet
    NotConfigured,
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        match status {
            Status::Rejected => 0,
            Status::Ok => 1,
            Status::FragmentAck => 2,
            Status::Overflow => 3,
            Status::NotConfigured => 9,
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*self))
    }
}

/// Errors raised while decoding a message
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// The message is not a flat JSON object
    Malformed,
    /// The message carries fewer values than its kind requires
    MissingFields {
        /// Values required, the kind included
        expected: usize,
        /// Values present
        found: usize,
    },
}

/// Result type for decoding
pub type Result<T> = core::result::Result<T, Error>;

/// The top-level values of a request message, in the order they appeared
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Fields {
    values: Vec<String>,
}

impl Fields {
    /// Parses a framed message
    pub fn parse(raw: &[u8]) -> Result<Fields> {
        serde_json::from_slice(raw).map_err(|_| Error::Malformed)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The first `n` values, or an error if fewer are present
    pub fn take(&self, n: usize) -> Result<&[String]> {
        self.values.get(..n).ok_or(Error::MissingFields {
            expected: n,
            found: self.values.len(),
        })
    }

    /// The message kind, if the first value is an integer
    pub fn kind(&self) -> Option<u8> {
        self.values.first().and_then(|kind| kind.parse().ok())
    }

    /// Interprets the values according to the message kind
    pub fn request(&self) -> Result<Request<'_>> {
        let request = match self.kind() {
            Some(1) => Request::GenerateChallenge,
            Some(2) => {
                let f = self.take(3)?;
                Request::Verify {
                    password: &f[1],
                    hex: &f[2],
                }
            }
            Some(3) => {
                let f = self.take(6)?;
                Request::Upload(UploadPacket {
                    file_id: &f[1],
                    packet_number: &f[2],
                    total_packets: &f[3],
                    location: &f[4],
                    file_data: &f[5],
                })
            }
            Some(4) => {
                let f = self.take(4)?;
                Request::Download {
                    component: &f[1],
                    file_id: &f[2],
                    location: &f[3],
                }
            }
            Some(6) => {
                let f = self.take(3)?;
                Request::ConfigureNetwork {
                    ssid: &f[1],
                    password: &f[2],
                }
            }
            Some(7) => {
                let f = self.take(2)?;
                Request::SetSecret { password: &f[1] }
            }
            _ => Request::Unknown,
        };
        Ok(request)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a flat JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> core::result::Result<Fields, A::Error> {
        let mut values = Vec::new();
        while map.next_key::<IgnoredAny>()?.is_some() {
            let Scalar(value) = map.next_value()?;
            values.push(value);
        }
        Ok(Fields { values })
    }
}

/// One JSON scalar, rendered as text
struct Scalar(String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> core::result::Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> core::result::Result<Scalar, E> {
        Ok(Scalar(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> core::result::Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> core::result::Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> core::result::Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> core::result::Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> core::result::Result<Scalar, E> {
        Ok(Scalar(String::from("null")))
    }
}

/// A decoded request. Every argument borrows from the [`Fields`] it came from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Request<'a> {
    /// Kind 1
    GenerateChallenge,
    /// Kind 2
    Verify { password: &'a str, hex: &'a str },
    /// Kind 3
    Upload(UploadPacket<'a>),
    /// Kind 4
    Download {
        component: &'a str,
        file_id: &'a str,
        location: &'a str,
    },
    /// Kind 6
    ConfigureNetwork { ssid: &'a str, password: &'a str },
    /// Kind 7
    SetSecret { password: &'a str },
    /// Any other kind, or a kind which isn't an integer
    Unknown,
}

/// One packet of an upload, as sent by the client
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UploadPacket<'a> {
    pub file_id: &'a str,
    pub packet_number: &'a str,
    pub total_packets: &'a str,
    pub location: &'a str,
    pub file_data: &'a str,
}

/// Final response of an upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadComplete<'a> {
    pub status: Status,
    pub local_encryption_component: &'a str,
}

/// One packet of a download
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPacket<'a> {
    pub status: Status,
    pub packet_number: usize,
    pub total_packets: usize,
    pub file_data: &'a str,
}
