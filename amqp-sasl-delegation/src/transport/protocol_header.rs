//! AMQP protocol header and its codec

use std::convert::TryFrom;

use bytes::{Buf, BufMut, BytesMut};
use fe2o3_amqp_types::definitions::{MAJOR, MINOR, REVISION};
use tokio_util::codec::{Decoder, Encoder};

use super::Error;

const PROTOCOL_HEADER_PREFIX: &[u8; 4] = b"AMQP";

/// Length of a protocol header in bytes
pub const PROTOCOL_HEADER_LEN: usize = 8;

/// Protocol header sent by both peers before any frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Protocol ID
    pub id: ProtocolId,

    /// Major number
    pub major: u8,

    /// Minor number
    pub minor: u8,

    /// Revision number
    pub revision: u8,
}

impl ProtocolHeader {
    /// Creates a new protocol header
    pub fn new(id: ProtocolId, major: u8, minor: u8, revision: u8) -> Self {
        Self {
            id,
            major,
            minor,
            revision,
        }
    }

    /// Creates a SASL protocol header for AMQP 1.0.0
    pub fn sasl() -> Self {
        Self::new(ProtocolId::Sasl, MAJOR, MINOR, REVISION)
    }

    /// Returns whether this is the SASL header of the supported protocol version
    pub fn is_supported_sasl(&self) -> bool {
        self.id == ProtocolId::Sasl
            && self.major == MAJOR
            && self.minor == MINOR
            && self.revision == REVISION
    }
}

impl From<ProtocolHeader> for [u8; PROTOCOL_HEADER_LEN] {
    fn from(value: ProtocolHeader) -> Self {
        let [a, m, q, p] = *PROTOCOL_HEADER_PREFIX;
        [
            a,
            m,
            q,
            p,
            value.id as u8,
            value.major,
            value.minor,
            value.revision,
        ]
    }
}

impl<'a> TryFrom<&'a [u8]> for ProtocolHeader {
    type Error = &'a [u8];

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        if value.len() != PROTOCOL_HEADER_LEN || &value[..4] != PROTOCOL_HEADER_PREFIX {
            return Err(value);
        }
        let id = ProtocolId::try_from(value[4]).map_err(|_| value)?;
        Ok(Self::new(id, value[5], value[6], value[7]))
    }
}

/// Protocol ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolId {
    /// AMQP
    Amqp = 0x0,

    /// TLS
    Tls = 0x2,

    /// SASL
    Sasl = 0x3,
}

impl TryFrom<u8> for ProtocolId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Amqp),
            0x2 => Ok(Self::Tls),
            0x3 => Ok(Self::Sasl),
            other => Err(other),
        }
    }
}

/// Encoder and decoder of the protocol header
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolHeaderCodec {}

impl Encoder<ProtocolHeader> for ProtocolHeaderCodec {
    type Error = Error;

    fn encode(&mut self, item: ProtocolHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes: [u8; PROTOCOL_HEADER_LEN] = item.into();
        dst.put_slice(&bytes);
        Ok(())
    }
}

impl Decoder for ProtocolHeaderCodec {
    type Item = ProtocolHeader;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PROTOCOL_HEADER_LEN {
            return Ok(None);
        }

        let mut raw = [0u8; PROTOCOL_HEADER_LEN];
        src.copy_to_slice(&mut raw);
        ProtocolHeader::try_from(&raw[..])
            .map(Some)
            .map_err(|_| Error::ProtocolHeaderMismatch(raw))
    }
}
