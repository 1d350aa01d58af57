//! SASL frame body and its encoder and decoder

use bytes::{Buf, BufMut, BytesMut};
use serde::{
    de::{self, VariantAccess},
    ser, Deserialize, Serialize,
};

use fe2o3_amqp_types::sasl::{SaslChallenge, SaslInit, SaslMechanisms, SaslOutcome, SaslResponse};
use serde_amqp::{de::Deserializer, read::IoReader, ser::Serializer};
use tokio_util::codec::{Decoder, Encoder};

use super::{Error, DEFAULT_DATA_OFFSET, FRAME_HEADER_TAIL_LEN, FRAME_TYPE_SASL};

/// Body of a SASL frame
#[derive(Debug)]
pub enum Frame {
    /// sasl-mechanisms, server to client
    Mechanisms(SaslMechanisms),

    /// sasl-init, client to server
    Init(SaslInit),

    /// sasl-challenge, server to client
    Challenge(SaslChallenge),

    /// sasl-response, client to server
    Response(SaslResponse),

    /// sasl-outcome, server to client
    Outcome(SaslOutcome),
}

impl Frame {
    /// Name of the performative, suitable for logging without exposing its payload
    pub fn name(&self) -> &'static str {
        self.descriptor().name()
    }

    fn descriptor(&self) -> Descriptor {
        match self {
            Frame::Mechanisms(_) => Descriptor::Mechanisms,
            Frame::Init(_) => Descriptor::Init,
            Frame::Challenge(_) => Descriptor::Challenge,
            Frame::Response(_) => Descriptor::Response,
            Frame::Outcome(_) => Descriptor::Outcome,
        }
    }
}

/// Encoder and decoder of a SASL frame without its 4-byte size prefix.
///
/// The size prefix is handled by a length delimited codec; see
/// [`crate::transport::length_delimited_encoder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec {}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(DEFAULT_DATA_OFFSET);
        dst.put_u8(FRAME_TYPE_SASL);
        // bytes 6 and 7 of the header are ignored
        dst.put_u16(0x0000);

        let mut serializer = Serializer::from(dst.writer());
        item.serialize(&mut serializer)?;
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_TAIL_LEN {
            return Err(Error::Truncated(src.len()));
        }

        let doff = src.get_u8();
        let ftype = src.get_u8();
        let _ignored = src.get_u16();

        if ftype != FRAME_TYPE_SASL {
            return Err(Error::UnexpectedFrameType(ftype));
        }
        if doff != DEFAULT_DATA_OFFSET {
            return Err(Error::UnsupportedDataOffset(doff));
        }

        let mut deserializer = Deserializer::new(IoReader::new(src.reader()));
        let frame = Frame::deserialize(&mut deserializer)?;
        Ok(Some(frame))
    }
}

impl ser::Serialize for Frame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Frame::Mechanisms(value) => value.serialize(serializer),
            Frame::Init(value) => value.serialize(serializer),
            Frame::Challenge(value) => value.serialize(serializer),
            Frame::Response(value) => value.serialize(serializer),
            Frame::Outcome(value) => value.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Descriptor {
    Mechanisms,
    Init,
    Challenge,
    Response,
    Outcome,
}

impl Descriptor {
    const ALL: [Descriptor; 5] = [
        Descriptor::Mechanisms,
        Descriptor::Init,
        Descriptor::Challenge,
        Descriptor::Response,
        Descriptor::Outcome,
    ];

    const SYMBOLS: &'static [&'static str] = &[
        "amqp:sasl-mechanisms:list",
        "amqp:sasl-init:list",
        "amqp:sasl-challenge:list",
        "amqp:sasl-response:list",
        "amqp:sasl-outcome:list",
    ];

    fn symbol(self) -> &'static str {
        Self::SYMBOLS[self as usize]
    }

    fn code(self) -> u64 {
        0x0000_0000_0000_0040 + self as u64
    }

    fn name(self) -> &'static str {
        match self {
            Descriptor::Mechanisms => "sasl-mechanisms",
            Descriptor::Init => "sasl-init",
            Descriptor::Challenge => "sasl-challenge",
            Descriptor::Response => "sasl-response",
            Descriptor::Outcome => "sasl-outcome",
        }
    }
}

struct DescriptorVisitor {}

impl<'de> de::Visitor<'de> for DescriptorVisitor {
    type Value = Descriptor;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("SASL frame body descriptor")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Descriptor::ALL
            .into_iter()
            .find(|d| d.symbol() == v)
            .ok_or_else(|| de::Error::custom("Wrong symbol value for SASL frame body descriptor"))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Descriptor::ALL
            .into_iter()
            .find(|d| d.code() == v)
            .ok_or_else(|| de::Error::custom("Wrong code value for SASL frame body descriptor"))
    }
}

impl<'de> de::Deserialize<'de> for Descriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_identifier(DescriptorVisitor {})
    }
}

struct FrameVisitor {}

impl<'de> de::Visitor<'de> for FrameVisitor {
    type Value = Frame;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("enum SASL FrameBody")
    }

    fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
    where
        A: de::EnumAccess<'de>,
    {
        let (descriptor, variant) = data.variant()?;
        let frame = match descriptor {
            Descriptor::Mechanisms => Frame::Mechanisms(variant.newtype_variant()?),
            Descriptor::Init => Frame::Init(variant.newtype_variant()?),
            Descriptor::Challenge => Frame::Challenge(variant.newtype_variant()?),
            Descriptor::Response => Frame::Response(variant.newtype_variant()?),
            Descriptor::Outcome => Frame::Outcome(variant.newtype_variant()?),
        };
        Ok(frame)
    }
}

impl<'de> de::Deserialize<'de> for Frame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_enum("sasl::FrameBody", Descriptor::SYMBOLS, FrameVisitor {})
    }
}
