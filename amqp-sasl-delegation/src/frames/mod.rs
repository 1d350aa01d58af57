//! AMQP 1.0 SASL frames
//!
//! Only the SASL layer is spoken here. A frame of any other type arriving during negotiation
//! is rejected by the decoder.

pub mod sasl;

mod error;
pub use error::Error;

/// Frame type of an AMQP frame
pub const FRAME_TYPE_AMQP: u8 = 0x00;

/// Frame type of a SASL frame
pub const FRAME_TYPE_SASL: u8 = 0x01;

/// Data offset (in 4-byte words) of a frame without extended header
pub const DEFAULT_DATA_OFFSET: u8 = 0x02;

/// Size of the frame header that follows the 4-byte size field
pub(crate) const FRAME_HEADER_TAIL_LEN: usize = 4;
