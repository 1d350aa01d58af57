//! Client side of the AMQP 1.0 SASL layer over a blocking socket

use tokio_util::codec::LengthDelimitedCodec;

pub mod engine;
pub mod protocol_header;
pub mod pump;

mod error;
pub use error::Error;

pub use engine::{SaslClientEngine, SaslState, TransportEngine};
pub use pump::{flush, pump_until, PumpError, Socket};

/// Length delimited codec writing the 4-byte frame size, which counts itself
pub fn length_delimited_encoder(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .max_frame_length(max_frame_size - 4)
        .length_adjustment(-4)
        .new_codec()
}

/// Length delimited codec reading the 4-byte frame size, which counts itself
pub fn length_delimited_decoder(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .max_frame_length(max_frame_size)
        .length_adjustment(-4)
        .new_codec()
}
