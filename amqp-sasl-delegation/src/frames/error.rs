use std::io;

/// Errors associated with the SASL frame encoder and decoder
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The frame body could not be decoded
    #[error("Decode Error {0}")]
    DecodeError(String),

    /// The frame is shorter than its fixed header
    #[error("Frame of {0} bytes is shorter than the frame header")]
    Truncated(usize),

    /// The frame is not a SASL frame
    #[error("Unexpected frame type {0:#04x}")]
    UnexpectedFrameType(u8),

    /// Extended frame headers are not used by the SASL layer
    #[error("Unsupported data offset {0}")]
    UnsupportedDataOffset(u8),
}

impl From<serde_amqp::Error> for Error {
    fn from(err: serde_amqp::Error) -> Self {
        match err {
            serde_amqp::Error::Io(e) => Self::Io(e),
            other => Self::DecodeError(other.to_string()),
        }
    }
}
