use std::io;

use fe2o3_amqp_types::sasl::SaslCode;

use crate::frames;

/// Errors raised by the transport engine while negotiating SASL with the upstream
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A frame could not be encoded or decoded
    #[error(transparent)]
    Frame(#[from] frames::Error),

    /// The upstream answered with a header other than the supported SASL header
    #[error("Protocol header mismatch {0:?}")]
    ProtocolHeaderMismatch([u8; 8]),

    /// A frame arrived that the SASL client does not expect in its current state
    #[error("Unexpected {frame} frame while {state}")]
    UnexpectedFrame {
        /// Name of the received frame
        frame: &'static str,
        /// Engine state at the time
        state: &'static str,
    },

    /// The engine was asked to do something its state does not allow
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// The engine is closed
    #[error("Transport engine is closed")]
    Closed,

    /// The outcome code and the server-final message disagree
    #[error("SASL outcome {code:?} disagrees with the server-final message")]
    OutcomeMismatch {
        /// Outcome code reported by the upstream
        code: SaslCode,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Frame(frames::Error::Io(err))
    }
}
