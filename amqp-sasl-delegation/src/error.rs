//! Errors surfaced to the host by a credential verifier

use std::io;

use crate::{directory::DirectoryError, transport};

/// Message shown to clients for every failure
pub const CLIENT_FAILURE_MESSAGE: &str = "Authentication failed";

/// Failure of an authentication attempt.
///
/// Every variant is terminal for the session it came from. Only [`Error::client_message`]
/// should ever reach the client, so that a rejected credential cannot be told apart from an
/// infrastructure fault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The client message does not follow the mechanism's wire format
    #[error("Badly formed request: {0}")]
    MalformedRequest(String),

    /// The authentication identity is empty
    #[error("Authentication failed: username not specified")]
    EmptyIdentity,

    /// The secret is empty
    #[error("Authentication failed: password not specified")]
    EmptySecret,

    /// The authorization identity differs from the authentication identity
    #[error("Authentication failed: Client requested an authorization id that is different from username")]
    ImpersonationNotSupported,

    /// The upstream server could not be reached
    #[error("Unable to connect to {host}:{port}")]
    ConnectFailure {
        /// Upstream host
        host: String,
        /// Upstream port
        port: u16,
        /// Cause
        #[source]
        source: io::Error,
    },

    /// None of the configured directory servers could be reached
    #[error("Failed to connect to any of the {0} given directory servers")]
    NoReachableDirectory(usize),

    /// Connecting to or negotiating with the upstream took too long
    #[error("Timed out waiting for the upstream server")]
    UpstreamTimeout,

    /// The upstream does not announce the requested mechanism
    #[error("Upstream server supports mechanisms {offered:?} which does not include {requested}")]
    MechanismNotOffered {
        /// Mechanism the session needs
        requested: String,
        /// Mechanisms the upstream announced
        offered: Vec<String>,
    },

    /// The upstream sent something the SASL client cannot accept
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[source] transport::Error),

    /// The upstream closed the connection before the exchange finished
    #[error("Unexpected end of stream while authenticating using SASL delegation")]
    UnexpectedEndOfStream,

    /// The upstream reported an outcome before sending its challenge
    #[error("Upstream server ended the SASL exchange prematurely")]
    UpstreamEndedEarly,

    /// `evaluate` was called when the session does not expect a client message
    #[error("evaluate called when in state {0}")]
    IllegalSequencing(&'static str),

    /// The upstream rejected the credentials
    #[error("Authentication failed: invalid credentials")]
    UpstreamRejected,

    /// The directory server failed the bind for a reason other than the credentials
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The operation needs a completed exchange, or `evaluate` was called after completion
    #[error("Operation not allowed at this point of the authentication exchange")]
    NotYetComplete,

    /// IO error on the upstream socket
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),
}

/// Coarse classification of an [`Error`] for operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client sent a malformed or disallowed message
    ClientInput,

    /// The upstream or directory could not be reached in time
    Transport,

    /// A peer or the host broke the protocol contract
    Protocol,

    /// The credentials were rejected
    Rejected,

    /// The directory failed
    Directory,

    /// The host used the verifier before it completed
    Usage,
}

impl Error {
    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedRequest(_)
            | Error::EmptyIdentity
            | Error::EmptySecret
            | Error::ImpersonationNotSupported => ErrorKind::ClientInput,
            Error::ConnectFailure { .. }
            | Error::NoReachableDirectory(_)
            | Error::UpstreamTimeout
            | Error::UnexpectedEndOfStream
            | Error::Io(_) => ErrorKind::Transport,
            Error::MechanismNotOffered { .. }
            | Error::ProtocolViolation(_)
            | Error::UpstreamEndedEarly
            | Error::IllegalSequencing(_) => ErrorKind::Protocol,
            Error::UpstreamRejected => ErrorKind::Rejected,
            Error::Directory(_) => ErrorKind::Directory,
            Error::NotYetComplete => ErrorKind::Usage,
        }
    }

    /// The only message a client is ever told
    pub fn client_message(&self) -> &'static str {
        CLIENT_FAILURE_MESSAGE
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedRequest(reason.into())
    }
}

impl From<transport::PumpError> for Error {
    fn from(err: transport::PumpError) -> Self {
        match err {
            transport::PumpError::UnexpectedEndOfStream => Error::UnexpectedEndOfStream,
            transport::PumpError::ProtocolViolation(cause) => Error::ProtocolViolation(cause),
            transport::PumpError::Timeout => Error::UpstreamTimeout,
            transport::PumpError::Io(err) => Error::Io(err),
        }
    }
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        Error::ProtocolViolation(err)
    }
}
