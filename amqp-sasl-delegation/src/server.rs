//! The credential verifier contract a host authentication framework drives

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::Error;

/// Terminal result of an authentication exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The credentials were accepted
    Success,

    /// The exchange failed, for whatever reason
    Failure,
}

/// Server side of one SASL authentication exchange.
///
/// The host calls [`evaluate`](SaslServer::evaluate) with each client message and sends the
/// returned bytes back to the client until [`is_complete`](SaslServer::is_complete) turns
/// `true`. A session is driven by one thread at a time and is never reused.
pub trait SaslServer {
    /// Registered name of the mechanism
    fn mechanism_name(&self) -> &str;

    /// Processes a client message and returns the next server message.
    ///
    /// Any error is terminal: the session is complete and failed afterwards, and the resources
    /// it held have been released.
    fn evaluate(&mut self, response: &[u8]) -> Result<Bytes, Error>;

    /// Whether the exchange has reached an outcome
    fn is_complete(&self) -> bool;

    /// Outcome of the exchange, once complete
    fn outcome(&self) -> Option<Outcome>;

    /// Identity the client is authorized as. Only available after a successful exchange.
    fn authorization_id(&self) -> Result<&str, Error>;

    /// Protects outgoing bytes. No security layer is ever negotiated, so bytes pass through.
    fn wrap(&self, outgoing: &[u8]) -> Result<Bytes, Error> {
        match self.is_complete() {
            true => Ok(Bytes::copy_from_slice(outgoing)),
            false => Err(Error::NotYetComplete),
        }
    }

    /// Unprotects incoming bytes. No security layer is ever negotiated, so bytes pass through.
    fn unwrap(&self, incoming: &[u8]) -> Result<Bytes, Error> {
        match self.is_complete() {
            true => Ok(Bytes::copy_from_slice(incoming)),
            false => Err(Error::NotYetComplete),
        }
    }

    /// A negotiated property such as the quality of protection. None are negotiated.
    fn negotiated_property(&self, _name: &str) -> Result<Option<String>, Error> {
        match self.is_complete() {
            true => Ok(None),
            false => Err(Error::NotYetComplete),
        }
    }

    /// Releases every resource held by the session. Calling it again is a no-op.
    fn dispose(&mut self) -> Result<(), Error>;
}

static SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id correlating the log lines of one session
pub(crate) fn next_session_id() -> u64 {
    SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a successful exchange, or [`Error::NotYetComplete`]
pub(crate) fn authorized(
    outcome: Option<Outcome>,
    authorization_id: Option<&str>,
) -> Result<&str, Error> {
    match (outcome, authorization_id) {
        (Some(Outcome::Success), Some(id)) => Ok(id),
        _ => Err(Error::NotYetComplete),
    }
}
