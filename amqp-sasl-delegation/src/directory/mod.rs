//! Verifies a username and password with an LDAP bind against one of several directory servers

use std::{fmt, io, str::FromStr};

pub mod bind;
pub mod dn;
pub mod endpoint;
mod server;

cfg_ldap! {
    pub mod ldap;
}

pub use bind::{Bind, SaslBind, SimpleBind};
pub use dn::{DnTemplate, DnTemplateError};
pub use endpoint::{
    DirectoryEndpoint, DirectoryEndpointSet, DirectoryScheme, EndpointError, FailoverOrder,
};
pub use server::DirectoryPlainServer;

use crate::Error;

/// Failure reported by a directory server or its connection
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The directory rejected the credentials (result code 49)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Any other non-success result code
    #[error("Directory returned result code {code}: {message}")]
    ResultCode {
        /// LDAP result code
        code: u32,
        /// Diagnostic message
        message: String,
    },

    /// The connector cannot perform this SASL bind
    #[error("SASL bind mechanism {0} is not supported by the directory connector")]
    UnsupportedMechanism(&'static str),

    /// The connection was already closed
    #[error("Directory connection is closed")]
    Closed,

    /// Error raised by the LDAP client
    #[cfg(feature = "ldap")]
    #[error(transparent)]
    Ldap(#[from] ::ldap3::LdapError),

    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),
}

/// SASL mechanisms a directory bind may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslBindMechanism {
    /// `CRAM-MD5`
    CramMd5,

    /// `DIGEST-MD5`, which also carries a realm
    DigestMd5,
}

impl SaslBindMechanism {
    /// Registered mechanism name
    pub fn name(&self) -> &'static str {
        match self {
            SaslBindMechanism::CramMd5 => "CRAM-MD5",
            SaslBindMechanism::DigestMd5 => "DIGEST-MD5",
        }
    }
}

impl fmt::Display for SaslBindMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SaslBindMechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRAM-MD5" => Ok(SaslBindMechanism::CramMd5),
            "DIGEST-MD5" => Ok(SaslBindMechanism::DigestMd5),
            other => Err(format!("unsupported SASL bind mechanism {:?}", other)),
        }
    }
}

/// Parameters of a SASL bind
#[derive(Clone, Copy)]
pub struct SaslBindRequest<'a> {
    /// Mechanism
    pub mechanism: SaslBindMechanism,

    /// Authentication identity
    pub username: &'a str,

    /// Authorization identity
    pub authorization_id: &'a str,

    /// Password
    pub credentials: &'a str,

    /// Realm, used by `DIGEST-MD5`
    pub realm: Option<&'a str>,
}

impl fmt::Debug for SaslBindRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslBindRequest")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("authorization_id", &self.authorization_id)
            .field("credentials", &"<redacted>")
            .field("realm", &self.realm)
            .finish()
    }
}

/// Opens connections to directory servers
pub trait DirectoryConnector {
    /// Connection type
    type Connection: DirectoryConnection;

    /// Connects to one endpoint
    fn connect(&self, endpoint: &DirectoryEndpoint) -> Result<Self::Connection, DirectoryError>;

    /// Whether connections can perform a SASL bind with `mechanism`
    fn supports_sasl_bind(&self, _mechanism: SaslBindMechanism) -> bool {
        true
    }
}

/// An open connection to a directory server
pub trait DirectoryConnection {
    /// Simple bind. A rejected password is reported as [`DirectoryError::InvalidCredentials`].
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// SASL bind. A rejected password is reported as [`DirectoryError::InvalidCredentials`].
    fn sasl_bind(&mut self, request: &SaslBindRequest<'_>) -> Result<(), DirectoryError>;

    /// Return the connection to the unauthenticated state
    fn anonymous_bind(&mut self) -> Result<(), DirectoryError>;

    /// Unbind and close
    fn close(&mut self) -> Result<(), DirectoryError>;
}

/// Connects to the first reachable endpoint, trying them in `order`
pub fn connect_any<D>(
    connector: &D,
    endpoints: &DirectoryEndpointSet,
    order: FailoverOrder,
) -> Result<D::Connection, Error>
where
    D: DirectoryConnector + ?Sized,
{
    for endpoint in endpoints.ordered(order) {
        match connector.connect(endpoint) {
            Ok(connection) => {
                trace_event!(debug, "Connected to directory {}", endpoint);
                return Ok(connection);
            }
            Err(_err) => {
                trace_event!(warn, "Unable to connect to directory {}: {}", endpoint, _err);
            }
        }
    }
    Err(Error::NoReachableDirectory(endpoints.len()))
}
