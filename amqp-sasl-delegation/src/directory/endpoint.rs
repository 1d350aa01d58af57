//! Directory server endpoints and the order in which they are tried

use std::{fmt, str::FromStr};

use rand::{seq::SliceRandom, thread_rng};
use url::Url;

/// Default port of `ldap://`
pub const LDAP_PORT: u16 = 389;

/// Default port of `ldaps://`
pub const LDAPS_PORT: u16 = 636;

/// An endpoint that cannot be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// Not a URL
    #[error("Invalid directory URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Neither `ldap` nor `ldaps`
    #[error("Unsupported scheme {0:?} in directory URL, expected ldap or ldaps")]
    UnsupportedScheme(String),

    /// The URL has no host
    #[error("Missing host in directory URL {0:?}")]
    MissingHost(String),

    /// No URL at all
    #[error("No directory URL given")]
    Empty,
}

/// Transport security of a directory endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryScheme {
    /// Plaintext `ldap://`
    Ldap,

    /// TLS `ldaps://`
    Ldaps,
}

impl DirectoryScheme {
    /// URL scheme
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryScheme::Ldap => "ldap",
            DirectoryScheme::Ldaps => "ldaps",
        }
    }

    /// Port used when the URL has none
    pub fn default_port(&self) -> u16 {
        match self {
            DirectoryScheme::Ldap => LDAP_PORT,
            DirectoryScheme::Ldaps => LDAPS_PORT,
        }
    }
}

/// One directory server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryEndpoint {
    /// Transport security
    pub scheme: DirectoryScheme,

    /// Host name or address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl DirectoryEndpoint {
    /// Creates an endpoint on the scheme's default port
    pub fn new(scheme: DirectoryScheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
            port: scheme.default_port(),
        }
    }

    /// The endpoint as a URL without path
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DirectoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl FromStr for DirectoryEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|err| EndpointError::InvalidUrl {
            url: s.to_string(),
            reason: err.to_string(),
        })?;

        let scheme = match url.scheme() {
            "ldap" => DirectoryScheme::Ldap,
            "ldaps" => DirectoryScheme::Ldaps,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| EndpointError::MissingHost(s.to_string()))?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            port: url.port().unwrap_or_else(|| scheme.default_port()),
        })
    }
}

/// Order in which endpoints are tried for each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailoverOrder {
    /// A fresh random order per attempt, spreading load across servers
    #[default]
    Shuffled,

    /// The configured order
    Sequential,
}

impl FromStr for FailoverOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shuffled" | "random" => Ok(FailoverOrder::Shuffled),
            "sequential" | "ordered" => Ok(FailoverOrder::Sequential),
            other => Err(format!("unknown failover order {:?}", other)),
        }
    }
}

/// The directory servers a backend may bind against. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEndpointSet {
    endpoints: Vec<DirectoryEndpoint>,
}

impl DirectoryEndpointSet {
    /// Creates a set from at least one endpoint
    pub fn new(endpoints: Vec<DirectoryEndpoint>) -> Result<Self, EndpointError> {
        if endpoints.is_empty() {
            return Err(EndpointError::Empty);
        }
        Ok(Self { endpoints })
    }

    /// Parses a comma separated list of URLs. Whitespace around the commas is ignored.
    pub fn parse(list: &str) -> Result<Self, EndpointError> {
        let endpoints = list
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(DirectoryEndpoint::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints)
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in configured order
    pub fn iter(&self) -> std::slice::Iter<'_, DirectoryEndpoint> {
        self.endpoints.iter()
    }

    /// Endpoints in the order one attempt should try them
    pub fn ordered(&self, order: FailoverOrder) -> Vec<&DirectoryEndpoint> {
        let mut endpoints: Vec<_> = self.endpoints.iter().collect();
        if order == FailoverOrder::Shuffled {
            endpoints.shuffle(&mut thread_rng());
        }
        endpoints
    }
}

impl FromStr for DirectoryEndpointSet {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'a> IntoIterator for &'a DirectoryEndpointSet {
    type Item = &'a DirectoryEndpoint;
    type IntoIter = std::slice::Iter<'a, DirectoryEndpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
