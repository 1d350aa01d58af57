//! SCRAM mechanisms, RFC 5802 and RFC 7677

use std::{fmt, str::FromStr};

pub mod attributes;
mod client_first;

pub use client_first::ClientFirstMessage;

use super::{SCRAM_SHA_256, SCRAM_SHA_512};

/// A SCRAM mechanism and the hash function it uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramMechanism {
    /// `SCRAM-SHA-256`
    Sha256,

    /// `SCRAM-SHA-512`
    Sha512,
}

impl ScramMechanism {
    /// Every supported mechanism, strongest last
    pub const ALL: [ScramMechanism; 2] = [ScramMechanism::Sha256, ScramMechanism::Sha512];

    /// Registered SASL mechanism name
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            ScramMechanism::Sha256 => SCRAM_SHA_256,
            ScramMechanism::Sha512 => SCRAM_SHA_512,
        }
    }

    /// Name of the hash function
    pub fn hash_function_name(&self) -> &'static str {
        match self {
            ScramMechanism::Sha256 => "SHA-256",
            ScramMechanism::Sha512 => "SHA-512",
        }
    }

    /// Looks a mechanism up by its registered name
    pub fn from_mechanism_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mechanism| mechanism.mechanism_name() == name)
    }

    /// Registered names of every supported mechanism
    pub fn mechanism_names() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().map(|m| m.mechanism_name())
    }
}

impl fmt::Display for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mechanism_name())
    }
}

impl FromStr for ScramMechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_mechanism_name(s).ok_or_else(|| format!("unsupported SCRAM mechanism {:?}", s))
    }
}
