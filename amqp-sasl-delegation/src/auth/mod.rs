//! Parsing of the client messages that carry identities

pub mod plain;
pub mod scram;

pub use plain::PlainCredentials;
pub use scram::{ClientFirstMessage, ScramMechanism};

/// Name of the PLAIN mechanism
pub const PLAIN: &str = "PLAIN";

/// Name of the SCRAM mechanism over SHA-256
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// Name of the SCRAM mechanism over SHA-512
pub const SCRAM_SHA_512: &str = "SCRAM-SHA-512";
