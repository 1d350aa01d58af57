#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations)]

//! SASL credential verifiers that delegate authentication to an external authority.
//!
//! A broker's pluggable authentication framework drives a [`SaslServer`] one `evaluate` call at
//! a time. Instead of checking credentials locally, the verifiers in this crate either replay
//! the exchange over the AMQP 1.0 SASL layer to an upstream server that owns the credential
//! store, or perform an LDAP bind against one of several directory servers.
//!
//! | Mechanism | Verifier | Backend |
//! |-----------|----------|---------|
//! | `PLAIN` | [`DelegatingPlainServer`] | AMQP 1.0 SASL upstream |
//! | `SCRAM-SHA-256`, `SCRAM-SHA-512` | [`DelegatingScramServer`] | AMQP 1.0 SASL upstream |
//! | `PLAIN` | [`DirectoryPlainServer`] | LDAP simple or SASL bind |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use amqp_sasl_delegation::{DelegationConfig, MechanismRegistry, UpstreamConfig};
//!
//! let config = DelegationConfig::builder()
//!     .upstream(UpstreamConfig::builder().host("auth.example.com").build())
//!     .build();
//! let registry = MechanismRegistry::new(config).expect("valid configuration");
//!
//! let mut server = registry.create("PLAIN").expect("PLAIN is configured");
//! let reply = server.evaluate(b"\0alice\0secret123");
//! server.dispose().ok();
//! ```
//!
//! # Feature flags
//!
//! ```toml
//! default = ["ldap"]
//! ```
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `"ldap"` | enables the `ldap3` backed directory connector |
//! | `"rustls"` | `ldaps://` endpoints over `rustls` |
//! | `"native-tls"` | `ldaps://` endpoints over `native-tls` |
//! | `"tracing"` | logs through `tracing` |
//! | `"log"` | logs through `log` |

#[macro_use]
mod macros;

pub mod auth;
pub mod config;
pub mod delegate;
pub mod directory;
pub mod error;
pub mod frames;
pub mod registry;
pub mod server;
pub mod transport;
pub mod upstream;

pub mod types {
    //! Re-exporting `fe2o3-amqp-types`
    pub use fe2o3_amqp_types::*;
}

pub use config::{ConfigError, DelegationConfig, DirectoryConfig, UpstreamConfig};
pub use delegate::{DelegatingPlainServer, DelegatingScramServer};
pub use directory::DirectoryPlainServer;
pub use error::{Error, ErrorKind};
pub use registry::MechanismRegistry;
pub use server::{Outcome, SaslServer};
