//! Maps mechanism names to verifier sessions

use std::sync::Arc;

use crate::{
    auth::{ScramMechanism, PLAIN},
    config::{BindMode, ConfigError, DelegationConfig, DirectoryConfig, UpstreamConfig},
    delegate::{DelegatingPlainServer, DelegatingScramServer},
    directory::{DirectoryConnector, DirectoryPlainServer},
    server::SaslServer,
    upstream::{Connector, TcpConnector},
};

#[cfg(feature = "ldap")]
type DefaultDirectoryConnector = crate::directory::ldap::LdapConnector;

#[cfg(not(feature = "ldap"))]
type DefaultDirectoryConnector = unavailable::DirectoryUnavailable;

/// Creates a verifier session per authentication attempt.
///
/// Built once at startup from a [`DelegationConfig`] and shared by every thread the host
/// authenticates on. It holds no mutable state.
#[derive(Debug)]
pub struct MechanismRegistry<C = TcpConnector, D = DefaultDirectoryConnector> {
    upstream: Option<Arc<UpstreamConfig>>,
    directory: Option<Arc<DirectoryConfig>>,
    connector: Arc<C>,
    directory_connector: Arc<D>,
}

impl MechanismRegistry {
    /// Creates a registry connecting over TCP and, with the `ldap` feature, `ldap3`.
    ///
    /// `ldap3` performs no `CRAM-MD5` or `DIGEST-MD5` binds, so a directory configured with
    /// either is rejected with [`ConfigError::UnsupportedBind`].
    pub fn new(config: DelegationConfig) -> Result<Self, ConfigError> {
        #[cfg(feature = "ldap")]
        let directory_connector = crate::directory::ldap::LdapConnector::new(
            config.directory.as_ref().and_then(|directory| directory.timeout),
        );
        #[cfg(not(feature = "ldap"))]
        let directory_connector = unavailable::DirectoryUnavailable {};

        Self::with_connectors(config, TcpConnector {}, directory_connector)
    }
}

impl<C, D> MechanismRegistry<C, D>
where
    C: Connector + Send + Sync + 'static,
    C::Socket: Send + 'static,
    D: DirectoryConnector + Send + Sync + 'static,
    D::Connection: Send + 'static,
{
    /// Creates a registry with custom connectors.
    ///
    /// Fails if the directory is configured with a SASL bind `directory_connector` cannot
    /// perform.
    pub fn with_connectors(
        config: DelegationConfig,
        connector: C,
        directory_connector: D,
    ) -> Result<Self, ConfigError> {
        if let Some(DirectoryConfig {
            bind_mode: BindMode::Sasl { mechanism },
            ..
        }) = &config.directory
        {
            if !directory_connector.supports_sasl_bind(*mechanism) {
                return Err(ConfigError::UnsupportedBind(*mechanism));
            }
        }

        Ok(Self {
            upstream: config.upstream.map(Arc::new),
            directory: config.directory.map(Arc::new),
            connector: Arc::new(connector),
            directory_connector: Arc::new(directory_connector),
        })
    }

    /// Names of the mechanisms the configuration supports
    pub fn list_mechanisms(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.upstream.is_some() || self.directory.is_some() {
            names.push(PLAIN);
        }
        if self.upstream.is_some() {
            names.extend(ScramMechanism::mechanism_names());
        }
        names
    }

    /// A fresh session for `mechanism`, or `None` if it is not supported
    pub fn create(&self, mechanism: &str) -> Option<Box<dyn SaslServer + Send>> {
        let server: Box<dyn SaslServer + Send> = match (mechanism, &self.upstream, &self.directory)
        {
            (PLAIN, Some(upstream), _) => Box::new(DelegatingPlainServer::new(
                self.connector.clone(),
                upstream.clone(),
            )),
            (PLAIN, None, Some(directory)) => Box::new(DirectoryPlainServer::new(
                self.directory_connector.clone(),
                directory.clone(),
            )),
            (name, Some(upstream), _) => {
                let mechanism = ScramMechanism::from_mechanism_name(name)?;
                Box::new(DelegatingScramServer::new(
                    mechanism,
                    self.connector.clone(),
                    upstream.clone(),
                ))
            }
            (_name, _, _) => {
                trace_event!(debug, "Mechanism {} is not supported", _name);
                return None;
            }
        };
        Some(server)
    }
}

#[cfg(not(feature = "ldap"))]
mod unavailable {
    use std::io;

    use crate::directory::{
        DirectoryConnection, DirectoryConnector, DirectoryEndpoint, DirectoryError,
        SaslBindRequest,
    };

    /// Directory connector used when the `ldap` feature is off. Every connect fails.
    #[derive(Debug, Clone, Default)]
    pub struct DirectoryUnavailable {}

    #[derive(Debug)]
    pub enum NoConnection {}

    impl DirectoryConnector for DirectoryUnavailable {
        type Connection = NoConnection;

        fn connect(&self, _: &DirectoryEndpoint) -> Result<NoConnection, DirectoryError> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "the ldap feature is disabled").into())
        }
    }

    impl DirectoryConnection for NoConnection {
        fn simple_bind(&mut self, _: &str, _: &str) -> Result<(), DirectoryError> {
            match *self {}
        }

        fn sasl_bind(&mut self, _: &SaslBindRequest<'_>) -> Result<(), DirectoryError> {
            match *self {}
        }

        fn anonymous_bind(&mut self) -> Result<(), DirectoryError> {
            match *self {}
        }

        fn close(&mut self) -> Result<(), DirectoryError> {
            match *self {}
        }
    }
}
