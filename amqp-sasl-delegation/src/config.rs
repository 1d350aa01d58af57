//! Delegation targets, read once at startup and shared by every session

use std::time::Duration;

use fe2o3_amqp_types::definitions::PORT;

use crate::directory::{
    DirectoryEndpointSet, DnTemplate, DnTemplateError, EndpointError, FailoverOrder,
    SaslBindMechanism,
};

/// Default bound on connecting and on negotiating with an upstream or directory
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Option keys understood by [`DelegationConfig::from_options`]
pub mod keys {
    /// Upstream AMQP host
    pub const AMQP_HOST: &str = "amqp_host";
    /// Upstream AMQP port
    pub const AMQP_PORT: &str = "amqp_port";
    /// Hostname sent in sasl-init
    pub const AMQP_HOSTNAME: &str = "amqp_hostname";
    /// Realm
    pub const REALM: &str = "realm";
    /// Connect timeout in milliseconds, 0 disables it
    pub const CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";
    /// Negotiation timeout in milliseconds, 0 disables it
    pub const NEGOTIATION_TIMEOUT_MS: &str = "negotiation_timeout_ms";
    /// Comma separated directory URLs
    pub const LDAP_URLS: &str = "ldap_urls";
    /// `simple`, `CRAM-MD5` or `DIGEST-MD5`
    pub const BIND: &str = "bind";
    /// DN template for simple binds
    pub const DN_FORMAT: &str = "dn_format";
    /// `shuffled` or `sequential`
    pub const LDAP_FAILOVER: &str = "ldap_failover";
}

/// Invalid configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required option is absent
    #[error("Missing option {0}")]
    MissingOption(&'static str),

    /// An option has an unusable value
    #[error("Invalid value {value:?} for option {key}: {reason}")]
    InvalidOption {
        /// Option key
        key: &'static str,
        /// Offending value
        value: String,
        /// Why it is unusable
        reason: String,
    },

    /// A directory URL is unusable
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The DN template is unusable
    #[error(transparent)]
    DnTemplate(#[from] DnTemplateError),

    /// The directory connector cannot perform the configured SASL bind
    #[error("SASL bind mechanism {0} is not supported by the directory connector")]
    UnsupportedBind(SaslBindMechanism),

    /// Neither an upstream nor a directory is configured
    #[error("Either {} or {} must be configured", keys::AMQP_HOST, keys::LDAP_URLS)]
    NoBackend,
}

/// Upstream AMQP server that owns the credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Host to connect to
    pub host: String,

    /// Port to connect to, 5672 by default
    pub port: u16,

    /// Hostname sent in sasl-init. Falls back to `realm`, then to the connect host.
    pub sasl_hostname: Option<String>,

    /// Realm of the delegated identities, sent in sasl-init when no `sasl_hostname` is set
    pub realm: Option<String>,

    /// Bound on the TCP connect, `None` for no bound
    pub connect_timeout: Option<Duration>,

    /// Bound on each exchange with the upstream, `None` for no bound
    pub negotiation_timeout: Option<Duration>,
}

impl UpstreamConfig {
    /// Creates a configuration with defaults for everything but the host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: PORT,
            sasl_hostname: None,
            realm: None,
            connect_timeout: Some(DEFAULT_TIMEOUT),
            negotiation_timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Creates a builder
    pub fn builder() -> UpstreamConfigBuilder {
        UpstreamConfigBuilder {
            config: Self::new("localhost"),
        }
    }

    /// Hostname to send in sasl-init
    pub fn sasl_hostname(&self) -> &str {
        self.sasl_hostname
            .as_deref()
            .or(self.realm.as_deref())
            .unwrap_or(&self.host)
    }
}

/// Builder of [`UpstreamConfig`]
#[derive(Debug, Clone)]
pub struct UpstreamConfigBuilder {
    config: UpstreamConfig,
}

impl UpstreamConfigBuilder {
    /// Host to connect to
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Port to connect to
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Hostname sent in sasl-init
    pub fn sasl_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.sasl_hostname = Some(hostname.into());
        self
    }

    /// Realm
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = Some(realm.into());
        self
    }

    /// Bound on the TCP connect
    pub fn connect_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.config.connect_timeout = timeout.into();
        self
    }

    /// Bound on each exchange with the upstream
    pub fn negotiation_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.config.negotiation_timeout = timeout.into();
        self
    }

    /// Finishes the configuration
    pub fn build(self) -> UpstreamConfig {
        self.config
    }
}

/// How a directory verifies a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindMode {
    /// Simple bind as the DN formed from the username
    Simple {
        /// Template of the user's DN
        dn_template: DnTemplate,
    },

    /// SASL bind
    Sasl {
        /// Mechanism of the bind
        mechanism: SaslBindMechanism,
    },
}

/// Directory servers that verify PLAIN credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    /// Servers to try
    pub endpoints: DirectoryEndpointSet,

    /// How the password is verified
    pub bind_mode: BindMode,

    /// Realm, sent with `DIGEST-MD5` binds
    pub realm: Option<String>,

    /// Bound on connecting and on each operation, `None` for no bound
    pub timeout: Option<Duration>,

    /// Order in which servers are tried
    pub failover_order: FailoverOrder,
}

impl DirectoryConfig {
    /// Creates a configuration with default realm, timeout and failover order
    pub fn new(endpoints: DirectoryEndpointSet, bind_mode: BindMode) -> Self {
        Self {
            endpoints,
            bind_mode,
            realm: None,
            timeout: Some(DEFAULT_TIMEOUT),
            failover_order: FailoverOrder::default(),
        }
    }

    /// Creates a builder
    pub fn builder(endpoints: DirectoryEndpointSet, bind_mode: BindMode) -> DirectoryConfigBuilder {
        DirectoryConfigBuilder {
            config: Self::new(endpoints, bind_mode),
        }
    }
}

/// Builder of [`DirectoryConfig`]
#[derive(Debug, Clone)]
pub struct DirectoryConfigBuilder {
    config: DirectoryConfig,
}

impl DirectoryConfigBuilder {
    /// Realm
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = Some(realm.into());
        self
    }

    /// Bound on connecting and on each operation
    pub fn timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.config.timeout = timeout.into();
        self
    }

    /// Order in which servers are tried
    pub fn failover_order(mut self, order: FailoverOrder) -> Self {
        self.config.failover_order = order;
        self
    }

    /// Finishes the configuration
    pub fn build(self) -> DirectoryConfig {
        self.config
    }
}

/// Every delegation target known to a registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationConfig {
    /// AMQP upstream for PLAIN and SCRAM
    pub upstream: Option<UpstreamConfig>,

    /// Directory for PLAIN, used when no upstream is configured
    pub directory: Option<DirectoryConfig>,
}

impl DelegationConfig {
    /// Creates a builder
    pub fn builder() -> DelegationConfigBuilder {
        DelegationConfigBuilder::default()
    }

    /// Reads the configuration from string options, as a host passes them to its plugins.
    /// Unknown keys are ignored.
    pub fn from_options<I, K, V>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let options = Options::collect(options);

        let connect_timeout = options.timeout(keys::CONNECT_TIMEOUT_MS)?;
        let negotiation_timeout = options.timeout(keys::NEGOTIATION_TIMEOUT_MS)?;
        let realm = options.get(keys::REALM).map(String::from);

        let upstream = match options.get(keys::AMQP_HOST) {
            Some(host) => {
                let port = match options.get(keys::AMQP_PORT) {
                    Some(port) => port.parse::<u16>().map_err(|err| {
                        options.invalid(keys::AMQP_PORT, err.to_string())
                    })?,
                    None => PORT,
                };
                Some(UpstreamConfig {
                    host: host.to_string(),
                    port,
                    sasl_hostname: options.get(keys::AMQP_HOSTNAME).map(String::from),
                    realm: realm.clone(),
                    connect_timeout: connect_timeout.unwrap_or(Some(DEFAULT_TIMEOUT)),
                    negotiation_timeout: negotiation_timeout.unwrap_or(Some(DEFAULT_TIMEOUT)),
                })
            }
            None => None,
        };

        let directory = match options.get(keys::LDAP_URLS) {
            Some(urls) => {
                let endpoints = DirectoryEndpointSet::parse(urls)?;
                let bind_mode = match options.get(keys::BIND).unwrap_or("simple") {
                    bind if bind.eq_ignore_ascii_case("simple") => {
                        let dn_format = options
                            .get(keys::DN_FORMAT)
                            .ok_or(ConfigError::MissingOption(keys::DN_FORMAT))?;
                        BindMode::Simple {
                            dn_template: DnTemplate::new(dn_format)?,
                        }
                    }
                    bind => BindMode::Sasl {
                        mechanism: bind
                            .parse::<SaslBindMechanism>()
                            .map_err(|reason| options.invalid(keys::BIND, reason))?,
                    },
                };
                let failover_order = match options.get(keys::LDAP_FAILOVER) {
                    Some(order) => order
                        .parse::<FailoverOrder>()
                        .map_err(|reason| options.invalid(keys::LDAP_FAILOVER, reason))?,
                    None => FailoverOrder::default(),
                };
                Some(DirectoryConfig {
                    endpoints,
                    bind_mode,
                    realm,
                    timeout: connect_timeout.unwrap_or(Some(DEFAULT_TIMEOUT)),
                    failover_order,
                })
            }
            None => None,
        };

        if upstream.is_none() && directory.is_none() {
            return Err(ConfigError::NoBackend);
        }
        Ok(Self {
            upstream,
            directory,
        })
    }
}

/// Builder of [`DelegationConfig`]
#[derive(Debug, Clone, Default)]
pub struct DelegationConfigBuilder {
    config: DelegationConfig,
}

impl DelegationConfigBuilder {
    /// AMQP upstream for PLAIN and SCRAM
    pub fn upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.config.upstream = Some(upstream);
        self
    }

    /// Directory for PLAIN
    pub fn directory(mut self, directory: DirectoryConfig) -> Self {
        self.config.directory = Some(directory);
        self
    }

    /// Finishes the configuration
    pub fn build(self) -> DelegationConfig {
        self.config
    }
}

struct Options(Vec<(String, String)>);

impl Options {
    fn collect<I, K, V>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self(
            options
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().trim().to_string()))
                .collect(),
        )
    }

    /// Last value of a key, ignoring blank values
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// `None` when absent, `Some(None)` when disabled with 0
    fn timeout(&self, key: &'static str) -> Result<Option<Option<Duration>>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(millis) => {
                let millis = millis
                    .parse::<u64>()
                    .map_err(|err| self.invalid(key, err.to_string()))?;
                Ok(Some(Some(Duration::from_millis(millis)).filter(|d| !d.is_zero())))
            }
        }
    }

    fn invalid(&self, key: &'static str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidOption {
            key,
            value: self.get(key).unwrap_or_default().to_string(),
            reason: reason.into(),
        }
    }
}
