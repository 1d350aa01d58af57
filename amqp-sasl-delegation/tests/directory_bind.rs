use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use amqp_sasl_delegation::{
    directory::{
        DirectoryConnection, DirectoryConnector, DirectoryEndpoint, DirectoryError,
        SaslBindMechanism, SaslBindRequest,
    },
    upstream::TcpConnector,
    ConfigError, DelegationConfig, Error, MechanismRegistry, Outcome,
};

/// A directory that knows a few users and logs every call
#[derive(Debug, Clone, Default)]
struct MemoryDirectory {
    up: Vec<String>,
    users: HashMap<String, String>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MemoryDirectory {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct MemoryConnection(MemoryDirectory);

impl DirectoryConnector for MemoryDirectory {
    type Connection = MemoryConnection;

    fn connect(&self, endpoint: &DirectoryEndpoint) -> Result<MemoryConnection, DirectoryError> {
        let url = endpoint.url();
        if self.up.contains(&url) {
            self.log.lock().unwrap().push(format!("connect {}", url));
            Ok(MemoryConnection(self.clone()))
        } else {
            self.log.lock().unwrap().push(format!("unreachable {}", url));
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
        }
    }

    fn supports_sasl_bind(&self, _: SaslBindMechanism) -> bool {
        false
    }
}

impl DirectoryConnection for MemoryConnection {
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.0.log.lock().unwrap().push(format!("bind {}", dn));
        match self.0.users.get(dn) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(DirectoryError::InvalidCredentials),
        }
    }

    fn sasl_bind(&mut self, request: &SaslBindRequest<'_>) -> Result<(), DirectoryError> {
        Err(DirectoryError::UnsupportedMechanism(request.mechanism.name()))
    }

    fn anonymous_bind(&mut self) -> Result<(), DirectoryError> {
        self.0.log.lock().unwrap().push("anonymous bind".to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), DirectoryError> {
        self.0.log.lock().unwrap().push("close".to_string());
        Ok(())
    }
}

fn registry(directory: &MemoryDirectory) -> MechanismRegistry<TcpConnector, MemoryDirectory> {
    let config = DelegationConfig::from_options([
        (
            "ldap_urls",
            "ldap://dir1.example.com, ldap://dir2.example.com, ldap://dir3.example.com",
        ),
        ("dn_format", "uid=%s,ou=kafka,dc=example,dc=com"),
        ("ldap_failover", "sequential"),
    ])
    .unwrap();
    MechanismRegistry::with_connectors(config, TcpConnector {}, directory.clone()).unwrap()
}

fn directory() -> MemoryDirectory {
    MemoryDirectory {
        up: vec!["ldap://dir3.example.com:389".to_string()],
        users: HashMap::from([(
            "uid=tom,ou=kafka,dc=example,dc=com".to_string(),
            "tom-secret".to_string(),
        )]),
        ..Default::default()
    }
}

#[test]
fn test_bind_through_the_last_reachable_server() {
    let directory = directory();
    let registry = registry(&directory);
    assert_eq!(registry.list_mechanisms(), vec!["PLAIN"]);

    let mut server = registry.create("PLAIN").unwrap();
    assert!(server.evaluate(b"\0tom\0tom-secret").unwrap().is_empty());
    assert_eq!(server.authorization_id().unwrap(), "tom");
    server.dispose().unwrap();

    assert_eq!(
        directory.log(),
        vec![
            "unreachable ldap://dir1.example.com:389",
            "unreachable ldap://dir2.example.com:389",
            "connect ldap://dir3.example.com:389",
            "bind uid=tom,ou=kafka,dc=example,dc=com",
            "anonymous bind",
            "close",
        ]
    );
}

#[test]
fn test_wrong_password() {
    let directory = directory();
    let registry = registry(&directory);

    let mut server = registry.create("PLAIN").unwrap();
    let err = server.evaluate(b"\0tom\0guess").unwrap_err();
    assert!(matches!(err, Error::UpstreamRejected));
    assert_eq!(server.outcome(), Some(Outcome::Failure));
    assert_eq!(directory.log().last().map(String::as_str), Some("close"));
}

#[test]
fn test_every_server_down() {
    let directory = MemoryDirectory::default();
    let registry = registry(&directory);

    let mut server = registry.create("PLAIN").unwrap();
    let err = server.evaluate(b"\0tom\0tom-secret").unwrap_err();
    assert!(matches!(err, Error::NoReachableDirectory(3)));
    assert_eq!(err.client_message(), "Authentication failed");
}

#[test]
fn test_sasl_bind_the_connector_cannot_do() {
    let directory = directory();
    let config = DelegationConfig::from_options([
        ("ldap_urls", "ldap://dir3.example.com"),
        ("bind", "CRAM-MD5"),
    ])
    .unwrap();

    let err = MechanismRegistry::with_connectors(config, TcpConnector {}, directory.clone())
        .unwrap_err();
    assert_eq!(err, ConfigError::UnsupportedBind(SaslBindMechanism::CramMd5));
    assert!(directory.log().is_empty());
}
