//! Directory connections over the `ldap3` synchronous client

use std::time::Duration;

use ldap3::{LdapConn, LdapConnSettings, LdapResult};

use super::{
    DirectoryConnection, DirectoryConnector, DirectoryEndpoint, DirectoryError, SaslBindMechanism,
    SaslBindRequest,
};

/// LDAP result code for invalid credentials
pub const INVALID_CREDENTIALS: u32 = 49;

const SUCCESS: u32 = 0;

/// Opens `ldap3` connections
#[derive(Debug, Clone, Default)]
pub struct LdapConnector {
    timeout: Option<Duration>,
}

impl LdapConnector {
    /// Creates a connector bounding the connect and every operation by `timeout`
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl DirectoryConnector for LdapConnector {
    type Connection = LdapConnection;

    fn connect(&self, endpoint: &DirectoryEndpoint) -> Result<LdapConnection, DirectoryError> {
        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = self.timeout {
            settings = settings.set_conn_timeout(timeout);
        }
        let conn = LdapConn::with_settings(settings, &endpoint.url())?;
        Ok(LdapConnection {
            conn,
            timeout: self.timeout,
        })
    }

    // ldap3 only speaks SASL EXTERNAL and GSSAPI
    fn supports_sasl_bind(&self, _: SaslBindMechanism) -> bool {
        false
    }
}

/// An open `ldap3` connection
pub struct LdapConnection {
    conn: LdapConn,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for LdapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnection")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl LdapConnection {
    fn conn(&mut self) -> &mut LdapConn {
        if let Some(timeout) = self.timeout {
            self.conn.with_timeout(timeout);
        }
        &mut self.conn
    }
}

fn check(result: LdapResult) -> Result<(), DirectoryError> {
    match result.rc {
        SUCCESS => Ok(()),
        INVALID_CREDENTIALS => Err(DirectoryError::InvalidCredentials),
        code => Err(DirectoryError::ResultCode {
            code,
            message: result.text,
        }),
    }
}

impl DirectoryConnection for LdapConnection {
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        check(self.conn().simple_bind(dn, password)?)
    }

    fn sasl_bind(&mut self, request: &SaslBindRequest<'_>) -> Result<(), DirectoryError> {
        Err(DirectoryError::UnsupportedMechanism(request.mechanism.name()))
    }

    fn anonymous_bind(&mut self) -> Result<(), DirectoryError> {
        check(self.conn().simple_bind("", "")?)
    }

    fn close(&mut self) -> Result<(), DirectoryError> {
        self.conn.unbind()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ldap3::LdapResult;

    use super::{check, LdapConnector, INVALID_CREDENTIALS};
    use crate::directory::{
        DirectoryConnector, DirectoryEndpoint, DirectoryError, SaslBindMechanism,
    };

    fn result(rc: u32, text: &str) -> LdapResult {
        LdapResult {
            rc,
            matched: String::new(),
            text: text.to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        }
    }

    #[test]
    fn result_codes() {
        assert!(check(result(0, "")).is_ok());
        assert!(matches!(
            check(result(INVALID_CREDENTIALS, "bad password")),
            Err(DirectoryError::InvalidCredentials)
        ));
        match check(result(53, "unwilling to perform")) {
            Err(DirectoryError::ResultCode { code, message }) => {
                assert_eq!(code, 53);
                assert_eq!(message, "unwilling to perform");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_sasl_binds() {
        let connector = LdapConnector::default();
        assert!(!connector.supports_sasl_bind(SaslBindMechanism::CramMd5));
        assert!(!connector.supports_sasl_bind(SaslBindMechanism::DigestMd5));
    }

    #[test]
    fn unreachable_server() {
        // nothing listens on port 1
        let endpoint: DirectoryEndpoint = "ldap://127.0.0.1:1".parse().unwrap();
        let connector = LdapConnector::new(Some(std::time::Duration::from_secs(2)));
        assert!(connector.connect(&endpoint).is_err());
    }
}
