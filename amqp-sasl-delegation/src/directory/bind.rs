//! Bind strategies run on an open directory connection

use super::{DirectoryConnection, DirectoryError, DnTemplate, SaslBindMechanism, SaslBindRequest};

/// Verifies a password by binding to the directory
pub trait Bind {
    /// Attempts the bind.
    ///
    /// Returns `Ok(false)` when the directory rejects the credentials. Every other directory
    /// failure is an error.
    fn bind(&mut self, username: &str, password: &str) -> Result<bool, DirectoryError>;

    /// Closes the connection. Later calls do nothing.
    fn dispose(&mut self) -> Result<(), DirectoryError>;
}

fn rejected_is_false(result: Result<(), DirectoryError>) -> Result<bool, DirectoryError> {
    match result {
        Ok(()) => Ok(true),
        Err(DirectoryError::InvalidCredentials) => Ok(false),
        Err(err) => Err(err),
    }
}

fn close<C: DirectoryConnection>(connection: &mut Option<C>) -> Result<(), DirectoryError> {
    match connection.take() {
        Some(mut connection) => connection.close(),
        None => Ok(()),
    }
}

/// Simple bind as the DN formed from the username.
///
/// The connection is rebound anonymously after every attempt so that it never stays
/// authenticated as the user.
#[derive(Debug)]
pub struct SimpleBind<C> {
    connection: Option<C>,
    template: DnTemplate,
}

impl<C: DirectoryConnection> SimpleBind<C> {
    /// Creates a simple bind on `connection`
    pub fn new(connection: C, template: DnTemplate) -> Self {
        Self {
            connection: Some(connection),
            template,
        }
    }
}

impl<C: DirectoryConnection> Bind for SimpleBind<C> {
    fn bind(&mut self, username: &str, password: &str) -> Result<bool, DirectoryError> {
        let connection = self.connection.as_mut().ok_or(DirectoryError::Closed)?;
        let dn = self.template.format(username);
        trace_event!(debug, "Simple bind as {}", dn);

        let result = connection.simple_bind(&dn, password);
        let reset = connection.anonymous_bind();
        let bound = rejected_is_false(result)?;
        reset?;
        Ok(bound)
    }

    fn dispose(&mut self) -> Result<(), DirectoryError> {
        close(&mut self.connection)
    }
}

/// SASL bind with the username as both authentication and authorization identity
#[derive(Debug)]
pub struct SaslBind<C> {
    connection: Option<C>,
    mechanism: SaslBindMechanism,
    realm: Option<String>,
}

impl<C: DirectoryConnection> SaslBind<C> {
    /// Creates a SASL bind on `connection`. The realm is only sent with `DIGEST-MD5`.
    pub fn new(connection: C, mechanism: SaslBindMechanism, realm: Option<String>) -> Self {
        Self {
            connection: Some(connection),
            mechanism,
            realm,
        }
    }
}

impl<C: DirectoryConnection> Bind for SaslBind<C> {
    fn bind(&mut self, username: &str, password: &str) -> Result<bool, DirectoryError> {
        let connection = self.connection.as_mut().ok_or(DirectoryError::Closed)?;
        let realm = match self.mechanism {
            SaslBindMechanism::DigestMd5 => self.realm.as_deref(),
            SaslBindMechanism::CramMd5 => None,
        };
        let request = SaslBindRequest {
            mechanism: self.mechanism,
            username,
            authorization_id: username,
            credentials: password,
            realm,
        };
        trace_event!(debug, "SASL bind {:?}", request);
        rejected_is_false(connection.sasl_bind(&request))
    }

    fn dispose(&mut self) -> Result<(), DirectoryError> {
        close(&mut self.connection)
    }
}
