//! `PLAIN` initial response, RFC 4616

use std::fmt;

use crate::Error;

/// Identities and secret carried by a `PLAIN` message `[authzid] NUL authcid NUL passwd`
#[derive(Clone, PartialEq, Eq)]
pub struct PlainCredentials {
    authorization_id: String,
    username: String,
    password: String,
}

impl PlainCredentials {
    /// Parses a client message.
    ///
    /// The authorization id must be empty or equal to the username; acting as another
    /// identity is never supported.
    pub fn parse(message: &[u8]) -> Result<Self, Error> {
        let message = std::str::from_utf8(message)
            .map_err(|_| Error::malformed("PLAIN request is not valid UTF-8"))?;

        let mut fields = message.split('\0');
        let (authorization_id, username, password) =
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(authzid), Some(authcid), Some(passwd), None) => (authzid, authcid, passwd),
                _ => return Err(Error::malformed("Invalid SASL/PLAIN response: expected 3 tokens")),
            };

        if username.is_empty() {
            return Err(Error::EmptyIdentity);
        }
        if !authorization_id.is_empty() && authorization_id != username {
            return Err(Error::ImpersonationNotSupported);
        }
        if password.is_empty() {
            return Err(Error::EmptySecret);
        }

        Ok(Self {
            authorization_id: authorization_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Authorization id as sent, possibly empty
    pub fn authorization_id(&self) -> &str {
        &self.authorization_id
    }

    /// Authentication id
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Consumes the credentials, keeping the username
    pub fn into_username(self) -> String {
        self.username
    }
}

impl fmt::Debug for PlainCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainCredentials")
            .field("authorization_id", &self.authorization_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
