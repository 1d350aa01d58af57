use std::{fmt, sync::Arc};

use bytes::Bytes;

use super::{
    connect_any, Bind, DirectoryConnection, DirectoryConnector, DirectoryError, SaslBind, SimpleBind,
};
use crate::{
    auth::{PlainCredentials, PLAIN},
    config::{BindMode, DirectoryConfig},
    server::{authorized, next_session_id, Outcome, SaslServer},
    Error,
};

#[derive(Debug)]
enum Backend<C> {
    Simple(SimpleBind<C>),
    Sasl(SaslBind<C>),
}

impl<C: DirectoryConnection> Backend<C> {
    fn as_bind(&mut self) -> &mut dyn Bind {
        match self {
            Backend::Simple(bind) => bind,
            Backend::Sasl(bind) => bind,
        }
    }
}

/// `PLAIN` verifier that checks the password with a directory bind.
///
/// One `evaluate` connects to the first reachable directory server and binds once.
pub struct DirectoryPlainServer<D: DirectoryConnector> {
    session: u64,
    connector: Arc<D>,
    config: Arc<DirectoryConfig>,
    backend: Option<Backend<D::Connection>>,
    outcome: Option<Outcome>,
    authorization_id: Option<String>,
}

impl<D: DirectoryConnector> fmt::Debug for DirectoryPlainServer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryPlainServer")
            .field("session", &self.session)
            .field("endpoints", &self.config.endpoints.len())
            .field("connected", &self.backend.is_some())
            .field("outcome", &self.outcome)
            .field("authorization_id", &self.authorization_id)
            .finish()
    }
}

impl<D: DirectoryConnector> DirectoryPlainServer<D> {
    /// Creates a session. Nothing is connected until `evaluate`.
    pub fn new(connector: Arc<D>, config: Arc<DirectoryConfig>) -> Self {
        Self {
            session: next_session_id(),
            connector,
            config,
            backend: None,
            outcome: None,
            authorization_id: None,
        }
    }

    fn verify(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        let credentials = PlainCredentials::parse(response)?;
        trace_event!(
            debug,
            "[session {}] Verifying {} against {} directory server(s)",
            self.session,
            credentials.username(),
            self.config.endpoints.len()
        );

        let connection = connect_any(
            &*self.connector,
            &self.config.endpoints,
            self.config.failover_order,
        )?;
        let backend = self.backend.insert(match &self.config.bind_mode {
            BindMode::Simple { dn_template } => {
                Backend::Simple(SimpleBind::new(connection, dn_template.clone()))
            }
            BindMode::Sasl { mechanism } => Backend::Sasl(SaslBind::new(
                connection,
                *mechanism,
                self.config.realm.clone(),
            )),
        });

        match backend
            .as_bind()
            .bind(credentials.username(), credentials.password())?
        {
            true => {
                self.authorization_id = Some(credentials.into_username());
                Ok(Bytes::new())
            }
            false => Err(Error::UpstreamRejected),
        }
    }

    fn close(&mut self) -> Result<(), DirectoryError> {
        match self.backend.take() {
            Some(mut backend) => backend.as_bind().dispose(),
            None => Ok(()),
        }
    }
}

impl<D: DirectoryConnector> SaslServer for DirectoryPlainServer<D> {
    fn mechanism_name(&self) -> &str {
        PLAIN
    }

    fn evaluate(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        if self.outcome.is_some() {
            return Err(Error::NotYetComplete);
        }

        let result = self.verify(response);
        match &result {
            Ok(_) => {
                trace_event!(info, "[session {}] Directory bind succeeded", self.session);
                self.outcome = Some(Outcome::Success);
            }
            Err(_err) => {
                trace_event!(info, "[session {}] Directory bind failed: {}", self.session, _err);
                self.outcome = Some(Outcome::Failure);
                if let Err(_err) = self.close() {
                    trace_event!(
                        warn,
                        "[session {}] Error closing directory connection: {}",
                        self.session,
                        _err
                    );
                }
            }
        }
        result
    }

    fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }

    fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    fn authorization_id(&self) -> Result<&str, Error> {
        authorized(self.outcome, self.authorization_id.as_deref())
    }

    fn dispose(&mut self) -> Result<(), Error> {
        self.close().map_err(|err| {
            trace_event!(
                warn,
                "[session {}] Error closing directory connection: {}",
                self.session,
                err
            );
            Error::Directory(err)
        })
    }
}

impl<D: DirectoryConnector> Drop for DirectoryPlainServer<D> {
    fn drop(&mut self) {
        if let Err(_err) = self.close() {
            trace_event!(
                warn,
                "[session {}] Error closing directory connection: {}",
                self.session,
                _err
            );
        }
    }
}
