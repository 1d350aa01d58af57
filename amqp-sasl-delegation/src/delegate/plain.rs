use std::{fmt, sync::Arc};

use bytes::Bytes;

use super::{release, upstream_event, upstream_has_replied, Upstream, UpstreamEvent};
use crate::{
    auth::{PlainCredentials, PLAIN},
    config::UpstreamConfig,
    server::{authorized, next_session_id, Outcome, SaslServer},
    transport::SaslClientEngine,
    upstream::{Connector, TcpConnector, UpstreamHandle},
    Error,
};

/// `PLAIN` verifier that forwards the client's initial response to the upstream.
///
/// Single round: the first `evaluate` completes the exchange.
pub struct DelegatingPlainServer<C: Connector = TcpConnector> {
    session: u64,
    connector: Arc<C>,
    config: Arc<UpstreamConfig>,
    upstream: Option<Upstream<C>>,
    outcome: Option<Outcome>,
    authorization_id: Option<String>,
}

impl<C: Connector> fmt::Debug for DelegatingPlainServer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingPlainServer")
            .field("session", &self.session)
            .field("upstream", &format_args!("{}:{}", self.config.host, self.config.port))
            .field("connected", &self.upstream.is_some())
            .field("outcome", &self.outcome)
            .field("authorization_id", &self.authorization_id)
            .finish()
    }
}

impl<C: Connector> DelegatingPlainServer<C> {
    /// Creates a session. Nothing is connected until the first `evaluate`.
    pub fn new(connector: Arc<C>, config: Arc<UpstreamConfig>) -> Self {
        Self {
            session: next_session_id(),
            connector,
            config,
            upstream: None,
            outcome: None,
            authorization_id: None,
        }
    }

    fn delegate(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        let credentials = PlainCredentials::parse(response)?;
        trace_event!(
            debug,
            "[session {}] Delegating PLAIN for {} to {}:{}",
            self.session,
            credentials.username(),
            self.config.host,
            self.config.port
        );

        let upstream = self.upstream.insert(UpstreamHandle::bootstrap(
            &*self.connector,
            SaslClientEngine::new(),
            &self.config,
            PLAIN,
        )?);
        upstream.send_init(PLAIN, Some(self.config.sasl_hostname()), response)?;

        loop {
            upstream.pump_until(upstream_has_replied)?;
            match upstream_event::<C>(upstream)? {
                UpstreamEvent::Passed => break,
                UpstreamEvent::Failed => return Err(Error::UpstreamRejected),
                UpstreamEvent::Challenge => {
                    // PLAIN has nothing more to say
                    let _challenge = upstream.take_pending();
                    upstream.send_response(&[])?;
                }
            }
        }

        self.authorization_id = Some(credentials.into_username());
        Ok(Bytes::new())
    }
}

impl<C: Connector> SaslServer for DelegatingPlainServer<C> {
    fn mechanism_name(&self) -> &str {
        PLAIN
    }

    fn evaluate(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        if self.outcome.is_some() {
            return Err(Error::NotYetComplete);
        }

        let result = self.delegate(response);
        match &result {
            Ok(_) => {
                trace_event!(info, "[session {}] PLAIN delegation succeeded", self.session);
                self.outcome = Some(Outcome::Success);
            }
            Err(_err) => {
                trace_event!(info, "[session {}] PLAIN delegation failed: {}", self.session, _err);
                self.outcome = Some(Outcome::Failure);
            }
        }
        release::<C>(self.session, &mut self.upstream);
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
        release::<C>(self.session, &mut self.upstream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fe2o3_amqp_types::sasl::SaslCode;

    use super::DelegatingPlainServer;
    use crate::{
        config::UpstreamConfig,
        delegate::tests::{challenge, greeting, outcome, sent_frames},
        frames::sasl::Frame,
        server::{Outcome, SaslServer},
        transport::pump::tests::ScriptedSocket,
        upstream::tests::ScriptedConnector,
        Error,
    };

    fn server(
        reads: Vec<Vec<u8>>,
    ) -> (
        DelegatingPlainServer<ScriptedConnector>,
        Arc<ScriptedConnector>,
        SocketRecord,
    ) {
        let socket = ScriptedSocket::with_reads(reads);
        let record = SocketRecord {
            written: socket.written.clone(),
            shutdowns: socket.shutdowns.clone(),
        };
        let connector = Arc::new(ScriptedConnector::new([socket]));
        let config = UpstreamConfig::builder()
            .host("upstream.example.com")
            .sasl_hostname("broker.example.com")
            .build();
        let server = DelegatingPlainServer::new(connector.clone(), Arc::new(config));
        (server, connector, record)
    }

    struct SocketRecord {
        written: Arc<std::sync::Mutex<Vec<u8>>>,
        shutdowns: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl SocketRecord {
        fn frames(&self) -> Vec<Frame> {
            sent_frames(&self.written.lock().unwrap())
        }

        fn shutdowns(&self) -> usize {
            self.shutdowns.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[test]
    fn accepted_credentials() {
        let (mut server, _, record) = server(vec![
            greeting(&["SCRAM-SHA-256", "PLAIN"]),
            outcome(SaslCode::Ok, None),
        ]);

        let reply = server.evaluate(b"\0alice\0secret123").unwrap();
        assert!(reply.is_empty());
        assert!(server.is_complete());
        assert_eq!(server.outcome(), Some(Outcome::Success));
        assert_eq!(server.authorization_id().unwrap(), "alice");

        match &record.frames()[..] {
            [Frame::Init(init)] => {
                assert_eq!(init.mechanism.as_str(), "PLAIN");
                assert_eq!(init.hostname.as_deref(), Some("broker.example.com"));
                assert_eq!(
                    init.initial_response.as_ref().unwrap().as_slice(),
                    b"\0alice\0secret123"
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(record.shutdowns(), 1);
    }

    #[test]
    fn rejected_credentials() {
        let (mut server, _, record) =
            server(vec![greeting(&["PLAIN"]), outcome(SaslCode::Auth, None)]);

        let err = server.evaluate(b"\0alice\0wrong").unwrap_err();
        assert!(matches!(err, Error::UpstreamRejected));
        assert!(server.is_complete());
        assert_eq!(server.outcome(), Some(Outcome::Failure));
        assert!(matches!(
            server.authorization_id(),
            Err(Error::NotYetComplete)
        ));
        assert_eq!(record.shutdowns(), 1);
    }

    #[test]
    fn challenge_is_answered_with_an_empty_response() {
        let (mut server, _, record) = server(vec![
            greeting(&["PLAIN"]),
            challenge(b""),
            outcome(SaslCode::Ok, None),
        ]);
        // an empty challenge is still a challenge
        server.evaluate(b"\0alice\0secret123").unwrap();

        match &record.frames()[..] {
            [Frame::Init(_), Frame::Response(response)] => assert!(response.response.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn client_errors_never_connect() {
        for (message, expected) in [
            (&b"\0alice\0"[..], "EmptySecret"),
            (b"\0\0secret", "EmptyIdentity"),
            (b"bob\0alice\0secret", "ImpersonationNotSupported"),
            (b"alice", "MalformedRequest"),
        ] {
            let (mut server, connector, _) = server(vec![]);
            let err = server.evaluate(message).unwrap_err();
            let name = format!("{:?}", err);
            assert!(name.starts_with(expected), "{}", name);
            assert_eq!(connector.connects(), 0);
            assert!(server.is_complete());
        }
    }

    #[test]
    fn mechanism_not_offered() {
        let (mut server, _, record) = server(vec![greeting(&["ANONYMOUS"])]);
        let err = server.evaluate(b"\0alice\0secret123").unwrap_err();
        assert!(matches!(err, Error::MechanismNotOffered { .. }));
        assert!(record.frames().is_empty());
        assert_eq!(record.shutdowns(), 1);
    }

    #[test]
    fn upstream_hangs_up_mid_exchange() {
        let (mut server, _, record) = server(vec![greeting(&["PLAIN"])]);
        let err = server.evaluate(b"\0alice\0secret123").unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfStream));
        assert_eq!(record.shutdowns(), 1);
    }

    #[test]
    fn evaluate_after_completion() {
        let (mut server, _, _) = server(vec![greeting(&["PLAIN"]), outcome(SaslCode::Ok, None)]);
        server.evaluate(b"\0alice\0secret123").unwrap();
        assert!(matches!(
            server.evaluate(b"\0alice\0secret123"),
            Err(Error::NotYetComplete)
        ));
        assert_eq!(server.outcome(), Some(Outcome::Success));
    }

    #[test]
    fn wrap_needs_completion() {
        let (mut server, _, _) = server(vec![greeting(&["PLAIN"]), outcome(SaslCode::Ok, None)]);
        assert!(matches!(server.wrap(b"x"), Err(Error::NotYetComplete)));
        assert!(matches!(server.unwrap(b"x"), Err(Error::NotYetComplete)));
        assert!(matches!(
            server.negotiated_property("javax.security.sasl.qop"),
            Err(Error::NotYetComplete)
        ));
        server.evaluate(b"\0alice\0secret123").unwrap();
        assert_eq!(&server.wrap(b"x").unwrap()[..], b"x");
        assert_eq!(server.negotiated_property("qop").unwrap(), None);
    }

    #[test]
    fn dispose_is_idempotent() {
        let (mut never_started, connector, _) = server(vec![]);
        never_started.dispose().unwrap();
        never_started.dispose().unwrap();
        assert_eq!(connector.connects(), 0);

        let (mut done, _, record) = server(vec![greeting(&["PLAIN"]), outcome(SaslCode::Ok, None)]);
        done.evaluate(b"\0alice\0secret123").unwrap();
        done.dispose().unwrap();
        done.dispose().unwrap();
        drop(done);
        assert_eq!(record.shutdowns(), 1);
    }
}
