use std::{fmt, sync::Arc};

use bytes::Bytes;
use fe2o3_amqp_types::sasl::SaslCode;

use super::{release, upstream_event, upstream_has_replied, Upstream, UpstreamEvent};
use crate::{
    auth::{
        scram::attributes::{SERVER_ERROR_KEY, VERIFIER_KEY},
        ClientFirstMessage, ScramMechanism,
    },
    config::UpstreamConfig,
    server::{authorized, next_session_id, Outcome, SaslServer},
    transport::{self, SaslClientEngine},
    upstream::{Connector, TcpConnector, UpstreamHandle},
    Error,
};

/// Where a SCRAM delegation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    AwaitingChallenge,
    AwaitingProof,
    EvaluatingProof,
    Done(Outcome),
}

/// Input to the state machine, from the client or from the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    ClientMessage,
    Challenge,
    Passed,
    Failed,
}

impl From<UpstreamEvent> for Event {
    fn from(event: UpstreamEvent) -> Self {
        match event {
            UpstreamEvent::Challenge => Event::Challenge,
            UpstreamEvent::Passed => Event::Passed,
            UpstreamEvent::Failed => Event::Failed,
        }
    }
}

/// What the session does in reaction to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    ForwardClientFirst,
    ReturnChallenge,
    EndedEarly,
    ForwardProof,
    /// The server-final message came as a challenge and the outcome follows
    AcknowledgeServerFinal,
    ReturnServerFinal,
    Reject,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Initial => "initial",
            State::AwaitingChallenge => "awaiting challenge",
            State::AwaitingProof => "awaiting proof",
            State::EvaluatingProof => "evaluating proof",
            State::Done(_) => "done",
        }
    }

    fn advance(self, event: Event) -> Result<(State, Effect), Error> {
        use self::{Effect::*, Event::*, State::*};

        let next = match (self, event) {
            (Done(_), _) => return Err(Error::NotYetComplete),
            (Initial, ClientMessage) => (AwaitingChallenge, ForwardClientFirst),
            (AwaitingChallenge, Challenge) => (AwaitingProof, ReturnChallenge),
            (AwaitingChallenge, Passed | Failed) => (Done(Outcome::Failure), EndedEarly),
            (AwaitingProof, ClientMessage) => (EvaluatingProof, ForwardProof),
            (EvaluatingProof, Challenge) => (EvaluatingProof, AcknowledgeServerFinal),
            (EvaluatingProof, Passed) => (Done(Outcome::Success), ReturnServerFinal),
            (EvaluatingProof, Failed) => (Done(Outcome::Failure), Reject),
            (Initial | AwaitingChallenge | AwaitingProof | EvaluatingProof, _) => {
                return Err(Error::IllegalSequencing(self.name()))
            }
        };
        Ok(next)
    }
}

fn step(session: u64, state: &mut State, event: Event) -> Result<Effect, Error> {
    let (next, effect) = state.advance(event)?;
    trace_event!(
        trace,
        "[session {}] {:?} on {:?}: {:?} -> {:?}",
        session,
        effect,
        event,
        state,
        next
    );
    *state = next;
    Ok(effect)
}

/// `SCRAM-SHA-256`/`SCRAM-SHA-512` verifier relaying every round to the upstream.
///
/// The gateway never sees the salted secret. The upstream computes the challenge and checks
/// the proof, and its server-final message is returned to the client unchanged.
pub struct DelegatingScramServer<C: Connector = TcpConnector> {
    session: u64,
    mechanism: ScramMechanism,
    connector: Arc<C>,
    config: Arc<UpstreamConfig>,
    upstream: Option<Upstream<C>>,
    state: State,
    username: Option<String>,
    authorization_id: Option<String>,
}

impl<C: Connector> fmt::Debug for DelegatingScramServer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingScramServer")
            .field("session", &self.session)
            .field("mechanism", &self.mechanism)
            .field("upstream", &format_args!("{}:{}", self.config.host, self.config.port))
            .field("connected", &self.upstream.is_some())
            .field("state", &self.state)
            .field("username", &self.username)
            .field("authorization_id", &self.authorization_id)
            .finish()
    }
}

impl<C: Connector> DelegatingScramServer<C> {
    /// Creates a session. Nothing is connected until the first `evaluate`.
    pub fn new(mechanism: ScramMechanism, connector: Arc<C>, config: Arc<UpstreamConfig>) -> Self {
        Self {
            session: next_session_id(),
            mechanism,
            connector,
            config,
            upstream: None,
            state: State::Initial,
            username: None,
            authorization_id: None,
        }
    }

    /// The mechanism variant of this session
    pub fn mechanism(&self) -> ScramMechanism {
        self.mechanism
    }

    fn dispatch(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        match step(self.session, &mut self.state, Event::ClientMessage)? {
            Effect::ForwardClientFirst => self.forward_client_first(response),
            Effect::ForwardProof => self.forward_proof(response),
            _ => Err(Error::IllegalSequencing(self.state.name())),
        }
    }

    fn forward_client_first(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        let client_first = ClientFirstMessage::parse(response)?;
        let name = self.mechanism.mechanism_name();
        trace_event!(
            debug,
            "[session {}] Delegating {} for {} to {}:{}",
            self.session,
            name,
            client_first.username(),
            self.config.host,
            self.config.port
        );

        let upstream = self.upstream.insert(UpstreamHandle::bootstrap(
            &*self.connector,
            SaslClientEngine::new(),
            &self.config,
            name,
        )?);
        upstream.send_init(name, Some(self.config.sasl_hostname()), response)?;
        upstream.pump_until(upstream_has_replied)?;

        let event = upstream_event::<C>(upstream)?;
        match step(self.session, &mut self.state, event.into())? {
            Effect::ReturnChallenge => {
                self.username = Some(client_first.username().to_string());
                Ok(upstream.take_pending().unwrap_or_default())
            }
            Effect::EndedEarly => Err(Error::UpstreamEndedEarly),
            _ => Err(Error::IllegalSequencing(self.state.name())),
        }
    }

    fn forward_proof(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        let upstream = self
            .upstream
            .as_mut()
            .ok_or(Error::ProtocolViolation(transport::Error::Closed))?;
        upstream.send_response(response)?;

        let mut server_final: Option<Bytes> = None;
        loop {
            upstream.pump_until(upstream_has_replied)?;
            let event = upstream_event::<C>(upstream)?;
            match step(self.session, &mut self.state, event.into())? {
                Effect::AcknowledgeServerFinal => {
                    let data = upstream.take_pending().unwrap_or_default();
                    if server_final.is_some() || !data.starts_with(VERIFIER_KEY.as_bytes()) {
                        return Err(Error::ProtocolViolation(transport::Error::UnexpectedFrame {
                            frame: "sasl-challenge",
                            state: "awaiting the outcome",
                        }));
                    }
                    server_final = Some(data);
                    upstream.send_response(&[])?;
                }
                Effect::ReturnServerFinal => {
                    let data = upstream
                        .take_pending()
                        .filter(|data| !data.is_empty())
                        .or(server_final)
                        .unwrap_or_default();
                    if !data.starts_with(VERIFIER_KEY.as_bytes()) {
                        return Err(Error::ProtocolViolation(transport::Error::OutcomeMismatch {
                            code: SaslCode::Ok,
                        }));
                    }
                    self.authorization_id = self.username.take();
                    return Ok(data);
                }
                Effect::Reject => {
                    let data = upstream.take_pending().unwrap_or_default();
                    if data.starts_with(VERIFIER_KEY.as_bytes()) {
                        let code = upstream
                            .engine()
                            .and_then(|engine| engine.outcome_code())
                            .cloned()
                            .unwrap_or(SaslCode::Auth);
                        return Err(Error::ProtocolViolation(transport::Error::OutcomeMismatch {
                            code,
                        }));
                    }
                    if let Some(_message) = data.strip_prefix(SERVER_ERROR_KEY.as_bytes()) {
                        trace_event!(
                            debug,
                            "[session {}] Upstream reported {}",
                            self.session,
                            String::from_utf8_lossy(_message)
                        );
                    }
                    return Err(Error::UpstreamRejected);
                }
                _ => return Err(Error::IllegalSequencing(self.state.name())),
            }
        }
    }
}

impl<C: Connector> SaslServer for DelegatingScramServer<C> {
    fn mechanism_name(&self) -> &str {
        self.mechanism.mechanism_name()
    }

    fn evaluate(&mut self, response: &[u8]) -> Result<Bytes, Error> {
        if let State::Done(_) = self.state {
            return Err(Error::NotYetComplete);
        }

        let result = self.dispatch(response);
        if let Err(_err) = &result {
            trace_event!(
                info,
                "[session {}] {} delegation failed in state {}: {}",
                self.session,
                self.mechanism,
                self.state.name(),
                _err
            );
            self.state = State::Done(Outcome::Failure);
            self.authorization_id = None;
        }
        if let State::Done(_outcome) = self.state {
            trace_event!(
                info,
                "[session {}] {} delegation finished: {:?}",
                self.session,
                self.mechanism,
                _outcome
            );
            release::<C>(self.session, &mut self.upstream);
        }
        result
    }

    fn is_complete(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    fn outcome(&self) -> Option<Outcome> {
        match self.state {
            State::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn authorization_id(&self) -> Result<&str, Error> {
        authorized(self.outcome(), self.authorization_id.as_deref())
    }

    fn dispose(&mut self) -> Result<(), Error> {
        release::<C>(self.session, &mut self.upstream);
        Ok(())
    }
}
