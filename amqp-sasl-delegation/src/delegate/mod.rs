//! Verifiers that replay the client's exchange to an upstream AMQP server
//!
//! Every session opens its own connection on the first `evaluate` and closes it as soon as
//! the exchange reaches an outcome. Nothing is cached between sessions.

use crate::{
    transport::{self, SaslClientEngine, SaslState, TransportEngine},
    upstream::{Connector, UpstreamHandle},
    Error,
};

mod plain;
mod scram;

pub use plain::DelegatingPlainServer;
pub use scram::DelegatingScramServer;

type Upstream<C> = UpstreamHandle<<C as Connector>::Socket, SaslClientEngine>;

/// What the upstream did after the last frame was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpstreamEvent {
    Challenge,
    Passed,
    Failed,
}

/// Predicate for the pump: the upstream has sent a challenge or an outcome
pub(crate) fn upstream_has_replied<E: TransportEngine>(engine: &E) -> bool {
    engine.outcome_state().is_terminal()
        || (engine.outcome_state() == SaslState::Step && engine.has_pending())
}

pub(crate) fn upstream_event<C: Connector>(upstream: &Upstream<C>) -> Result<UpstreamEvent, Error> {
    let engine = upstream
        .engine()
        .ok_or(Error::ProtocolViolation(transport::Error::Closed))?;
    match engine.outcome_state() {
        SaslState::Pass => Ok(UpstreamEvent::Passed),
        SaslState::Fail => Ok(UpstreamEvent::Failed),
        SaslState::Step if engine.has_pending() => Ok(UpstreamEvent::Challenge),
        SaslState::Step | SaslState::Idle => Err(Error::ProtocolViolation(
            transport::Error::IllegalState("upstream has not replied"),
        )),
    }
}

fn release<C: Connector>(session: u64, upstream: &mut Option<Upstream<C>>) {
    if let Some(mut upstream) = upstream.take() {
        if let Err(_err) = upstream.close() {
            trace_event!(warn, "[session {}] Error closing upstream connection: {}", session, _err);
        }
    }
}
