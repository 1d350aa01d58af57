//! Transport engine driving the client side of the AMQP 1.0 SASL layer

use bytes::{Buf, Bytes, BytesMut};
use fe2o3_amqp_types::{
    definitions::MIN_MAX_FRAME_SIZE,
    primitives::{Binary, Symbol},
    sasl::{SaslCode, SaslInit, SaslResponse},
    states::ConnectionState,
};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::frames::sasl::{Frame, FrameCodec};

use super::{
    length_delimited_decoder, length_delimited_encoder,
    protocol_header::{ProtocolHeader, ProtocolHeaderCodec},
    Error,
};

/// Progress of the SASL exchange as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslState {
    /// No sasl-init has been sent yet
    Idle,

    /// sasl-init has been sent and no outcome has been received
    Step,

    /// The upstream reported a successful outcome
    Pass,

    /// The upstream reported a failed outcome
    Fail,
}

impl SaslState {
    /// Whether an outcome has been received
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaslState::Pass | SaslState::Fail)
    }
}

/// Byte level protocol engine that the frame pump drives against a socket.
///
/// The engine never touches the socket itself. It queues outbound bytes until they are
/// consumed and processes inbound bytes as they are fed.
pub trait TransportEngine {
    /// Queue the SASL protocol header
    fn open(&mut self) -> Result<(), Error>;

    /// Outbound bytes not yet written to the socket
    fn pending_outbound(&self) -> &[u8];

    /// Mark the first `len` outbound bytes as written
    fn consume_outbound(&mut self, len: usize);

    /// Process bytes read from the socket
    fn feed_inbound(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Mechanisms announced by the upstream, `None` until the announcement arrives
    fn announced_mechanisms(&self) -> Option<&[Symbol]>;

    /// Progress of the SASL exchange
    fn outcome_state(&self) -> SaslState;

    /// Whether a challenge or outcome payload is waiting to be taken
    fn has_pending(&self) -> bool;

    /// Take the pending challenge, or the additional data of the outcome
    fn take_pending(&mut self) -> Option<Bytes>;

    /// Queue a sasl-init frame
    fn init(
        &mut self,
        mechanism: &str,
        hostname: Option<&str>,
        initial_response: &[u8],
    ) -> Result<(), Error>;

    /// Queue a sasl-response frame
    fn respond(&mut self, response: &[u8]) -> Result<(), Error>;

    /// Discard all buffered state. Closing twice is a no-op.
    fn close(&mut self);
}

/// [`TransportEngine`] speaking the client side of the AMQP 1.0 SASL layer
#[derive(Debug)]
pub struct SaslClientEngine {
    connection_state: ConnectionState,
    outbound: BytesMut,
    inbound: BytesMut,
    frame_encoder: LengthDelimitedCodec,
    frame_decoder: LengthDelimitedCodec,
    mechanisms: Option<Vec<Symbol>>,
    sasl_state: SaslState,
    pending: Option<Bytes>,
    outcome: Option<SaslCode>,
}

impl Default for SaslClientEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SaslClientEngine {
    /// Creates an engine limited to the frame size allowed before negotiation
    pub fn new() -> Self {
        Self {
            connection_state: ConnectionState::Start,
            outbound: BytesMut::new(),
            inbound: BytesMut::new(),
            frame_encoder: length_delimited_encoder(MIN_MAX_FRAME_SIZE),
            frame_decoder: length_delimited_decoder(MIN_MAX_FRAME_SIZE),
            mechanisms: None,
            sasl_state: SaslState::Idle,
            pending: None,
            outcome: None,
        }
    }

    /// State of the logical AMQP connection carried by this engine
    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection_state
    }

    /// Outcome code reported by the upstream, if any
    pub fn outcome_code(&self) -> Option<&SaslCode> {
        self.outcome.as_ref()
    }

    fn state_name(&self) -> &'static str {
        match self.sasl_state {
            SaslState::Idle if self.mechanisms.is_some() => "awaiting sasl-init",
            SaslState::Idle => "awaiting sasl-mechanisms",
            SaslState::Step if self.pending.is_some() => "awaiting sasl-response",
            SaslState::Step => "negotiating",
            SaslState::Pass | SaslState::Fail => "negotiation has ended",
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.connection_state {
            ConnectionState::End => Err(Error::Closed),
            ConnectionState::Start => Err(Error::IllegalState("protocol header not sent")),
            _ => Ok(()),
        }
    }

    fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        trace_event!(trace, "SEND frame = {}", frame.name());
        let mut body = BytesMut::new();
        FrameCodec {}.encode(frame, &mut body)?;
        self.frame_encoder.encode(body.freeze(), &mut self.outbound)?;
        Ok(())
    }

    fn receive_header(&mut self) -> Result<bool, Error> {
        let header = match (ProtocolHeaderCodec {}).decode(&mut self.inbound)? {
            Some(header) => header,
            None => return Ok(false),
        };
        trace_event!(trace, "RECV proto_header = {:?}", header);
        if !header.is_supported_sasl() {
            return Err(Error::ProtocolHeaderMismatch(header.into()));
        }
        self.connection_state = match self.connection_state {
            ConnectionState::HeaderSent => ConnectionState::HeaderExchange,
            _ => ConnectionState::HeaderReceived,
        };
        Ok(true)
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), Error> {
        trace_event!(trace, "RECV frame = {}", frame.name());
        let unexpected = Error::UnexpectedFrame {
            frame: frame.name(),
            state: self.state_name(),
        };

        match frame {
            Frame::Mechanisms(mechanisms) => {
                if self.mechanisms.is_some() {
                    return Err(unexpected);
                }
                self.mechanisms = Some(mechanisms.sasl_server_mechanisms.0);
            }
            Frame::Challenge(challenge) => {
                if self.sasl_state != SaslState::Step || self.pending.is_some() {
                    return Err(unexpected);
                }
                self.pending = Some(Bytes::from(challenge.challenge.into_vec()));
            }
            // an unanswered challenge cannot be followed by an outcome
            Frame::Outcome(outcome) => {
                if self.sasl_state != SaslState::Step || self.pending.is_some() {
                    return Err(unexpected);
                }
                self.sasl_state = match outcome.code {
                    SaslCode::Ok => SaslState::Pass,
                    _ => SaslState::Fail,
                };
                self.pending = outcome
                    .additional_data
                    .map(|data| Bytes::from(data.into_vec()));
                self.outcome = Some(outcome.code);
            }
            // frames only a SASL server receives
            Frame::Init(_) | Frame::Response(_) => return Err(unexpected),
        }
        Ok(())
    }
}

impl TransportEngine for SaslClientEngine {
    fn open(&mut self) -> Result<(), Error> {
        match self.connection_state {
            ConnectionState::Start | ConnectionState::HeaderReceived => {}
            ConnectionState::End => return Err(Error::Closed),
            _ => return Err(Error::IllegalState("protocol header already sent")),
        }
        let header = ProtocolHeader::sasl();
        trace_event!(trace, "SEND proto_header = {:?}", header);
        ProtocolHeaderCodec {}.encode(header, &mut self.outbound)?;
        self.connection_state = match self.connection_state {
            ConnectionState::HeaderReceived => ConnectionState::HeaderExchange,
            _ => ConnectionState::HeaderSent,
        };
        Ok(())
    }

    fn pending_outbound(&self) -> &[u8] {
        &self.outbound[..]
    }

    fn consume_outbound(&mut self, len: usize) {
        let len = len.min(self.outbound.len());
        self.outbound.advance(len);
    }

    fn feed_inbound(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if matches!(self.connection_state, ConnectionState::End) {
            return Err(Error::Closed);
        }
        self.inbound.extend_from_slice(bytes);

        if !matches!(
            self.connection_state,
            ConnectionState::HeaderExchange | ConnectionState::HeaderReceived
        ) && !self.receive_header()?
        {
            return Ok(());
        }

        while let Some(mut raw) = self.frame_decoder.decode(&mut self.inbound)? {
            let frame = FrameCodec {}
                .decode(&mut raw)?
                .ok_or(Error::IllegalState("empty frame body"))?;
            self.on_frame(frame)?;
        }
        Ok(())
    }

    fn announced_mechanisms(&self) -> Option<&[Symbol]> {
        self.mechanisms.as_deref()
    }

    fn outcome_state(&self) -> SaslState {
        self.sasl_state
    }

    fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn take_pending(&mut self) -> Option<Bytes> {
        self.pending.take()
    }

    fn init(
        &mut self,
        mechanism: &str,
        hostname: Option<&str>,
        initial_response: &[u8],
    ) -> Result<(), Error> {
        self.ensure_open()?;
        if self.mechanisms.is_none() {
            return Err(Error::IllegalState("sasl-init before sasl-mechanisms"));
        }
        if self.sasl_state != SaslState::Idle {
            return Err(Error::IllegalState("sasl-init already sent"));
        }

        let init = SaslInit {
            mechanism: Symbol::from(mechanism),
            initial_response: Some(Binary::from(initial_response.to_vec())),
            hostname: hostname.map(String::from),
        };
        self.write_frame(Frame::Init(init))?;
        self.sasl_state = SaslState::Step;
        Ok(())
    }

    fn respond(&mut self, response: &[u8]) -> Result<(), Error> {
        self.ensure_open()?;
        if self.sasl_state != SaslState::Step {
            return Err(Error::IllegalState("sasl-response outside of negotiation"));
        }
        // the challenge being answered is consumed
        self.pending = None;

        let response = SaslResponse {
            response: Binary::from(response.to_vec()),
        };
        self.write_frame(Frame::Response(response))
    }

    fn close(&mut self) {
        if matches!(self.connection_state, ConnectionState::End) {
            return;
        }
        self.outbound.clear();
        self.inbound.clear();
        self.pending = None;
        self.connection_state = ConnectionState::End;
    }
}
