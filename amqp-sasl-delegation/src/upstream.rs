//! Fresh outbound connection to the upstream AMQP server for one authentication attempt

use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use bytes::Bytes;

use crate::{
    config::UpstreamConfig,
    transport::{self, Socket, TransportEngine},
    Error,
};

/// Opens sockets to the upstream
pub trait Connector {
    /// Socket type
    type Socket: Socket;

    /// Connects to `host:port`, giving up after `timeout` when one is set
    fn connect(&self, host: &str, port: u16, timeout: Option<Duration>) -> io::Result<Self::Socket>;
}

/// [`Connector`] opening plain TCP connections
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector {}

impl Connector for TcpConnector {
    type Socket = TcpStream;

    fn connect(&self, host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
        let stream = match timeout {
            None => TcpStream::connect((host, port))?,
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for addr in (host, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(err) => last_err = Some(err),
                    }
                }
                match (connected, last_err) {
                    (Some(stream), _) => stream,
                    (None, Some(err)) => return Err(err),
                    (None, None) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "could not resolve to any address",
                        ))
                    }
                }
            }
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// The socket and transport engine of one delegation session.
///
/// Closed exactly once: by [`close`](UpstreamHandle::close) or on drop, whichever comes first.
#[derive(Debug)]
pub struct UpstreamHandle<S: Socket, E: TransportEngine> {
    socket: Option<S>,
    engine: Option<E>,
    negotiation_timeout: Option<Duration>,
}

impl<S: Socket, E: TransportEngine> UpstreamHandle<S, E> {
    /// Connects, exchanges protocol headers and waits for the mechanism announcement.
    ///
    /// Fails with [`Error::MechanismNotOffered`] when the upstream does not announce
    /// `mechanism`. The connection is closed on every failure.
    pub fn bootstrap<C>(
        connector: &C,
        engine: E,
        config: &UpstreamConfig,
        mechanism: &str,
    ) -> Result<Self, Error>
    where
        C: Connector<Socket = S> + ?Sized,
    {
        trace_event!(debug, "Connecting to upstream {}:{}", config.host, config.port);
        let socket = connector
            .connect(&config.host, config.port, config.connect_timeout)
            .map_err(|source| match source.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::UpstreamTimeout,
                _ => Error::ConnectFailure {
                    host: config.host.clone(),
                    port: config.port,
                    source,
                },
            })?;

        let mut handle = Self {
            socket: Some(socket),
            engine: Some(engine),
            negotiation_timeout: config.negotiation_timeout,
        };
        {
            let (socket, engine) = handle.parts()?;
            engine.open()?;
            transport::flush(engine, socket)?;
        }
        handle.pump_until(|engine| {
            engine
                .announced_mechanisms()
                .map_or(false, |mechanisms| !mechanisms.is_empty())
        })?;

        let offered = handle
            .engine()
            .and_then(|engine| engine.announced_mechanisms())
            .unwrap_or_default();
        trace_event!(debug, "Upstream announced mechanisms {:?}", offered);
        if !offered.iter().any(|m| m.as_str() == mechanism) {
            let offered = offered.iter().map(|m| m.as_str().to_string()).collect();
            return Err(Error::MechanismNotOffered {
                requested: mechanism.to_string(),
                offered,
            });
        }
        Ok(handle)
    }

    /// The engine, until the handle is closed
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Whether the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.socket.is_none() && self.engine.is_none()
    }

    /// Sends sasl-init and flushes it
    pub fn send_init(
        &mut self,
        mechanism: &str,
        hostname: Option<&str>,
        initial_response: &[u8],
    ) -> Result<(), Error> {
        let (socket, engine) = self.parts()?;
        engine.init(mechanism, hostname, initial_response)?;
        transport::flush(engine, socket)?;
        Ok(())
    }

    /// Sends sasl-response and flushes it
    pub fn send_response(&mut self, response: &[u8]) -> Result<(), Error> {
        let (socket, engine) = self.parts()?;
        engine.respond(response)?;
        transport::flush(engine, socket)?;
        Ok(())
    }

    /// Reads from the upstream until `predicate` holds, bounded by the negotiation timeout
    pub fn pump_until<P>(&mut self, predicate: P) -> Result<(), Error>
    where
        P: Fn(&E) -> bool,
    {
        let deadline = self.negotiation_timeout.map(|timeout| Instant::now() + timeout);
        let (socket, engine) = self.parts()?;
        transport::pump_until(engine, socket, predicate, deadline)?;
        Ok(())
    }

    /// Takes the pending challenge or outcome data
    pub fn take_pending(&mut self) -> Option<Bytes> {
        self.engine.as_mut().and_then(|engine| engine.take_pending())
    }

    /// Shuts the socket down and closes the engine. Later calls do nothing.
    pub fn close(&mut self) -> io::Result<()> {
        let result = match self.socket.take() {
            Some(mut socket) => socket.shutdown(),
            None => Ok(()),
        };
        if let Some(mut engine) = self.engine.take() {
            engine.close();
            trace_event!(trace, "Closed upstream connection");
        }
        result
    }

    fn parts(&mut self) -> Result<(&mut S, &mut E), Error> {
        match (self.socket.as_mut(), self.engine.as_mut()) {
            (Some(socket), Some(engine)) => Ok((socket, engine)),
            _ => Err(Error::ProtocolViolation(transport::Error::Closed)),
        }
    }
}

impl<S: Socket, E: TransportEngine> Drop for UpstreamHandle<S, E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
