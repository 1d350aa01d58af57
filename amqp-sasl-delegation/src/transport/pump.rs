//! Drives a [`TransportEngine`] against a blocking byte socket

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    time::{Duration, Instant},
};

use super::{engine::TransportEngine, Error};

/// Bytes read from the socket per call. SASL frames never exceed the minimum max frame size.
const READ_BUFFER_SIZE: usize = fe2o3_amqp_types::definitions::MIN_MAX_FRAME_SIZE;

/// Error raised while pumping bytes between a socket and an engine
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// The socket reached end of stream before the awaited condition held
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    /// The engine rejected the bytes read from the socket
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[source] Error),

    /// The deadline elapsed or a socket read timed out
    #[error("Timed out")]
    Timeout,

    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),
}

/// A blocking, bidirectional byte stream
pub trait Socket: Read + Write {
    /// Current bound on a single read
    fn read_timeout(&self) -> io::Result<Option<Duration>>;

    /// Bound the time a single read may block. `None` blocks indefinitely.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut down both directions of the stream
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        TcpStream::read_timeout(self)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // the peer may already have torn the connection down
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Writes every pending outbound byte of the engine to the sink
pub fn flush<E, W>(engine: &mut E, sink: &mut W) -> Result<(), PumpError>
where
    E: TransportEngine + ?Sized,
    W: Write + ?Sized,
{
    loop {
        let pending = engine.pending_outbound();
        if pending.is_empty() {
            break;
        }
        let written = sink.write(pending)?;
        if written == 0 {
            return Err(PumpError::Io(io::ErrorKind::WriteZero.into()));
        }
        engine.consume_outbound(written);
    }
    sink.flush()?;
    Ok(())
}

/// Feeds bytes read from the source into the engine until `predicate` holds.
///
/// With a `deadline`, each read is bounded by the time remaining and the loop fails with
/// [`PumpError::Timeout`] once it has passed. The socket's previous read timeout is restored
/// before returning.
pub fn pump_until<E, S, P>(
    engine: &mut E,
    source: &mut S,
    predicate: P,
    deadline: Option<Instant>,
) -> Result<(), PumpError>
where
    E: TransportEngine + ?Sized,
    S: Socket + ?Sized,
    P: Fn(&E) -> bool,
{
    let previous = match deadline {
        Some(_) => Some(source.read_timeout()?),
        None => None,
    };

    let result = pump(engine, source, predicate, deadline);
    match previous {
        Some(previous) => {
            let restored = source.set_read_timeout(previous);
            result?;
            restored.map_err(Into::into)
        }
        None => result,
    }
}

fn pump<E, S, P>(
    engine: &mut E,
    source: &mut S,
    predicate: P,
    deadline: Option<Instant>,
) -> Result<(), PumpError>
where
    E: TransportEngine + ?Sized,
    S: Socket + ?Sized,
    P: Fn(&E) -> bool,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while !predicate(&*engine) {
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PumpError::Timeout);
            }
            source.set_read_timeout(Some(remaining))?;
        }

        let n = match source.read(&mut buf) {
            Ok(0) => return Err(PumpError::UnexpectedEndOfStream),
            Ok(n) => n,
            Err(err) => match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    return Err(PumpError::Timeout)
                }
                _ => return Err(PumpError::Io(err)),
            },
        };

        engine
            .feed_inbound(&buf[..n])
            .map_err(PumpError::ProtocolViolation)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        io::{self, Read, Write},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::{Duration, Instant},
    };

    use bytes::Bytes;
    use fe2o3_amqp_types::primitives::Symbol;

    use super::{flush, pump_until, PumpError, Socket};
    use crate::transport::{Error, SaslState, TransportEngine};

    /// In-memory socket replaying scripted reads and recording writes.
    ///
    /// `written` and `shutdowns` stay observable after the socket is handed away.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedSocket {
        pub reads: VecDeque<io::Result<Vec<u8>>>,
        pub written: Arc<Mutex<Vec<u8>>>,
        pub max_write: Option<usize>,
        pub read_timeout: Option<Duration>,
        pub read_timeouts: Vec<Option<Duration>>,
        pub shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptedSocket {
        pub fn with_reads<I>(reads: I) -> Self
        where
            I: IntoIterator<Item = Vec<u8>>,
        {
            Self {
                reads: reads.into_iter().map(Ok).collect(),
                ..Default::default()
            }
        }

        pub fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }

        pub fn shutdowns(&self) -> usize {
            self.shutdowns.load(Ordering::SeqCst)
        }
    }

    impl Read for ScriptedSocket {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(Err(err)) => Err(err),
                Some(Ok(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(Ok(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for ScriptedSocket {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.max_write.unwrap_or(buf.len()).min(buf.len());
            self.written.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Socket for ScriptedSocket {
        fn read_timeout(&self) -> io::Result<Option<Duration>> {
            Ok(self.read_timeout)
        }

        fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            self.read_timeout = timeout;
            self.read_timeouts.push(timeout);
            Ok(())
        }

        fn shutdown(&mut self) -> io::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Engine that counts inbound bytes and treats `!` as garbage
    #[derive(Debug, Default)]
    pub(crate) struct CountingEngine {
        pub outbound: Vec<u8>,
        pub inbound: Vec<u8>,
        pub mechanisms: Option<Vec<Symbol>>,
        pub state: Option<SaslState>,
        pub pending: Option<Bytes>,
        pub closed: Arc<AtomicUsize>,
    }

    impl TransportEngine for CountingEngine {
        fn open(&mut self) -> Result<(), Error> {
            self.outbound.extend_from_slice(b"AMQP\x03\x01\x00\x00");
            Ok(())
        }

        fn pending_outbound(&self) -> &[u8] {
            &self.outbound
        }

        fn consume_outbound(&mut self, len: usize) {
            self.outbound.drain(..len);
        }

        fn feed_inbound(&mut self, bytes: &[u8]) -> Result<(), Error> {
            if bytes.contains(&b'!') {
                return Err(Error::IllegalState("garbage"));
            }
            self.inbound.extend_from_slice(bytes);
            Ok(())
        }

        fn announced_mechanisms(&self) -> Option<&[Symbol]> {
            self.mechanisms.as_deref()
        }

        fn outcome_state(&self) -> SaslState {
            self.state.unwrap_or(SaslState::Idle)
        }

        fn has_pending(&self) -> bool {
            self.pending.is_some()
        }

        fn take_pending(&mut self) -> Option<Bytes> {
            self.pending.take()
        }

        fn init(&mut self, mechanism: &str, _: Option<&str>, response: &[u8]) -> Result<(), Error> {
            self.outbound.extend_from_slice(mechanism.as_bytes());
            self.outbound.extend_from_slice(response);
            self.state = Some(SaslState::Step);
            Ok(())
        }

        fn respond(&mut self, response: &[u8]) -> Result<(), Error> {
            self.outbound.extend_from_slice(response);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn flush_survives_short_writes() {
        let mut engine = CountingEngine {
            outbound: b"0123456789".to_vec(),
            ..Default::default()
        };
        let mut socket = ScriptedSocket {
            max_write: Some(3),
            ..Default::default()
        };
        flush(&mut engine, &mut socket).unwrap();
        assert_eq!(socket.written(), b"0123456789");
        assert!(engine.pending_outbound().is_empty());
    }

    #[test]
    fn pump_reads_until_predicate_holds() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket.reads.push_back(Ok(b"ab".to_vec()));
        socket.reads.push_back(Ok(b"cd".to_vec()));
        socket.reads.push_back(Ok(b"ef".to_vec()));

        pump_until(&mut engine, &mut socket, |e| e.inbound.len() >= 4, None).unwrap();
        assert_eq!(engine.inbound, b"abcd");
        assert_eq!(socket.reads.len(), 1);
    }

    #[test]
    fn pump_does_not_read_when_already_satisfied() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket.reads.push_back(Ok(b"ab".to_vec()));
        pump_until(&mut engine, &mut socket, |_| true, None).unwrap();
        assert_eq!(socket.reads.len(), 1);
    }

    #[test]
    fn end_of_stream_before_predicate() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket.reads.push_back(Ok(b"ab".to_vec()));
        let err = pump_until(&mut engine, &mut socket, |e| e.inbound.len() > 2, None).unwrap_err();
        assert!(matches!(err, PumpError::UnexpectedEndOfStream));
    }

    #[test]
    fn rejected_bytes_are_a_protocol_violation() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket.reads.push_back(Ok(b"a!".to_vec()));
        let err = pump_until(&mut engine, &mut socket, |_| false, None).unwrap_err();
        assert!(matches!(
            err,
            PumpError::ProtocolViolation(Error::IllegalState("garbage"))
        ));
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket
            .reads
            .push_back(Err(io::ErrorKind::Interrupted.into()));
        socket.reads.push_back(Ok(b"ab".to_vec()));
        pump_until(&mut engine, &mut socket, |e| !e.inbound.is_empty(), None).unwrap();
        assert_eq!(engine.inbound, b"ab");
    }

    #[test]
    fn read_timeout_surfaces_as_timeout() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket.reads.push_back(Err(io::ErrorKind::WouldBlock.into()));
        let deadline = Instant::now() + Duration::from_secs(30);
        let err = pump_until(&mut engine, &mut socket, |_| false, Some(deadline)).unwrap_err();
        assert!(matches!(err, PumpError::Timeout));
        assert!(matches!(socket.read_timeouts[..], [Some(d), None] if d <= Duration::from_secs(30)));
        assert_eq!(socket.read_timeout, None);
    }

    #[test]
    fn previous_read_timeout_is_restored() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket {
            read_timeout: Some(Duration::from_secs(120)),
            ..Default::default()
        };
        socket.reads.push_back(Ok(b"ab".to_vec()));
        socket.reads.push_back(Ok(b"cd".to_vec()));

        let deadline = Instant::now() + Duration::from_secs(30);
        pump_until(&mut engine, &mut socket, |e| e.inbound.len() >= 4, Some(deadline)).unwrap();
        assert_eq!(socket.read_timeout, Some(Duration::from_secs(120)));
        assert_eq!(socket.read_timeouts.len(), 3);
        assert!(socket.read_timeouts[..2]
            .iter()
            .all(|t| matches!(t, Some(d) if *d <= Duration::from_secs(30))));

        // the socket stays usable with its own bound
        socket.reads.push_back(Ok(b"!".to_vec()));
        let err = pump_until(&mut engine, &mut socket, |_| false, Some(deadline)).unwrap_err();
        assert!(matches!(err, PumpError::ProtocolViolation(_)));
        assert_eq!(socket.read_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn elapsed_deadline_does_not_read() {
        let mut engine = CountingEngine::default();
        let mut socket = ScriptedSocket::default();
        socket.reads.push_back(Ok(b"ab".to_vec()));
        let err = pump_until(&mut engine, &mut socket, |_| false, Some(Instant::now())).unwrap_err();
        assert!(matches!(err, PumpError::Timeout));
        assert_eq!(socket.reads.len(), 1);
    }
}
