#![allow(dead_code)]

use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    thread::JoinHandle,
    time::Duration,
};

use amqp_sasl_delegation::{
    frames::sasl::{Frame, FrameCodec},
    transport::{length_delimited_decoder, length_delimited_encoder},
    types::{
        primitives::{Binary, Symbol},
        sasl::{SaslChallenge, SaslCode, SaslMechanisms, SaslOutcome},
    },
    UpstreamConfig,
};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

pub const SASL_HEADER: &[u8] = b"AMQP\x03\x01\x00\x00";

/// What the scripted upstream does after receiving a frame from the gateway
#[derive(Debug, Clone)]
pub enum Reply {
    Challenge(Vec<u8>),
    Outcome(SaslCode, Option<Vec<u8>>),
    /// Close the connection without answering
    HangUp,
    /// Keep the connection open without answering
    Stall(Duration),
}

impl Reply {
    pub fn ok(data: Option<&[u8]>) -> Self {
        Reply::Outcome(SaslCode::Ok, data.map(<[u8]>::to_vec))
    }

    pub fn auth_failed() -> Self {
        Reply::Outcome(SaslCode::Auth, None)
    }
}

/// A one-connection AMQP SASL server on a loopback port
pub struct ScriptedUpstream {
    pub port: u16,
    handle: JoinHandle<Vec<Frame>>,
}

impl ScriptedUpstream {
    /// Announces `mechanisms`, then answers each received frame with the next reply
    pub fn spawn(mechanisms: &[&str], replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mechanisms: Vec<Symbol> = mechanisms.iter().map(|m| Symbol::from(*m)).collect();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .unwrap();

            let mut header = [0u8; 8];
            stream.read_exact(&mut header).unwrap();
            assert_eq!(&header[..], SASL_HEADER);
            stream.write_all(SASL_HEADER).unwrap();
            write_frame(
                &mut stream,
                Frame::Mechanisms(SaslMechanisms {
                    sasl_server_mechanisms: mechanisms.into(),
                }),
            );

            let mut received = Vec::new();
            for reply in replies {
                match read_frame(&mut stream) {
                    Some(frame) => received.push(frame),
                    None => return received,
                }
                match reply {
                    Reply::Challenge(data) => write_frame(
                        &mut stream,
                        Frame::Challenge(SaslChallenge {
                            challenge: Binary::from(data),
                        }),
                    ),
                    Reply::Outcome(code, data) => write_frame(
                        &mut stream,
                        Frame::Outcome(SaslOutcome {
                            code,
                            additional_data: data.map(Binary::from),
                        }),
                    ),
                    Reply::HangUp => return received,
                    Reply::Stall(duration) => {
                        std::thread::sleep(duration);
                        return received;
                    }
                }
            }

            // the gateway closes once it has an outcome
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
            received
        });

        Self { port, handle }
    }

    pub fn config(&self) -> UpstreamConfig {
        UpstreamConfig::builder()
            .host("127.0.0.1")
            .port(self.port)
            .sasl_hostname("broker.example.com")
            .negotiation_timeout(Duration::from_secs(5))
            .build()
    }

    /// Frames received from the gateway
    pub fn join(self) -> Vec<Frame> {
        self.handle.join().unwrap()
    }
}

fn write_frame(stream: &mut TcpStream, frame: Frame) {
    let mut body = BytesMut::new();
    FrameCodec {}.encode(frame, &mut body).unwrap();
    let mut buf = BytesMut::new();
    length_delimited_encoder(512)
        .encode(body.freeze(), &mut buf)
        .unwrap();
    stream.write_all(&buf).unwrap();
}

fn read_frame(stream: &mut TcpStream) -> Option<Frame> {
    let mut size = [0u8; 4];
    stream.read_exact(&mut size).ok()?;
    let len = u32::from_be_bytes(size) as usize;
    let mut buf = BytesMut::from(&size[..]);
    buf.resize(len, 0);
    stream.read_exact(&mut buf[4..]).ok()?;

    let mut body = length_delimited_decoder(512).decode(&mut buf).unwrap()?;
    FrameCodec {}.decode(&mut body).unwrap()
}

/// A loopback port nothing listens on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
