//! src/transport/mod.rs
//!
//! Binds the connection-oriented, authenticated-encrypted messaging
//! substrate to QUIC. One QUIC uni-directional stream carries exactly one
//! `Message`: its frames are length-prefixed and concatenated, the stream is
//! finished immediately after, so the receiver's `read_to_end` yields the
//! whole message in one shot.
//!
//! `PeerId` is the opaque identity the transport assigns to an accepted
//! remote peer, realized here as the connection's remote socket address.

pub mod tls;

use crate::codec::Message;
use crate::error::{Error, Result};
use ed25519_dalek::SigningKey;
use quinn::{Connection, Endpoint, TokioRuntime};
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// The maximum allowed size of a single encoded `Message` on the wire.
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A peer's transport-assigned identity: its remote socket address for the
/// lifetime of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(SocketAddr);

impl From<SocketAddr> for PeerId {
    fn from(addr: SocketAddr) -> Self {
        PeerId(addr)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The outcome of reading one message off a connection: a decoded message,
/// or a frame sequence that failed to decode. A malformed frame is not an
/// error — the caller logs and keeps reading.
pub enum Frame {
    Message(Message),
    Malformed,
}

fn bind_udp_socket(bind_addr: SocketAddr) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&bind_addr.into())?;
    let std_socket: std::net::UdpSocket = socket.into();
    std_socket.set_nonblocking(true)?;
    Ok(std_socket)
}

/// Binds the Collector's agent-facing listener: accepts any certificate.
pub fn bind_agent_endpoint(bind_addr: SocketAddr, signing_key: &SigningKey) -> Result<Endpoint> {
    let server_config = tls::agent_listener_config(signing_key)?;
    let socket = bind_udp_socket(bind_addr)?;
    Ok(Endpoint::new(Default::default(), Some(server_config), socket, Arc::new(TokioRuntime))?)
}

/// Binds the Collector's client-facing listener: accepts only certificates
/// whose public key is under `authorized_dir`.
pub fn bind_client_endpoint(
    bind_addr: SocketAddr,
    signing_key: &SigningKey,
    authorized_dir: &std::path::Path,
) -> Result<Endpoint> {
    let server_config = tls::client_listener_config(signing_key, authorized_dir)?;
    let socket = bind_udp_socket(bind_addr)?;
    Ok(Endpoint::new(Default::default(), Some(server_config), socket, Arc::new(TokioRuntime))?)
}

/// Dials out to `target` (an Agent connecting to the Collector's
/// agent-facing port, or a Client connecting to the Collector's
/// client-facing port), presenting `signing_key`'s certificate.
pub async fn dial(signing_key: &SigningKey, target: SocketAddr) -> Result<Connection> {
    let local_addr: SocketAddr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
    let socket = bind_udp_socket(local_addr)?;
    let mut endpoint = Endpoint::new(Default::default(), None, socket, Arc::new(TokioRuntime))?;
    endpoint.set_default_client_config(tls::dialer_config(signing_key)?);

    let connecting = endpoint
        .connect(target, "localhost")
        .map_err(|e| Error::ConnectFailed(target, e))?;
    connecting
        .await
        .map_err(|e| Error::ConnectionEstablishFailed(target, e))
}

/// Accepts the next incoming connection on `endpoint`. `None` means the
/// endpoint itself has shut down.
pub async fn accept(endpoint: &Endpoint) -> Option<Result<(Connection, PeerId)>> {
    let connecting = endpoint.accept().await?;
    Some(match connecting.await {
        Ok(connection) => Ok((connection.clone(), PeerId::from(connection.remote_address()))),
        Err(e) => Err(Error::Connection(e)),
    })
}

/// Sends one whole `Message` as a single finished QUIC uni-stream.
pub async fn send_message(connection: &Connection, message: &Message) -> Result<()> {
    let mut stream = connection.open_uni().await?;
    stream.write_all(&encode_frames(&message.encode())).await?;
    stream.finish().await?;
    Ok(())
}

/// Waits for the next inbound uni-stream and reads it to completion, then
/// decodes it. Returns `Ok(None)` once the peer has closed the connection.
pub async fn recv_message(connection: &Connection) -> Result<Option<Frame>> {
    let mut recv = match connection.accept_uni().await {
        Ok(recv) => recv,
        Err(quinn::ConnectionError::ApplicationClosed(_))
        | Err(quinn::ConnectionError::LocallyClosed) => return Ok(None),
        Err(e) => return Err(Error::Connection(e)),
    };
    let bytes = recv.read_to_end(MAX_MESSAGE_SIZE).await?;
    Ok(Some(match decode_frames(&bytes).and_then(|frames| Message::decode(&frames)) {
        Some(message) => Frame::Message(message),
        None => Frame::Malformed,
    }))
}

fn encode_frames(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    for frame in frames {
        buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        buf.extend_from_slice(frame);
    }
    buf
}

fn decode_frames(mut bytes: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            return None;
        }
        let (len_bytes, rest) = bytes.split_at(4);
        let len = u32::from_be_bytes(len_bytes.try_into().ok()?) as usize;
        if rest.len() < len {
            return None;
        }
        let (frame, rest) = rest.split_at(len);
        frames.push(frame.to_vec());
        bytes = rest;
    }
    Some(frames)
}
