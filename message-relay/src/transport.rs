//! Identity-addressed transport over TCP.
//!
//! [`RouterEndpoint`] owns the listening socket. Every accepted connection
//! gets a fresh [`ConnectionId`], a reader task that forwards decoded frames
//! into one shared event channel, and a writer task fed by its own channel.
//! Callers never see sockets: they receive `(id, frame)` pairs and reply by
//! id. The dealer side is a plain [`connect`] returning a framed reader and
//! writer pair.

use std::{collections::HashMap, fmt, io, net::SocketAddr};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::frame::{Frame, FrameError, MultipartCodec};

// Inbound frames from all connections queue here before the server loop picks
// them up; a full queue pushes back on the reader tasks.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub type FrameReader = FramedRead<OwnedReadHalf, MultipartCodec>;
pub type FrameWriter = FramedWrite<OwnedWriteHalf, MultipartCodec>;

/// Server-assigned handle for one client connection.
///
/// Ids are never reused within a process, so a stale id can only miss, never
/// reach a different client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame { from: ConnectionId, frame: Frame },
    Closed { id: ConnectionId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0} is not connected")]
    UnknownIdentity(ConnectionId),
}

pub struct RouterEndpoint {
    listener: TcpListener,
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<Frame>>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    next_id: u64,
}

impl RouterEndpoint {
    pub fn new(listener: TcpListener) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            listener,
            peers: HashMap::new(),
            events_tx,
            events_rx,
            next_id: 1,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Waits for the next frame or disconnect from any client, accepting new
    /// connections in the meantime.
    ///
    /// Cancel safe: dropping the future loses neither a connection nor a
    /// frame.
    pub async fn receive(&mut self) -> TransportEvent {
        loop {
            select! {
                accept_result = self.listener.accept() => {
                    self.handle_accept_result(accept_result);
                }
                Some(event) = self.events_rx.recv() => {
                    if let TransportEvent::Closed { id } = &event {
                        self.peers.remove(id);
                    }
                    return event;
                }
            }
        }
    }

    /// Stops writing to `id` while leaving its reader running.
    #[cfg(test)]
    pub(crate) fn drop_writer(&mut self, id: ConnectionId) -> bool {
        self.peers.remove(&id).is_some()
    }

    /// Queues `frame` for the connection behind `to`.
    pub fn send(&mut self, to: ConnectionId, frame: Frame) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get(&to)
            .ok_or(TransportError::UnknownIdentity(to))?;

        if peer.send(frame).is_err() {
            // Writer task is gone; the reader will report Closed shortly.
            self.peers.remove(&to);
            return Err(TransportError::UnknownIdentity(to));
        }
        Ok(())
    }

    fn handle_accept_result(&mut self, result: io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, peer)) => self.attach(stream, peer),
            Err(err) => warn!(error = ?err, "failed to accept connection"),
        }
    }

    fn attach(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;

        let (reader, writer) = framed(stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.peers.insert(id, outbound_tx);

        tokio::spawn(read_frames(id, peer, reader, self.events_tx.clone()));
        tokio::spawn(write_frames(id, writer, outbound_rx));
        debug!(%id, %peer, "connection accepted");
    }
}

/// Opens the client side of the transport.
pub async fn connect(host: &str, port: u16) -> io::Result<(FrameReader, FrameWriter)> {
    let stream = TcpStream::connect((host, port)).await?;
    Ok(framed(stream))
}

fn framed(stream: TcpStream) -> (FrameReader, FrameWriter) {
    let (reader, writer) = stream.into_split();
    (
        FramedRead::new(reader, MultipartCodec::new()),
        FramedWrite::new(writer, MultipartCodec::new()),
    )
}

async fn read_frames(
    id: ConnectionId,
    peer: SocketAddr,
    mut reader: FrameReader,
    events: mpsc::Sender<TransportEvent>,
) {
    while let Some(result) = reader.next().await {
        match result {
            Ok(frame) => {
                if events
                    .send(TransportEvent::Frame { from: id, frame })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(err) => {
                warn!(%id, %peer, error = %err, "dropping connection with unreadable framing");
                break;
            }
        }
    }

    debug!(%id, %peer, "connection closed");
    let _ = events.send(TransportEvent::Closed { id }).await;
}

async fn write_frames(
    id: ConnectionId,
    mut writer: FrameWriter,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = outbound.recv().await {
        match writer.send(frame).await {
            Ok(()) => {}
            // The encoder refuses before writing, so the stream stays in sync.
            Err(err @ (FrameError::TooManyParts { .. } | FrameError::FrameTooLarge { .. })) => {
                warn!(%id, error = %err, "dropping frame that exceeds framing limits");
            }
            Err(FrameError::Io(err)) => {
                debug!(%id, error = %err, "failed to deliver frame");
                break;
            }
        }
    }
}
