//! In-memory transport for testing and single-process use
//!
//! `MemoryConnection` queues datagrams pushed by the test, the stream types
//! record abort codes in a shared `StreamProbe`, and `MemorySession` reports
//! everything it is handed on an unbounded channel.

use crate::error::{DemuxError, Result};
use crate::transport::{BiStream, Connection, SessionHandle, UniStream};
use crate::types::{ConnectionId, SessionId};
use crate::varint;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// In-memory connection with a manually fed datagram queue
pub struct MemoryConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Result<Bytes>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Bytes>>>,
}

impl MemoryConnection {
    /// Create a connection with a process-unique id
    pub fn new() -> Arc<Self> {
        Self::with_id(ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)))
    }

    /// Create a connection with an explicit id
    pub fn with_id(id: ConnectionId) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id,
            tx,
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Queue a raw datagram, session id prefix included
    pub fn push_datagram(&self, datagram: impl Into<Bytes>) {
        let _ = self.tx.send(Ok(datagram.into()));
    }

    /// Queue a datagram for `session` carrying `payload`
    pub fn push_session_datagram(&self, session: SessionId, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(varint::encoded_len(session.0)? + payload.len());
        varint::encode(session.0, &mut buf)?;
        buf.put_slice(payload);
        self.push_datagram(buf.freeze());
        Ok(())
    }

    /// Make the next receive fail as if the connection broke
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(DemuxError::Connection(reason.into())));
    }

    /// Make the next receive report a closed connection
    pub fn close(&self) {
        let _ = self.tx.send(Err(DemuxError::Closed));
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type BiStream = MemoryBiStream;
    type UniStream = MemoryUniStream;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn recv_datagram(&self) -> Result<Bytes> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.unwrap_or(Err(DemuxError::Closed))
    }
}

/// Abort codes a stream has received so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortState {
    pub read: Option<u64>,
    pub write: Option<u64>,
}

/// Observer for a memory stream that stays valid after the stream is moved
#[derive(Debug, Clone, Default)]
pub struct StreamProbe {
    state: Arc<Mutex<AbortState>>,
}

impl StreamProbe {
    /// Current abort state
    pub fn state(&self) -> AbortState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Code the read side was aborted with, if any
    pub fn read_aborted(&self) -> Option<u64> {
        self.state().read
    }

    /// Code the write side was aborted with, if any
    pub fn write_aborted(&self) -> Option<u64> {
        self.state().write
    }

    /// Whether either direction was aborted
    pub fn is_aborted(&self) -> bool {
        let state = self.state();
        state.read.is_some() || state.write.is_some()
    }

    fn update(&self, f: impl FnOnce(&mut AbortState)) {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// In-memory bidirectional stream
#[derive(Debug)]
pub struct MemoryBiStream {
    id: u64,
    probe: StreamProbe,
}

impl MemoryBiStream {
    pub fn new(id: u64) -> (Self, StreamProbe) {
        let probe = StreamProbe::default();
        (
            Self {
                id,
                probe: probe.clone(),
            },
            probe,
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl BiStream for MemoryBiStream {
    fn abort_read(&mut self, code: u64) {
        self.probe.update(|s| s.read = Some(code));
    }

    fn abort_write(&mut self, code: u64) {
        self.probe.update(|s| s.write = Some(code));
    }
}

/// In-memory receive-only stream
#[derive(Debug)]
pub struct MemoryUniStream {
    id: u64,
    probe: StreamProbe,
}

impl MemoryUniStream {
    pub fn new(id: u64) -> (Self, StreamProbe) {
        let probe = StreamProbe::default();
        (
            Self {
                id,
                probe: probe.clone(),
            },
            probe,
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl UniStream for MemoryUniStream {
    fn abort_read(&mut self, code: u64) {
        self.probe.update(|s| s.read = Some(code));
    }
}

/// Something a `MemorySession` was handed by the registry
#[derive(Debug)]
pub enum SessionEvent {
    Bi(MemoryBiStream),
    Uni(MemoryUniStream),
    Datagram(Bytes),
}

/// Session handle that forwards everything it receives to a channel
pub struct MemorySession {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl MemorySession {
    /// Create a session and the receiver its events arrive on
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), rx)
    }
}

impl SessionHandle<MemoryConnection> for MemorySession {
    fn accept_bi(&self, stream: MemoryBiStream) {
        let _ = self.events.send(SessionEvent::Bi(stream));
    }

    fn accept_uni(&self, stream: MemoryUniStream) {
        let _ = self.events.send(SessionEvent::Uni(stream));
    }

    fn handle_datagram(&self, payload: Bytes) {
        let _ = self.events.send(SessionEvent::Datagram(payload));
    }
}
