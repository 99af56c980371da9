//! Session registry — routes streams and datagrams to sessions
//!
//! Streams and datagrams for a session can arrive before the handshake that
//! establishes it has been processed. `SessionRegistry` parks such streams in
//! a waiter task until the session is announced, the stream times out, or the
//! registry shuts down. Each connection gets one datagram loop that fans
//! datagrams out to established sessions.
//!
//! All mutable state sits behind one mutex. It is never held across an
//! `.await`; waiting happens in spawned tasks tracked for shutdown.

mod datagram;
mod record;
mod waiter;

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::transport::{Connection, SessionRef};
use crate::types::{ConnectionId, RegistryStats, RouteOutcome, SessionId, SessionKey};
use record::SessionRecord;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use waiter::BufferedStream;

/// Registry of sessions multiplexed over one or more connections
///
/// Cheap to clone; clones share the same state. Entry points spawn tasks and
/// must be called from within a Tokio runtime.
pub struct SessionRegistry<C: Connection> {
    shared: Arc<Shared<C>>,
}

impl<C: Connection> Clone for SessionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct Shared<C: Connection> {
    config: RegistryConfig,
    state: Mutex<State<C>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

struct State<C: Connection> {
    sessions: HashMap<SessionKey, SessionRecord<C>>,

    /// Connections whose datagram loop was started, with the token that
    /// stops it
    ///
    /// An entry stays after its loop ends on a receive error or an empty
    /// datagram, so a broken connection is not read again. Only
    /// `remove_connection` clears it.
    connections: HashMap<ConnectionId, CancellationToken>,
}

impl<C: Connection> SessionRegistry<C> {
    /// Create a registry after validating its configuration
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    sessions: HashMap::new(),
                    connections: HashMap::new(),
                }),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        })
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Announce that the handshake for `session_id` on `conn` completed
    ///
    /// Streams already parked for the session are released to it; later
    /// streams are delivered without buffering. Each session must be
    /// announced once; a repeated announcement is logged and ignored.
    pub fn announce_session(
        &self,
        conn: &Arc<C>,
        session_id: SessionId,
        session: SessionRef<C>,
    ) {
        let key = SessionKey::new(conn.id(), session_id);
        let mut state = self.shared.lock();

        match state.sessions.entry(key) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                if record.establish(session) {
                    tracing::debug!(
                        connection = %key.connection,
                        session = %key.session,
                        waiters = record.waiters(),
                        "Session established, releasing buffered streams"
                    );
                } else {
                    tracing::warn!(
                        connection = %key.connection,
                        session = %key.session,
                        "Session announced twice, keeping the first handle"
                    );
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(SessionRecord::established(session));
                tracing::debug!(
                    connection = %key.connection,
                    session = %key.session,
                    "Session established"
                );
            }
        }

        self.shared.ensure_datagram_loop(&mut state, conn);
    }

    /// Route a new bidirectional stream to its session
    pub fn route_stream(
        &self,
        conn: &Arc<C>,
        session_id: SessionId,
        stream: C::BiStream,
    ) -> RouteOutcome {
        self.route(conn, session_id, BufferedStream::Bi(stream))
    }

    /// Route a new unidirectional stream to its session
    pub fn route_uni_stream(
        &self,
        conn: &Arc<C>,
        session_id: SessionId,
        stream: C::UniStream,
    ) -> RouteOutcome {
        self.route(conn, session_id, BufferedStream::Uni(stream))
    }

    fn route(
        &self,
        conn: &Arc<C>,
        session_id: SessionId,
        stream: BufferedStream<C>,
    ) -> RouteOutcome {
        let key = SessionKey::new(conn.id(), session_id);
        let deadline = Instant::now() + self.shared.config.stream_timeout();
        let mut state = self.shared.lock();

        // Checked under the same lock shutdown cancels under, and the waiter
        // is spawned before it is released, so every waiter is either tracked
        // before the tracker closes or never spawned
        if self.shared.shutdown.is_cancelled() {
            tracing::debug!(
                connection = %key.connection,
                session = %key.session,
                "Registry shut down, dropping stream"
            );
            return RouteOutcome::Dropped;
        }

        let record = state
            .sessions
            .entry(key)
            .or_insert_with(SessionRecord::pending);
        if let Some(session) = record.session() {
            drop(state);
            stream.deliver(session.as_ref());
            return RouteOutcome::Delivered;
        }

        let established = record.add_waiter();
        tracing::debug!(
            connection = %key.connection,
            session = %key.session,
            kind = stream.kind(),
            waiters = record.waiters(),
            "Buffering stream until session is established"
        );

        let shared = Arc::clone(&self.shared);
        self.shared
            .tasks
            .spawn(waiter::wait_for_session(shared, key, stream, established, deadline));

        self.shared.ensure_datagram_loop(&mut state, conn);
        RouteOutcome::Buffered
    }

    /// Forget every established session on a closed connection
    ///
    /// Stops the connection's datagram loop and drops its entry, so a later
    /// announcement on the same connection id starts a fresh loop. Records
    /// that still have parked streams are left alone; they are removed by
    /// their last waiter. Returns the number of sessions removed.
    pub fn remove_connection(&self, connection: ConnectionId) -> usize {
        let mut state = self.shared.lock();
        let before = state.sessions.len();
        state
            .sessions
            .retain(|key, record| key.connection != connection || record.waiters() > 0);
        let removed = before - state.sessions.len();

        if let Some(token) = state.connections.remove(&connection) {
            token.cancel();
        }

        tracing::debug!(connection = %connection, removed, "Connection removed");
        removed
    }

    /// Whether `session_id` on `connection` has been announced
    pub fn is_established(&self, connection: ConnectionId, session_id: SessionId) -> bool {
        self.shared
            .session(&SessionKey::new(connection, session_id))
            .is_some()
    }

    /// Snapshot of registry counters
    pub fn stats(&self) -> RegistryStats {
        let state = self.shared.lock();
        let mut stats = RegistryStats {
            sessions: state.sessions.len(),
            connections: state.connections.len(),
            tasks: self.shared.tasks.len(),
            ..Default::default()
        };
        for record in state.sessions.values() {
            if record.is_established() {
                stats.established_sessions += 1;
            } else {
                stats.pending_sessions += 1;
            }
            stats.buffered_streams += record.waiters();
        }
        stats
    }

    /// Whether `shutdown` has been called
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Stop every waiter and datagram loop and wait for them to finish
    ///
    /// Parked streams are abandoned without an abort; the connections are
    /// going away. Safe to call more than once.
    pub async fn shutdown(&self) {
        tracing::debug!(tasks = self.shared.tasks.len(), "Shutting down session registry");
        {
            let _state = self.shared.lock();
            self.shared.shutdown.cancel();
            self.shared.tasks.close();
        }
        self.shared.tasks.wait().await;
        tracing::debug!("Session registry shut down");
    }
}

impl<C: Connection> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Established session for `key`, if any
    pub(crate) fn session(&self, key: &SessionKey) -> Option<SessionRef<C>> {
        self.lock().sessions.get(key).and_then(SessionRecord::session)
    }

    /// Drop a waiter's claim on its record, removing the record if it was
    /// the last one and the session never showed up
    pub(crate) fn release_waiter(&self, key: &SessionKey) {
        let mut state = self.lock();
        let garbage = match state.sessions.get_mut(key) {
            Some(record) => record.release_waiter(),
            None => false,
        };
        if garbage {
            state.sessions.remove(key);
            tracing::debug!(
                connection = %key.connection,
                session = %key.session,
                "Removed session that was never established"
            );
        }
    }

    fn ensure_datagram_loop(self: &Arc<Self>, state: &mut State<C>, conn: &Arc<C>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Entry::Vacant(entry) = state.connections.entry(conn.id()) {
            let token = self.shutdown.child_token();
            entry.insert(token.clone());
            tracing::debug!(connection = %conn.id(), "Starting datagram loop");
            self.tasks
                .spawn(datagram::run(Arc::clone(self), Arc::clone(conn), token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{
        MemoryBiStream, MemoryConnection, MemorySession, MemoryUniStream, SessionEvent,
    };
    use crate::types::BUFFERED_STREAM_REJECTED;
    use std::time::Duration;

    fn registry() -> SessionRegistry<MemoryConnection> {
        SessionRegistry::new(RegistryConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result =
            SessionRegistry::<MemoryConnection>::new(RegistryConfig { stream_timeout_ms: 0 });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_announce_then_stream_fast_path() {
        let registry = registry();
        let conn = MemoryConnection::new();
        let (session, mut events) = MemorySession::new();

        registry.announce_session(&conn, SessionId(1), session);
        assert!(registry.is_established(conn.id(), SessionId(1)));

        let (stream, probe) = MemoryBiStream::new(0);
        assert_eq!(registry.route_stream(&conn, SessionId(1), stream), RouteOutcome::Delivered);

        // Delivered inline, nothing parked
        assert!(matches!(events.try_recv(), Ok(SessionEvent::Bi(s)) if s.id() == 0));
        assert!(!probe.is_aborted());
        let stats = registry.stats();
        assert_eq!(stats.buffered_streams, 0);
        assert_eq!(stats.established_sessions, 1);
        assert_eq!(stats.connections, 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_then_announce_converges_on_one_record() {
        let registry = registry();
        let conn = MemoryConnection::new();

        let (stream, probe) = MemoryUniStream::new(2);
        assert_eq!(registry.route_uni_stream(&conn, SessionId(5), stream), RouteOutcome::Buffered);

        let stats = registry.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.pending_sessions, 1);
        assert_eq!(stats.buffered_streams, 1);

        let (session, mut events) = MemorySession::new();
        registry.announce_session(&conn, SessionId(5), session);

        assert!(matches!(events.recv().await, Some(SessionEvent::Uni(s)) if s.id() == 2));
        assert!(!probe.is_aborted());

        // Same record, now established
        let stats = registry.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.established_sessions, 1);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_and_removes_record() {
        let registry = registry();
        let conn = MemoryConnection::new();

        let (stream, probe) = MemoryBiStream::new(0);
        registry.route_stream(&conn, SessionId(3), stream);

        tokio::time::sleep(Duration::from_millis(5_001)).await;

        assert_eq!(probe.read_aborted(), Some(BUFFERED_STREAM_REJECTED));
        assert_eq!(probe.write_aborted(), Some(BUFFERED_STREAM_REJECTED));
        assert_eq!(registry.stats().sessions, 0);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_announce_keeps_first_handle() {
        let registry = registry();
        let conn = MemoryConnection::new();
        let (first, mut first_events) = MemorySession::new();
        let (second, mut second_events) = MemorySession::new();

        registry.announce_session(&conn, SessionId(1), first);
        registry.announce_session(&conn, SessionId(1), second);

        let (stream, _) = MemoryBiStream::new(0);
        registry.route_stream(&conn, SessionId(1), stream);
        assert!(first_events.try_recv().is_ok());
        assert!(second_events.try_recv().is_err());
        assert_eq!(registry.stats().connections, 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_connection() {
        let registry = registry();
        let conn = MemoryConnection::new();
        let other = MemoryConnection::new();

        for id in 0..3 {
            let (session, _) = MemorySession::new();
            registry.announce_session(&conn, SessionId(id), session);
        }
        let (session, _) = MemorySession::new();
        registry.announce_session(&other, SessionId(0), session);

        // A parked stream keeps its pending record alive
        let (stream, _) = MemoryBiStream::new(0);
        registry.route_stream(&conn, SessionId(9), stream);

        assert_eq!(registry.remove_connection(conn.id()), 3);
        assert!(!registry.is_established(conn.id(), SessionId(0)));
        assert!(registry.is_established(other.id(), SessionId(0)));

        let stats = registry.stats();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.pending_sessions, 1);
        assert_eq!(stats.connections, 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_route_after_shutdown_drops() {
        let registry = registry();
        let conn = MemoryConnection::new();
        registry.shutdown().await;
        assert!(registry.is_shutdown());

        let (stream, probe) = MemoryBiStream::new(0);
        assert_eq!(registry.route_stream(&conn, SessionId(1), stream), RouteOutcome::Dropped);
        assert!(!probe.is_aborted());

        let (session, _) = MemorySession::new();
        registry.announce_session(&conn, SessionId(1), session);
        let stats = registry.stats();
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.tasks, 0);
    }
}
