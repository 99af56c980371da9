//! Per-session registry entry

use crate::transport::{Connection, SessionRef};
use tokio::sync::watch;

/// State for one (connection, session id) pair
///
/// The watch channel is the establishment signal: it starts as `None` and is
/// set to the session handle exactly once. Receivers created after that see
/// the handle immediately.
pub(crate) struct SessionRecord<C: Connection> {
    established: watch::Sender<Option<SessionRef<C>>>,
    waiters: usize,
}

impl<C: Connection> SessionRecord<C> {
    /// Record for a stream that arrived before its session
    pub(crate) fn pending() -> Self {
        let (established, _) = watch::channel(None);
        Self {
            established,
            waiters: 0,
        }
    }

    /// Record for a session announced before any of its streams
    pub(crate) fn established(session: SessionRef<C>) -> Self {
        let (established, _) = watch::channel(Some(session));
        Self {
            established,
            waiters: 0,
        }
    }

    pub(crate) fn session(&self) -> Option<SessionRef<C>> {
        self.established.borrow().clone()
    }

    pub(crate) fn is_established(&self) -> bool {
        self.established.borrow().is_some()
    }

    /// Attach the session and wake every waiter
    ///
    /// Returns false if the record was already established; the original
    /// session is kept.
    pub(crate) fn establish(&mut self, session: SessionRef<C>) -> bool {
        self.established.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(session);
            true
        })
    }

    /// Register a waiter and hand it a receiver for the signal
    pub(crate) fn add_waiter(&mut self) -> watch::Receiver<Option<SessionRef<C>>> {
        self.waiters += 1;
        self.established.subscribe()
    }

    /// Unregister a waiter; returns true when the record is now garbage
    pub(crate) fn release_waiter(&mut self) -> bool {
        self.waiters = self.waiters.saturating_sub(1);
        self.waiters == 0 && !self.is_established()
    }

    pub(crate) fn waiters(&self) -> usize {
        self.waiters
    }
}
