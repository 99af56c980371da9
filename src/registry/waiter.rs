//! Waiter task for streams that arrived before their session

use super::Shared;
use crate::transport::{BiStream, Connection, SessionHandle, SessionRef, UniStream};
use crate::types::{SessionKey, BUFFERED_STREAM_REJECTED};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// A stream parked until its session is established
pub(crate) enum BufferedStream<C: Connection> {
    Bi(C::BiStream),
    Uni(C::UniStream),
}

impl<C: Connection> BufferedStream<C> {
    /// Hand the stream to the session's matching intake
    pub(crate) fn deliver(self, session: &dyn SessionHandle<C>) {
        match self {
            Self::Bi(stream) => session.accept_bi(stream),
            Self::Uni(stream) => session.accept_uni(stream),
        }
    }

    /// Reset the stream: both directions for bidirectional streams, the read
    /// side for receive-only ones
    fn reject(self) {
        match self {
            Self::Bi(mut stream) => {
                stream.abort_read(BUFFERED_STREAM_REJECTED);
                stream.abort_write(BUFFERED_STREAM_REJECTED);
            }
            Self::Uni(mut stream) => stream.abort_read(BUFFERED_STREAM_REJECTED),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Bi(_) => "bidirectional",
            Self::Uni(_) => "unidirectional",
        }
    }
}

enum Wake<C: Connection> {
    Established(SessionRef<C>),
    TimedOut,
    Shutdown,
}

/// Park `stream` until its session is announced, `deadline` passes, or the
/// registry shuts down, then give up the record
///
/// Every waiter has its own deadline, even when several wait on the same
/// session.
pub(crate) async fn wait_for_session<C: Connection>(
    shared: Arc<Shared<C>>,
    key: SessionKey,
    stream: BufferedStream<C>,
    mut established: watch::Receiver<Option<SessionRef<C>>>,
    deadline: Instant,
) {
    let announced = async {
        match established.wait_for(Option::is_some).await {
            Ok(session) => session.clone(),
            Err(_) => None,
        }
    };

    // Delivery wins over a timeout that expires in the same instant
    let wake = tokio::select! {
        biased;
        Some(session) = announced => Wake::Established(session),
        _ = shared.shutdown.cancelled() => Wake::Shutdown,
        _ = tokio::time::sleep_until(deadline) => Wake::TimedOut,
    };

    match wake {
        Wake::Established(session) => {
            tracing::debug!(
                connection = %key.connection,
                session = %key.session,
                kind = stream.kind(),
                "Delivering buffered stream"
            );
            stream.deliver(session.as_ref());
        }
        Wake::TimedOut => {
            tracing::debug!(
                connection = %key.connection,
                session = %key.session,
                kind = stream.kind(),
                "Session not established in time, rejecting buffered stream"
            );
            stream.reject();
        }
        Wake::Shutdown => {
            tracing::debug!(
                connection = %key.connection,
                session = %key.session,
                "Registry shutting down, abandoning buffered stream"
            );
        }
    }

    shared.release_waiter(&key);
}
