//! Per-connection datagram fan-out loop

use super::Shared;
use crate::transport::Connection;
use crate::types::{SessionId, SessionKey};
use crate::varint;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Read datagrams from `conn` and hand each payload to its session
///
/// Datagrams for sessions that are not established are dropped; they carry
/// no buffering guarantee. The loop ends when `stop` is cancelled (shutdown or
/// `remove_connection`), on a receive error, or on an empty datagram. The
/// connection keeps its registry entry in the last two cases, so it is not
/// read again until it is removed.
pub(crate) async fn run<C: Connection>(
    shared: Arc<Shared<C>>,
    conn: Arc<C>,
    stop: CancellationToken,
) {
    let connection = conn.id();

    loop {
        let received = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!(connection = %connection, "Datagram loop cancelled");
                return;
            }
            received = conn.recv_datagram() => received,
        };

        let mut datagram = match received {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::debug!(
                    connection = %connection,
                    error = %e,
                    "Receiving datagram failed, stopping datagram loop"
                );
                return;
            }
        };

        if datagram.is_empty() {
            tracing::info!(connection = %connection, "Got empty datagram, stopping datagram loop");
            return;
        }

        let session = match varint::decode(&mut datagram) {
            Ok(id) => SessionId(id),
            Err(e) => {
                tracing::error!(
                    connection = %connection,
                    error = %e,
                    "Reading session id from datagram failed"
                );
                continue;
            }
        };

        match shared.session(&SessionKey::new(connection, session)) {
            Some(handle) => {
                tracing::trace!(
                    connection = %connection,
                    session = %session,
                    len = datagram.len(),
                    "Datagram received"
                );
                handle.handle_datagram(datagram);
            }
            None => {
                tracing::trace!(
                    connection = %connection,
                    session = %session,
                    "Dropping datagram for unknown session"
                );
            }
        }
    }
}
