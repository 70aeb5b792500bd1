//! Live transport connections
//!
//! One `Connection` per registered party. The outbound channel is bounded,
//! so a stalled client drops events instead of pinning server memory.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use deskwire_shared::PartyIdentity;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::ServerEvent;

/// A live connection owned by exactly one party
#[derive(Debug)]
pub struct Connection {
    /// Distinguishes this connection from any replacement for the same party
    pub id: Uuid,

    /// The party this connection speaks for
    pub identity: PartyIdentity,

    /// Bounded queue to the outbound forwarder task
    sender: mpsc::Sender<ServerEvent>,

    /// Signalled when the registry evicts this connection
    cancel: CancellationToken,

    /// Last inbound frame, for idle sweeping
    last_seen: Mutex<Instant>,
}

impl Connection {
    pub fn new(identity: PartyIdentity, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            sender,
            cancel: CancellationToken::new(),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Queue an event for the outbound task. Returns false when the event
    /// was dropped: the buffer is full or the channel is closed.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    identity = %self.identity,
                    "Outbound buffer full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the session task to shut this connection down
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection has been closed or evicted
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Record inbound traffic; any frame counts as liveness
    pub fn mark_activity(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    /// Time since the last inbound frame
    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|last_seen| last_seen.elapsed())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskwire_shared::PartyKind;

    fn test_connection(capacity: usize) -> (Connection, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let identity = PartyIdentity::new(PartyKind::Customer, "CUS1");
        (Connection::new(identity, tx), rx)
    }

    #[tokio::test]
    async fn test_connection_send() {
        let (conn, mut rx) = test_connection(8);

        assert!(conn.send(ServerEvent::pong()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn test_send_fails_when_buffer_full() {
        let (conn, _rx) = test_connection(1);

        assert!(conn.send(ServerEvent::pong()));
        // Nothing drains the queue, so the second push is dropped
        assert!(!conn.send(ServerEvent::pong()));
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (conn, rx) = test_connection(8);
        drop(rx);

        assert!(!conn.send(ServerEvent::pong()));
    }

    #[tokio::test]
    async fn test_close_is_observable() {
        let (conn, _rx) = test_connection(1);
        assert!(!conn.is_closed());

        conn.close();
        assert!(conn.is_closed());
        conn.closed().await; // Resolves immediately once cancelled
    }

    #[tokio::test]
    async fn test_mark_activity_resets_idle_clock() {
        let (conn, _rx) = test_connection(1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.idle_for() >= Duration::from_millis(10));

        conn.mark_activity();
        assert!(conn.idle_for() < Duration::from_millis(10));
    }
}
