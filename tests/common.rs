#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;

use riptide::{
    ConnectionHandle, EventNumber, Inbound, Outbound, Position, RecordedEvent, ResolvedEvent,
    StreamId,
};

pub const TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait before deciding that nothing is going to happen.
pub const QUIET: Duration = Duration::from_millis(100);

/// The server side of a subscription under test: captures the engine's
/// outbound requests and pushes inbound messages back.
pub struct RemoteLog<P> {
    requests: mpsc::Receiver<Outbound>,
    push: mpsc::UnboundedSender<Inbound<P>>,
}

/// Creates the channel plumbing a subscription needs, plus the simulated
/// server end.
pub fn remote_log<P>() -> (
    ConnectionHandle,
    mpsc::UnboundedReceiver<Inbound<P>>,
    RemoteLog<P>,
) {
    let (request_tx, request_rx) = mpsc::channel(64);
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    (
        ConnectionHandle::new(request_tx),
        push_rx,
        RemoteLog {
            requests: request_rx,
            push: push_tx,
        },
    )
}

impl<P> RemoteLog<P> {
    /// The next request the engine sent, or a panic after [`TIMEOUT`].
    pub async fn next_request(&mut self) -> Outbound {
        tokio::time::timeout(TIMEOUT, self.requests.recv())
            .await
            .expect("timed out waiting for an outbound request")
            .expect("connection request channel closed")
    }

    /// Asserts the engine stays quiet for a little while.
    pub async fn expect_no_request(&mut self) {
        let outcome = tokio::time::timeout(QUIET, self.requests.recv()).await;
        if let Ok(Some(request)) = outcome {
            panic!("expected no outbound request, got {:?}", request);
        }
    }

    /// Pushes an inbound message to the subscription.
    pub fn send(&self, message: Inbound<P>) {
        assert!(
            self.push.send(message).is_ok(),
            "subscription driver has gone away"
        );
    }

    /// Simulates the connection dying: both directions go away at once.
    pub fn disconnect(self) {}
}

// =============================================================================
// Event and Message Builders
// =============================================================================

pub fn num(n: u64) -> EventNumber {
    EventNumber::from_raw(n)
}

pub fn pos(n: u64) -> Position {
    Position::new(n, n)
}

/// A plain event numbered `n` at transaction file position `(n, n)`.
pub fn event(n: u64) -> ResolvedEvent {
    ResolvedEvent::from_event(RecordedEvent {
        stream_id: StreamId::new("orders-1"),
        number: num(n),
        position: pos(n),
        event_type: "order-placed".to_string(),
        data: n.to_be_bytes().to_vec(),
        metadata: None,
        created_ms: 1_700_000_000_000 + n,
    })
}

/// An event reached through a link numbered `link_number` in a projected
/// stream; the target lives elsewhere.
pub fn linked_event(link_number: u64, target_stream: &str, target_number: u64) -> ResolvedEvent {
    ResolvedEvent {
        event: RecordedEvent {
            stream_id: StreamId::new(target_stream),
            number: num(target_number),
            position: pos(1_000 + target_number),
            event_type: "order-placed".to_string(),
            data: target_number.to_be_bytes().to_vec(),
            metadata: None,
            created_ms: 1_700_000_000_000,
        },
        link: Some(RecordedEvent {
            stream_id: StreamId::new("$orders-by-day"),
            number: num(link_number),
            position: pos(2_000 + link_number),
            event_type: "$>".to_string(),
            data: vec![],
            metadata: None,
            created_ms: 1_700_000_000_000,
        }),
    }
}

/// A page of a single-stream read.
pub fn stream_page(ns: &[u64], next: u64, end_of_stream: bool) -> Inbound<EventNumber> {
    Inbound::ReadCompleted {
        events: ns.iter().map(|&n| event(n)).collect(),
        next: num(next),
        end_of_stream,
    }
}

/// A page of an all-streams read.
pub fn all_page(ns: &[u64], next: u64, end_of_stream: bool) -> Inbound<Position> {
    Inbound::ReadCompleted {
        events: ns.iter().map(|&n| event(n)).collect(),
        next: pos(next),
        end_of_stream,
    }
}

/// Pulls the next delivery out of a subscription, or panics after [`TIMEOUT`].
pub async fn next_delivery<P: riptide::LogPosition>(
    sub: &mut riptide::Subscription<P>,
) -> Option<riptide::Result<ResolvedEvent>> {
    tokio::time::timeout(TIMEOUT, sub.next())
        .await
        .expect("timed out waiting for a delivery")
}

/// Asserts no delivery shows up for a little while.
pub async fn expect_no_delivery<P: riptide::LogPosition>(sub: &mut riptide::Subscription<P>) {
    let outcome = tokio::time::timeout(QUIET, sub.next()).await;
    if let Ok(delivery) = outcome {
        panic!("expected no delivery, got {:?}", delivery);
    }
}
