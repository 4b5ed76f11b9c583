//! # Connection Port
//!
//! This module is the subscription engine's boundary with the transport:
//! the messages it sends to the server-facing connection actor, the
//! messages it receives back, and the [`SubscriptionTarget`] trait that
//! abstracts over the two ways a subscription can address the log.
//!
//! ## The Message Contract
//!
//! ```text
//! ┌──────────────────┐   Outbound (Read / SubscribeTo / Unsubscribe)   ┌────────────┐
//! │   Subscription   │ ──────────────────────────────────────────────▶ │ Connection │
//! │      engine      │ ◀────────────────────────────────────────────── │   actor    │
//! └──────────────────┘   Inbound (ReadCompleted / SubscribeCompleted /  └────────────┘
//!                                 EventAppeared / Unsubscribed / Failed)
//! ```
//!
//! The connection actor itself - framing, correlation, reconnection policy -
//! lives outside this crate. Riptide only requires that each subscription
//! gets a channel pair: a shared sender for [`Outbound`] requests and a
//! dedicated receiver for that subscription's [`Inbound`] slice of the
//! transport inbox. The inbound receiver closing is how the engine learns
//! the connection died.
//!
//! ## Credentials
//!
//! When a subscription is configured with [`Credentials`], every outbound
//! message carries a copy. The engine never authenticates; the transport
//! does.

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::types::{
    Credentials, EventNumber, LogPosition, Position, ResolvedEvent, StreamId,
};

// =============================================================================
// Outbound Messages
// =============================================================================

/// A request from the subscription engine to the connection actor.
///
/// Reads always page forward; paging direction is a property of the engine,
/// not a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Read a forward page of a single stream.
    ReadStream {
        /// Stream to read.
        stream: StreamId,
        /// First event number of the page.
        from: EventNumber,
        /// Maximum events in the page.
        count: u32,
        /// Resolve link events in projected streams.
        resolve_link_tos: bool,
        /// Credentials, when configured.
        credentials: Option<Credentials>,
    },

    /// Read a forward page of the store-wide transaction file.
    ReadAll {
        /// First position of the page.
        from: Position,
        /// Maximum events in the page.
        count: u32,
        /// Resolve link events in projected streams.
        resolve_link_tos: bool,
        /// Credentials, when configured.
        credentials: Option<Credentials>,
    },

    /// Open a live push channel for a single stream.
    SubscribeToStream {
        /// Stream to subscribe to.
        stream: StreamId,
        /// Resolve link events in projected streams.
        resolve_link_tos: bool,
        /// Credentials, when configured.
        credentials: Option<Credentials>,
    },

    /// Open a live push channel for the all-streams feed.
    SubscribeToAll {
        /// Resolve link events in projected streams.
        resolve_link_tos: bool,
        /// Credentials, when configured.
        credentials: Option<Credentials>,
    },

    /// Tear down the live push channel.
    Unsubscribe {
        /// Credentials, when configured.
        credentials: Option<Credentials>,
    },
}

impl Outbound {
    /// The credentials attached to this request, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Outbound::ReadStream { credentials, .. }
            | Outbound::ReadAll { credentials, .. }
            | Outbound::SubscribeToStream { credentials, .. }
            | Outbound::SubscribeToAll { credentials, .. }
            | Outbound::Unsubscribe { credentials } => credentials.as_ref(),
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// A response or notification from the connection actor, routed to one
/// subscription.
///
/// Generic over the subscription's position type: a stream subscription
/// receives `Inbound<EventNumber>`, an all-streams subscription receives
/// `Inbound<Position>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<P> {
    /// A page of historical events.
    ReadCompleted {
        /// The page, in log order. May be empty.
        events: Vec<ResolvedEvent>,
        /// Where the next page starts.
        next: P,
        /// True if the page reached the end of the readable log.
        end_of_stream: bool,
    },

    /// The live push channel is open.
    SubscribeCompleted {
        /// The last position the server had committed at subscribe time.
        last_position: P,
    },

    /// A live event pushed by the server.
    EventAppeared(ResolvedEvent),

    /// The server tore down the push channel.
    Unsubscribed,

    /// A request failed.
    Failed(Error),
}

// =============================================================================
// Connection Handle
// =============================================================================

/// A clonable sending handle onto the connection actor.
///
/// Wraps the bounded request channel the transport listens on. Cheap to
/// clone; all clones feed the same actor.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Wraps a request sender obtained from the connection actor.
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// Sends a request to the connection actor.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] if the actor has gone away.
    pub async fn send(&self, request: Outbound) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

// =============================================================================
// Subscription Targets
// =============================================================================

/// What a subscription is aimed at: one stream, or the all-streams feed.
///
/// The target supplies everything position-scheme-specific that the engine
/// needs: the position type and its order (via [`LogPosition`]), the shapes
/// of the read and subscribe requests, and how to extract an event's
/// position. The state machine is generic over this trait and identical for
/// both targets.
pub trait SubscriptionTarget: Send + Sync + 'static {
    /// The position scheme this target orders by.
    type Pos: LogPosition;

    /// The ordering position of an event, as seen by this target.
    fn position(&self, event: &ResolvedEvent) -> Self::Pos;

    /// Builds the read request for a forward page starting at `from`.
    fn read_request(
        &self,
        from: Self::Pos,
        count: u32,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> Outbound;

    /// Builds the subscribe request for this target's live push channel.
    fn subscribe_request(
        &self,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> Outbound;

    /// A short name for logging: the stream id, or `$all`.
    fn describe(&self) -> &str;
}

/// Target for a single named stream, ordered by [`EventNumber`].
#[derive(Debug, Clone)]
pub struct StreamTarget {
    stream: StreamId,
}

impl StreamTarget {
    /// Creates a target for the given stream.
    pub fn new(stream: impl Into<StreamId>) -> Self {
        Self {
            stream: stream.into(),
        }
    }

    /// The stream this target reads and subscribes to.
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }
}

impl SubscriptionTarget for StreamTarget {
    type Pos = EventNumber;

    fn position(&self, event: &ResolvedEvent) -> EventNumber {
        event.original_number()
    }

    fn read_request(
        &self,
        from: EventNumber,
        count: u32,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> Outbound {
        Outbound::ReadStream {
            stream: self.stream.clone(),
            from,
            count,
            resolve_link_tos,
            credentials,
        }
    }

    fn subscribe_request(
        &self,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> Outbound {
        Outbound::SubscribeToStream {
            stream: self.stream.clone(),
            resolve_link_tos,
            credentials,
        }
    }

    fn describe(&self) -> &str {
        self.stream.as_str()
    }
}

/// Target for the store-wide feed, ordered by [`Position`].
#[derive(Debug, Clone, Default)]
pub struct AllTarget;

impl AllTarget {
    /// Creates the all-streams target.
    pub fn new() -> Self {
        Self
    }
}

impl SubscriptionTarget for AllTarget {
    type Pos = Position;

    fn position(&self, event: &ResolvedEvent) -> Position {
        event.original_position()
    }

    fn read_request(
        &self,
        from: Position,
        count: u32,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> Outbound {
        Outbound::ReadAll {
            from,
            count,
            resolve_link_tos,
            credentials,
        }
    }

    fn subscribe_request(
        &self,
        resolve_link_tos: bool,
        credentials: Option<Credentials>,
    ) -> Outbound {
        Outbound::SubscribeToAll {
            resolve_link_tos,
            credentials,
        }
    }

    fn describe(&self) -> &str {
        "$all"
    }
}

// =============================================================================
// Tests
// =============================================================================
