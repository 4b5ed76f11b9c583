//! # Domain Types for Riptide
//!
//! This module defines the core types used throughout Riptide. These types
//! model the remote-log domain: streams, events, and the two position schemes
//! a subscription can be addressed by.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! We use the "newtype pattern" extensively - wrapping primitive types in
//! single-field structs. This provides:
//!
//! - **Type safety**: Can't accidentally pass an `EventNumber` where a
//!   `Position` is expected
//! - **Self-documenting code**: Function signatures tell you what they expect
//! - **Encapsulation**: Can add validation or change representation later
//!
//! ## The Two Position Schemes
//!
//! A subscription addresses the log in one of two ways:
//!
//! - [`EventNumber`]: the per-stream scheme. Each stream numbers its events
//!   0, 1, 2, ... independently of every other stream.
//! - [`Position`]: the all-streams scheme. Every event also has a place in
//!   the store-wide transaction file, identified by a (commit, prepare) pair
//!   ordered lexicographically.
//!
//! Both implement [`LogPosition`], the total order the subscription engine
//! is generic over.
//!
//! ## Sentinels
//!
//! Each position type carries two distinguished values:
//!
//! - `FIRST`: less than or equal to every real position; "the beginning".
//! - `END`: greater than every real position; "the end of the log at
//!   subscribe time". Starting a subscription from `END` skips the
//!   historical read entirely and goes straight to live events.

use std::fmt;
use std::hash::Hash;

// =============================================================================
// Position Trait
// =============================================================================

/// The total order a subscription is generic over.
///
/// A `LogPosition` identifies an event's place in the log. The subscription
/// engine only ever compares positions and carries them around; everything
/// else about an event is opaque to it.
///
/// # Contract
///
/// - `FIRST <= p` for every position `p`.
/// - `p < END` for every real (non-sentinel) position `p`.
/// - The order is total: any two positions compare.
pub trait LogPosition:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The lowest position; reading from here reads the whole log.
    const FIRST: Self;

    /// Sentinel meaning "the end of the log at subscribe time".
    ///
    /// Never the position of a real event. Used as a starting point to mean
    /// "live events only, no historical read".
    const END: Self;

    /// Returns true if this is the [`LogPosition::END`] sentinel.
    fn is_end(&self) -> bool {
        *self == Self::END
    }
}

// =============================================================================
// Stream Identification
// =============================================================================

/// A human-readable identifier for an event stream.
///
/// In event sourcing, a stream is a sequence of events for a single entity:
/// `"user-12345"`, `"order-abc-123"`, and so on. Stream ids travel as strings
/// on the wire; the engine never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a new stream ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this stream ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Per-Stream Positions
// =============================================================================

/// An event's number within a single stream.
///
/// # Invariants
///
/// - Strictly increases within a stream, starting at 0
/// - Assigned by the server; never reused
/// - `u64::MAX` is reserved as the [`EventNumber::END`] sentinel and is
///   never the number of a real event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventNumber(u64);

impl EventNumber {
    /// The first event number in any stream (0).
    pub const FIRST: EventNumber = EventNumber(0);

    /// Sentinel meaning "the end of the stream at subscribe time".
    pub const END: EventNumber = EventNumber(u64::MAX);

    /// Creates an EventNumber from a raw value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns the next event number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl LogPosition for EventNumber {
    const FIRST: Self = EventNumber::FIRST;
    const END: Self = EventNumber::END;
}

impl fmt::Display for EventNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::END {
            write!(f, "end")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// =============================================================================
// All-Streams Positions
// =============================================================================

/// An event's place in the store-wide transaction file.
///
/// A `Position` is a (commit, prepare) pair ordered lexicographically:
/// commit position first, prepare position as a tie-breaker. The derived
/// `Ord` gives exactly this order because of field declaration order.
///
/// # Invariants
///
/// - `prepare <= commit` for every position the server hands out
/// - Strictly increases across the whole store
/// - `(u64::MAX, u64::MAX)` is reserved as the [`Position::END`] sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    commit: u64,
    prepare: u64,
}

impl Position {
    /// The start of the transaction file: `(0, 0)`.
    pub const FIRST: Position = Position {
        commit: 0,
        prepare: 0,
    };

    /// Sentinel meaning "the end of the transaction file at subscribe time".
    pub const END: Position = Position {
        commit: u64::MAX,
        prepare: u64::MAX,
    };

    /// Creates a Position from commit and prepare offsets.
    pub fn new(commit: u64, prepare: u64) -> Self {
        Self { commit, prepare }
    }

    /// Returns the commit offset.
    pub fn commit(&self) -> u64 {
        self.commit
    }

    /// Returns the prepare offset.
    pub fn prepare(&self) -> u64 {
        self.prepare
    }
}

impl LogPosition for Position {
    const FIRST: Self = Position::FIRST;
    const END: Self = Position::END;
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::END {
            write!(f, "end")
        } else {
            write!(f, "C:{}/P:{}", self.commit, self.prepare)
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// User credentials attached to outbound requests.
///
/// When a subscription is configured with credentials, every `Read`,
/// `SubscribeTo` and `Unsubscribe` it sends carries a copy. The engine
/// never inspects them; the transport does the actual authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account login.
    pub login: String,

    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a login/password pair.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

// Passwords must not leak into logs or panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Events
// =============================================================================

/// An event as stored by the server, with full position information.
///
/// This is the "output" form - what the server hands back from reads and
/// push notifications. The payload is opaque bytes; the client chooses the
/// serialization format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// The stream this event was recorded in.
    pub stream_id: StreamId,

    /// The event's number within its stream.
    pub number: EventNumber,

    /// The event's place in the store-wide transaction file.
    pub position: Position,

    /// The event type, for filtering and routing.
    pub event_type: String,

    /// The event payload.
    pub data: Vec<u8>,

    /// Optional metadata about the event.
    pub metadata: Option<Vec<u8>>,

    /// When the event was stored (Unix milliseconds).
    pub created_ms: u64,
}

/// An event received from a read or a subscription, with link resolution.
///
/// Projected streams contain *link* events pointing at events in other
/// streams. When `resolve_link_tos` is set, the server sends both: `event`
/// is the resolved target and `link` is the pointer as it appears in the
/// subscribed stream.
///
/// # Ordering
///
/// For the purpose of subscription ordering, what matters is where the event
/// sits *in the subscribed stream* - the link when there is one, the event
/// itself otherwise. That is what [`ResolvedEvent::original_event`] returns,
/// and the engine orders exclusively by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEvent {
    /// The event itself (the link target, if resolved from a link).
    pub event: RecordedEvent,

    /// The link event, when this event was reached through one.
    pub link: Option<RecordedEvent>,
}

impl ResolvedEvent {
    /// Creates a resolved event with no link.
    pub fn from_event(event: RecordedEvent) -> Self {
        Self { event, link: None }
    }

    /// The event as it appeared in the stream that was read or subscribed:
    /// the link when present, the event itself otherwise.
    pub fn original_event(&self) -> &RecordedEvent {
        self.link.as_ref().unwrap_or(&self.event)
    }

    /// The stream the original event belongs to.
    pub fn original_stream_id(&self) -> &StreamId {
        &self.original_event().stream_id
    }

    /// The original event's number in its stream.
    ///
    /// This is the ordering key for single-stream subscriptions.
    pub fn original_number(&self) -> EventNumber {
        self.original_event().number
    }

    /// The original event's place in the transaction file.
    ///
    /// This is the ordering key for all-streams subscriptions.
    pub fn original_position(&self) -> Position {
        self.original_event().position
    }

    /// Returns true if this event was reached through a link.
    pub fn is_resolved(&self) -> bool {
        self.link.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
