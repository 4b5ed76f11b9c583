//! # Error Handling for Riptide
//!
//! This module defines the error types used throughout Riptide. We use a
//! single error enum ([`Error`]) to represent all failure modes, which
//! simplifies error handling for library users.
//!
//! ## Failure Taxonomy
//!
//! Errors fall into these categories, and the subscription engine treats
//! each category differently:
//!
//! | Category | Variants | Engine behavior |
//! |----------|----------|-----------------|
//! | Absorbed | `StreamNotFound` | Treated as an empty read; the subscription keeps going |
//! | Terminal server errors | `StreamDeleted`, `AccessDenied`, `NotAuthenticated`, `ServerError` | Subscription ends with an error delivery |
//! | Transport termination | `ConnectionClosed` | Subscription ends cleanly (the cause is logged) |
//! | Local overrun | `SubscriptionOverrun` | Subscription ends with an error delivery |
//!
//! A subscription never retries or resubscribes after a terminal failure;
//! callers reconstruct a new subscription from the last delivered position.

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can surface from a subscription.
///
/// Variants carry enough context to log and to decide whether to resubscribe.
/// The enum is `Clone` + `PartialEq` so transition tables can be asserted on
/// directly in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The stream does not exist (yet).
    ///
    /// During a historical read this is not fatal: a subscription to a
    /// stream that has not been written to simply sees an empty history and
    /// waits for live events.
    #[error("stream '{stream}' was not found")]
    StreamNotFound {
        /// The stream that was read.
        stream: String,
    },

    /// The stream has been hard-deleted on the server.
    ///
    /// Unlike [`Error::StreamNotFound`], a deleted stream can never receive
    /// events again, so the subscription terminates.
    #[error("stream '{stream}' has been deleted")]
    StreamDeleted {
        /// The deleted stream.
        stream: String,
    },

    /// The configured credentials are not allowed to read the stream.
    #[error("access to stream '{stream}' was denied")]
    AccessDenied {
        /// The stream access was denied to.
        stream: String,
    },

    /// The server rejected the request's credentials outright.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// The server failed internally while serving a request.
    #[error("server error: {0}")]
    ServerError(String),

    /// The connection carrying this subscription has gone away.
    ///
    /// Surfaced to the consumer as a clean completion, not an error
    /// delivery: the subscription simply ends, and the caller may build a
    /// new one from the last delivered position once reconnected.
    #[error("connection to the event store was closed")]
    ConnectionClosed,

    /// Live events outran the subscription's buffering bound.
    ///
    /// The engine buffers live events while catching up on history and
    /// while the consumer works through earlier deliveries. Both buffers
    /// are bounded by the configured `max_buffered`; if the server pushes
    /// past that bound the subscription is dropped rather than growing
    /// without limit.
    #[error("subscription overrun: {buffered} events buffered past the configured bound")]
    SubscriptionOverrun {
        /// How many events were buffered when the bound was hit.
        buffered: usize,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
