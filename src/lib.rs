//! # Riptide - Catch-Up Subscription Engine
//!
//! Riptide is a client-side subscription engine for remote append-only event
//! stores. Given a single named stream or the store-wide "all-streams" feed,
//! it delivers events to a consumer as one gap-free, strictly increasing
//! sequence starting at a caller-chosen position - reading history in pages,
//! then switching seamlessly to live server push, while honoring consumer
//! backpressure throughout.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Consumer                                │
//! │          (request / cancel, next() or Stream combinators)       │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Subscription driver task                      │
//! │           (one per subscription, mailbox-serialized)            │
//! │                                                                 │
//! │  ┌──────────────┐  ┌────────────────┐  ┌─────────────────────┐  │
//! │  │  Catch-up    │  │  Backpressure  │  │  Monotone position  │  │
//! │  │   machine    │  │     gate       │  │      filter         │  │
//! │  └──────────────┘  └────────────────┘  └─────────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Connection actor                            │
//! │        (framing, correlation - outside this crate)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! These invariants hold for every subscription and are enforced throughout
//! the codebase:
//!
//! 1. **Strict order**: positions delivered to the consumer strictly increase
//! 2. **Exclusive start**: no event at or before the starting position is
//!    ever delivered
//! 3. **Demand-bounded**: no event is delivered while consumer demand is zero
//! 4. **One in flight**: at most one outstanding read and one active
//!    subscription per instance
//! 5. **One ending**: exactly one of completion or error terminates a
//!    subscription, and nothing follows it
//!
//! ## Module Organization
//!
//! - [`error`]: the crate-wide error enum and failure taxonomy
//! - [`types`]: positions, streams, events, credentials
//! - [`connection`]: the message contract with the connection actor
//! - [`gate`]: the monotone filter and demand accounting
//! - [`machine`]: the pure catch-up state machine
//! - [`subscription`]: the driver task and the consumer handle

/// Error types for subscription failures.
///
/// A single error enum covers the whole failure taxonomy: absorbable read
/// failures, terminal server errors, transport termination, and local
/// overrun.
pub mod error;

/// Domain types: positions, streams, events, credentials.
///
/// Defines the two position schemes (per-stream [`types::EventNumber`],
/// store-wide [`types::Position`]) and the [`types::LogPosition`] total
/// order the engine is generic over. Uses the newtype pattern for type
/// safety.
pub mod types;

/// The connection port: the engine's boundary with the transport.
///
/// Outbound and inbound message enums, the sending handle, and the
/// [`connection::SubscriptionTarget`] trait that abstracts over single-stream
/// and all-streams addressing.
pub mod connection;

/// The backpressure gate.
///
/// One chokepoint for every delivery: a monotone position filter fused with
/// a bounded buffer and a saturating demand counter.
pub mod gate;

/// The catch-up subscription state machine.
///
/// The core of Riptide: a pure, mailbox-serialized state machine that
/// reconciles paginated historical reads with live push notifications.
/// Phases: reading, subscribing, catching up, live, draining. Every
/// transition is a plain function call, directly testable.
pub mod machine;

/// Subscription driver and consumer handle.
///
/// Spawns one Tokio task per subscription to own the machine and its
/// mailbox, and hands the consumer a demand-driven [`subscription::Subscription`]
/// handle implementing `futures::Stream`.
pub mod subscription;

// =============================================================================
// Re-exports
// =============================================================================
// Users can write `use riptide::Subscription` instead of reaching into the
// module tree for the common surface.

pub use error::{Error, Result};

pub use types::{
    Credentials, EventNumber, LogPosition, Position, RecordedEvent, ResolvedEvent, StreamId,
};

pub use connection::{
    AllTarget, ConnectionHandle, Inbound, Outbound, StreamTarget, SubscriptionTarget,
};

pub use machine::{
    CatchUpMachine, Effect, Input, PhaseKind, SubscriptionSettings, DEFAULT_MAX_BUFFERED,
    DEFAULT_READ_BATCH_SIZE,
};

pub use subscription::{
    subscribe_to_all, subscribe_to_stream, AllSubscription, StreamSubscription, Subscription,
};
