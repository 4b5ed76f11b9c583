//! # Subscription Driver & Consumer Handle
//!
//! This module wires the pure state machine from [`crate::machine`] to the
//! outside world: a dedicated Tokio task owns the machine and its mailbox,
//! and a [`Subscription`] handle gives the consumer a demand-driven view of
//! the deliveries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            Consumer task                             │
//! │                  sub.next().await / Stream combinators               │
//! └───────────────┬────────────────────────────────────▲─────────────────┘
//!         Request(n) / Cancel                 deliveries (demand-bounded)
//!                 │                                    │
//! ┌───────────────▼────────────────────────────────────┴─────────────────┐
//! │                        Subscription driver task                      │
//! │                                                                      │
//! │   tokio::select! over consumer signals and connection inbound        │
//! │                 │                                                    │
//! │                 ▼                                                    │
//! │        CatchUpMachine::step(input) ──▶ effects                       │
//! │                                          │                           │
//! └──────────────────────────────────────────┼───────────────────────────┘
//!                               Read / SubscribeTo / Unsubscribe
//!                                           ▼
//!                                  ┌────────────────┐
//!                                  │   Connection   │
//!                                  │     actor      │
//!                                  └────────────────┘
//! ```
//!
//! All of the machine's inputs arrive on one serialized mailbox, so the
//! machine needs no locking; different subscriptions are fully independent
//! tasks.
//!
//! ## Demand
//!
//! The consumer protocol is pull-based: events are delivered only against
//! outstanding [`Subscription::request`] demand. For plain consumption the
//! handle manages a prefetch credit window itself - `next()` keeps about one
//! read batch of demand outstanding, topping up at the half-way watermark -
//! so `while let Some(event) = sub.next().await` just works. Set the
//! prefetch to zero to drive demand entirely by hand.
//!
//! The delivery channel is unbounded but its occupancy is not: the machine
//! never delivers past the demand the consumer has signalled.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::connection::{
    AllTarget, ConnectionHandle, Inbound, StreamTarget, SubscriptionTarget,
};
use crate::error::Result;
use crate::machine::{CatchUpMachine, Effect, Input, PhaseKind, SubscriptionSettings};
use crate::types::{EventNumber, LogPosition, Position, ResolvedEvent, StreamId};

// =============================================================================
// Phase Flag
// =============================================================================

// Shared between the driver task and the handle; AtomicU8 because the handle
// only ever wants a coarse answer.
const PHASE_SYNCING: u8 = 0;
const PHASE_LIVE: u8 = 1;
const PHASE_STOPPED: u8 = 2;

fn phase_flag(kind: PhaseKind) -> u8 {
    match kind {
        PhaseKind::Live => PHASE_LIVE,
        PhaseKind::Stopped => PHASE_STOPPED,
        _ => PHASE_SYNCING,
    }
}

// =============================================================================
// Consumer Signals
// =============================================================================

/// Demand and cancellation signals from the handle to the driver.
enum ConsumerSignal {
    /// Additive demand for `n` more deliveries.
    Request(u64),
    /// Terminal withdrawal.
    Cancel,
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// The consumer's end of a catch-up subscription.
///
/// Yields events in strictly increasing position order, first from history,
/// then live, with no gaps and no duplicates in between. The subscription
/// ends with `None` after a clean completion (end of stream in non-follow
/// mode, server unsubscribe, connection loss, cancellation) or with a single
/// `Some(Err(_))` before `None` when it fails.
///
/// # Example
///
/// ```rust,ignore
/// use riptide::{subscribe_to_stream, SubscriptionSettings};
///
/// let mut sub = subscribe_to_stream(
///     connection,
///     inbound_rx,
///     "orders-1042",
///     None,
///     SubscriptionSettings::default(),
/// );
///
/// while let Some(result) = sub.next().await {
///     let event = result?;
///     println!("{}: {:?}", event.original_number(), event.event.event_type);
/// }
/// ```
///
/// Dropping the handle cancels the subscription.
pub struct Subscription<P> {
    deliveries: mpsc::UnboundedReceiver<Result<ResolvedEvent>>,
    signals: mpsc::UnboundedSender<ConsumerSignal>,
    phase: Arc<AtomicU8>,

    /// Position accessor for this subscription's addressing scheme.
    position_of: fn(&ResolvedEvent) -> P,

    /// Demand signalled but not yet consumed by a delivery.
    credit: u64,

    /// Auto-managed demand window; zero disables automatic requests.
    prefetch: u32,

    /// Position of the most recent delivery taken from this handle.
    last_delivered: Option<P>,
}

/// A subscription to a single stream, ordered by [`EventNumber`].
pub type StreamSubscription = Subscription<EventNumber>;

/// A subscription to the all-streams feed, ordered by [`Position`].
pub type AllSubscription = Subscription<Position>;

impl<P: LogPosition> Subscription<P> {
    /// Replaces the automatic demand window.
    ///
    /// With a prefetch of zero the handle never requests on its own; all
    /// demand comes from explicit [`Subscription::request`] calls. Useful
    /// for consumers that meter their intake precisely.
    pub fn with_prefetch(mut self, prefetch: u32) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Signals demand for `n` more deliveries. Demand accumulates.
    pub fn request(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        self.credit = self.credit.saturating_add(n);
        // A closed driver just means the subscription already ended.
        let _ = self.signals.send(ConsumerSignal::Request(n));
    }

    /// Cancels the subscription. The driver tears down the server side and
    /// the delivery channel finishes with a clean `None`.
    pub fn cancel(&mut self) {
        let _ = self.signals.send(ConsumerSignal::Cancel);
    }

    /// Receives the next delivery.
    ///
    /// Tops up the prefetch window as needed, so looping on `next()` is all
    /// a typical consumer does.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(event))` - the next event in position order
    /// - `Some(Err(e))` - the subscription failed; `None` follows
    /// - `None` - the subscription ended
    pub async fn next(&mut self) -> Option<Result<ResolvedEvent>> {
        self.top_up();
        let item = self.deliveries.recv().await;
        self.note_delivery(&item);
        item
    }

    /// The position of the most recent event taken from this handle.
    ///
    /// This is the place to resume from when building a replacement
    /// subscription after completion or failure.
    pub fn last_delivered(&self) -> Option<P> {
        self.last_delivered
    }

    /// True while the subscription is past catch-up and delivering pushed
    /// events as they arrive.
    pub fn is_live(&self) -> bool {
        self.phase.load(Ordering::Acquire) == PHASE_LIVE
    }

    /// True once the subscription has ended, cleanly or not.
    pub fn is_stopped(&self) -> bool {
        self.phase.load(Ordering::Acquire) == PHASE_STOPPED
    }

    fn top_up(&mut self) {
        if self.prefetch == 0 {
            return;
        }
        let window = u64::from(self.prefetch);
        if self.credit <= window / 2 {
            let add = window - self.credit;
            self.credit += add;
            let _ = self.signals.send(ConsumerSignal::Request(add));
        }
    }

    fn note_delivery(&mut self, item: &Option<Result<ResolvedEvent>>) {
        if let Some(Ok(event)) = item {
            self.credit = self.credit.saturating_sub(1);
            self.last_delivered = Some((self.position_of)(event));
        }
    }
}

impl<P> Unpin for Subscription<P> {}

impl<P: LogPosition> Stream for Subscription<P> {
    type Item = Result<ResolvedEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.top_up();
        match this.deliveries.poll_recv(cx) {
            Poll::Ready(item) => {
                this.note_delivery(&item);
                Poll::Ready(item)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<P> Drop for Subscription<P> {
    fn drop(&mut self) {
        // The channel closing right after would cancel too; the explicit
        // signal just makes the intent unambiguous.
        let _ = self.signals.send(ConsumerSignal::Cancel);
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Subscribes to a single stream, catching up from `from_exclusive`.
///
/// # Arguments
///
/// * `connection` - sending handle onto the connection actor
/// * `inbound` - this subscription's routed slice of the transport inbox;
///   the channel closing is read as connection loss
/// * `stream` - the stream to follow
/// * `from_exclusive` - deliver only events numbered strictly after this;
///   `None` starts from the beginning, `Some(EventNumber::END)` skips
///   history and goes straight to live events
/// * `settings` - batching, credentials, follow mode
///
/// Must be called from within a Tokio runtime; the driver task is spawned
/// immediately.
pub fn subscribe_to_stream(
    connection: ConnectionHandle,
    inbound: mpsc::UnboundedReceiver<Inbound<EventNumber>>,
    stream: impl Into<StreamId>,
    from_exclusive: Option<EventNumber>,
    settings: SubscriptionSettings,
) -> StreamSubscription {
    spawn_subscription(
        StreamTarget::new(stream),
        connection,
        inbound,
        from_exclusive,
        settings,
        |event| event.original_number(),
    )
}

/// Subscribes to the all-streams feed, catching up from `from_exclusive`.
///
/// Same contract as [`subscribe_to_stream`], with positions drawn from the
/// store-wide transaction file.
pub fn subscribe_to_all(
    connection: ConnectionHandle,
    inbound: mpsc::UnboundedReceiver<Inbound<Position>>,
    from_exclusive: Option<Position>,
    settings: SubscriptionSettings,
) -> AllSubscription {
    spawn_subscription(
        AllTarget::new(),
        connection,
        inbound,
        from_exclusive,
        settings,
        |event| event.original_position(),
    )
}

fn spawn_subscription<T: SubscriptionTarget>(
    target: T,
    connection: ConnectionHandle,
    inbound: mpsc::UnboundedReceiver<Inbound<T::Pos>>,
    from_exclusive: Option<T::Pos>,
    settings: SubscriptionSettings,
    position_of: fn(&ResolvedEvent) -> T::Pos,
) -> Subscription<T::Pos> {
    let prefetch = settings.read_batch_size;
    let (machine, initial_effects) = CatchUpMachine::new(target, from_exclusive, settings);

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
    let phase = Arc::new(AtomicU8::new(phase_flag(machine.phase())));

    tokio::spawn(run_driver(
        machine,
        initial_effects,
        connection,
        inbound,
        signal_rx,
        delivery_tx,
        Arc::clone(&phase),
    ));

    Subscription {
        deliveries: delivery_rx,
        signals: signal_tx,
        phase,
        position_of,
        credit: 0,
        prefetch,
        last_delivered: None,
    }
}

// =============================================================================
// Driver
// =============================================================================

/// The subscription's mailbox loop: one task per subscription, owning the
/// machine and serializing every input through it.
async fn run_driver<T: SubscriptionTarget>(
    mut machine: CatchUpMachine<T>,
    initial_effects: Vec<Effect>,
    connection: ConnectionHandle,
    mut inbound: mpsc::UnboundedReceiver<Inbound<T::Pos>>,
    mut signals: mpsc::UnboundedReceiver<ConsumerSignal>,
    deliveries: mpsc::UnboundedSender<Result<ResolvedEvent>>,
    phase: Arc<AtomicU8>,
) {
    let mut effects = initial_effects;
    loop {
        let send_failed = apply_effects(effects, &connection, &deliveries).await;
        phase.store(phase_flag(machine.phase()), Ordering::Release);

        if machine.is_terminal() {
            break;
        }
        if send_failed {
            // The connection actor is gone; the machine completes cleanly.
            effects = machine.step(Input::ConnectionLost);
            continue;
        }

        let input = tokio::select! {
            biased;
            signal = signals.recv() => match signal {
                Some(ConsumerSignal::Request(n)) => Input::Request(n),
                // A dropped handle withdraws like an explicit cancel.
                Some(ConsumerSignal::Cancel) | None => Input::Cancel,
            },
            message = inbound.recv() => match message {
                Some(message) => Input::Server(message),
                None => Input::ConnectionLost,
            },
        };
        effects = machine.step(input);
    }

    tracing::debug!("subscription driver stopped");
    // Dropping `deliveries` here finishes the consumer's stream.
}

/// Applies one transition's effects in order. Returns true if an outbound
/// send failed, which the caller turns into a `ConnectionLost` input.
async fn apply_effects(
    effects: Vec<Effect>,
    connection: &ConnectionHandle,
    deliveries: &mpsc::UnboundedSender<Result<ResolvedEvent>>,
) -> bool {
    let mut send_failed = false;
    for effect in effects {
        match effect {
            Effect::Send(request) => {
                if !send_failed && connection.send(request).await.is_err() {
                    send_failed = true;
                }
            }
            Effect::Deliver(event) => {
                // A dropped handle is handled via the signal channel.
                let _ = deliveries.send(Ok(event));
            }
            Effect::Complete => {
                // Completion is the delivery channel closing; nothing to send.
            }
            Effect::Abort(error) => {
                let _ = deliveries.send(Err(error));
            }
        }
    }
    send_failed
}

// =============================================================================
// Tests
// =============================================================================
