//! # Catch-Up Subscription State Machine
//!
//! This module implements the core of Riptide: the state machine that
//! reconciles a paginated historical read with a live server push into one
//! gap-free, strictly increasing event sequence.
//!
//! ## The Catch-Up + Live Pattern
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        Subscription Timeline                             │
//! │                                                                          │
//! │  start                    subscribe            meeting point             │
//! │    │                          │                      │                   │
//! │    ▼                          ▼                      ▼                   │
//! │  ┌─────────────────────────┐┌──────────────────────┐┌─────────────────┐  │
//! │  │ Reading                 ││ CatchingUp           ││ Live            │  │
//! │  │ page through history    ││ keep paging history; ││ deliver pushed  │  │
//! │  │ one read at a time      ││ stash pushed events  ││ events directly │  │
//! │  └─────────────────────────┘└──────────────────────┘└─────────────────┘  │
//! │                                                                          │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hard part is the handoff. Between "history is drained" and "the push
//! channel is confirmed" the server keeps appending, so the machine subscribes
//! first, then keeps paging history while *stashing* everything the server
//! pushes. The first page that is empty or reaches past the position the
//! server reported at subscribe time is the **meeting point**: the stash is
//! replayed through the same monotone filter as everything else, and the
//! machine goes live. The filter makes the handoff safe - an event seen both
//! in a page and in the stash passes exactly once.
//!
//! ## Pure Transitions
//!
//! The machine is a mailbox-serialized state machine expressed as data: every
//! input produces `(new state, effects)` with no I/O of its own. The driver
//! in [`crate::subscription`] owns the channels and applies the effects. This
//! keeps every transition table directly testable as a plain function call.
//!
//! ## Backpressure
//!
//! Events leave through a demand gate ([`crate::gate::DeliveryGate`]): the
//! consumer requests `n` events at a time and nothing is delivered past that.
//! When demand is exhausted *and* the buffer is full, the machine stops
//! pulling: it abandons the in-flight pagination (or unsubscribes from live
//! push) and drains what it has as demand returns, then completes. The caller
//! resumes from the last delivered position with a fresh subscription.

use std::collections::VecDeque;
use std::mem;

use crate::connection::{Inbound, Outbound, SubscriptionTarget};
use crate::error::Error;
use crate::gate::DeliveryGate;
use crate::types::{Credentials, LogPosition, ResolvedEvent};

// =============================================================================
// Configuration
// =============================================================================

/// Default number of events per historical read page.
pub const DEFAULT_READ_BATCH_SIZE: u32 = 500;

/// Default bound on buffered events (delivery buffer and catch-up stash).
pub const DEFAULT_MAX_BUFFERED: usize = 10_000;

/// Immutable subscription configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    /// Resolve link events in projected streams.
    pub resolve_link_tos: bool,

    /// Credentials attached to every outbound request.
    pub credentials: Option<Credentials>,

    /// Events per historical read page. Must be greater than zero.
    pub read_batch_size: u32,

    /// True: transition into live push when history is drained.
    /// False: complete at end of stream without ever subscribing.
    pub follow: bool,

    /// Bound on the delivery buffer and the catch-up stash.
    ///
    /// The buffer pausing the server side kicks in at this occupancy; a
    /// stash growing past it drops the subscription with
    /// [`Error::SubscriptionOverrun`].
    pub max_buffered: usize,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            resolve_link_tos: false,
            credentials: None,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            follow: true,
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }
}

// =============================================================================
// Inputs and Effects
// =============================================================================

/// Everything that can arrive on the machine's mailbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Input<P> {
    /// A response or notification from the connection.
    Server(Inbound<P>),

    /// The connection's inbound channel closed: the transport peer is gone.
    ConnectionLost,

    /// The consumer requests `n` more deliveries.
    Request(u64),

    /// The consumer withdraws; terminal.
    Cancel,
}

/// An instruction to the I/O driver, produced by a transition.
///
/// Effects are applied in order. `Complete` and `Abort` are each emitted at
/// most once per machine, as the last effect it ever produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a request through the connection port.
    Send(Outbound),

    /// Deliver one event to the consumer.
    Deliver(ResolvedEvent),

    /// Signal clean completion to the consumer. Terminal.
    Complete,

    /// Signal failure to the consumer. Terminal.
    Abort(Error),
}

// =============================================================================
// Phases
// =============================================================================

/// The machine's current phase, with phase-local state.
enum Phase<P> {
    /// Paging through history; one read in flight.
    Reading { next: P },

    /// History drained; waiting for the push channel to be confirmed.
    Subscribing { next: P },

    /// Started from `END`: no history at all, waiting for confirmation.
    SubscribingFromEnd,

    /// Push channel live but history not yet caught up to it; one read in
    /// flight, pushed events are stashed.
    CatchingUp {
        next: P,
        /// The server's last committed position at subscribe time.
        live_edge: P,
        /// Pushed events held back until the meeting point, arrival order.
        stash: VecDeque<ResolvedEvent>,
    },

    /// Caught up; pushed events flow straight through the gate.
    Live,

    /// No longer pulling from the server; delivering the remaining buffer
    /// as demand returns, then completing.
    Draining,

    /// Terminal. All further inputs are ignored.
    Stopped,
}

/// A phase name without its state, for observation and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Paging through history.
    Reading,
    /// Waiting for subscription confirmation after draining history.
    Subscribing,
    /// Waiting for subscription confirmation, live-only start.
    SubscribingFromEnd,
    /// Bridging history and stashed live events.
    CatchingUp,
    /// Delivering live events.
    Live,
    /// Draining buffered deliveries before completing.
    Draining,
    /// Terminal.
    Stopped,
}

// =============================================================================
// The Machine
// =============================================================================

/// The catch-up subscription state machine, generic over its target.
///
/// Construct with [`CatchUpMachine::new`], then feed every mailbox message
/// through [`CatchUpMachine::step`] and apply the returned effects in order.
/// Once [`CatchUpMachine::is_terminal`] returns true the machine is inert.
pub struct CatchUpMachine<T: SubscriptionTarget> {
    target: T,
    settings: SubscriptionSettings,
    phase: Phase<T::Pos>,
    gate: DeliveryGate<T::Pos>,
}

impl<T: SubscriptionTarget> CatchUpMachine<T> {
    /// Creates the machine and returns its initial effects.
    ///
    /// The starting point is exclusive: `None` reads from the beginning,
    /// `Some(p)` delivers only positions strictly greater than `p`, and
    /// `Some(P::END)` skips history entirely (completing immediately when
    /// `follow` is false, since there is nothing to read and nothing to
    /// follow).
    ///
    /// # Panics
    ///
    /// Panics if `settings.read_batch_size` is zero.
    pub fn new(
        target: T,
        from_exclusive: Option<T::Pos>,
        settings: SubscriptionSettings,
    ) -> (Self, Vec<Effect>) {
        assert!(
            settings.read_batch_size > 0,
            "read_batch_size must be greater than zero"
        );

        let from_end = from_exclusive.map(|p| p.is_end()).unwrap_or(false);
        // The END sentinel is not a real position; the gate starts unfloored
        // and the server only pushes events appended after subscribing.
        let floor = from_exclusive.filter(|p| !p.is_end());
        let gate = DeliveryGate::new(floor, settings.max_buffered);

        let mut machine = Self {
            target,
            settings,
            phase: Phase::Stopped,
            gate,
        };

        let mut effects = Vec::new();
        if from_end {
            if machine.settings.follow {
                effects.push(machine.subscribe_request());
                machine.phase = Phase::SubscribingFromEnd;
            } else {
                effects.push(Effect::Complete);
            }
        } else {
            let next = floor.unwrap_or(T::Pos::FIRST);
            effects.push(machine.read_request(next));
            machine.phase = Phase::Reading { next };
        }

        (machine, effects)
    }

    /// The current phase.
    pub fn phase(&self) -> PhaseKind {
        match self.phase {
            Phase::Reading { .. } => PhaseKind::Reading,
            Phase::Subscribing { .. } => PhaseKind::Subscribing,
            Phase::SubscribingFromEnd => PhaseKind::SubscribingFromEnd,
            Phase::CatchingUp { .. } => PhaseKind::CatchingUp,
            Phase::Live => PhaseKind::Live,
            Phase::Draining => PhaseKind::Draining,
            Phase::Stopped => PhaseKind::Stopped,
        }
    }

    /// The greatest position accepted for delivery so far.
    pub fn last_accepted(&self) -> Option<T::Pos> {
        self.gate.last()
    }

    /// True once the machine has completed or aborted.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Stopped)
    }

    /// Processes one mailbox message and returns the effects to apply.
    pub fn step(&mut self, input: Input<T::Pos>) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        match input {
            Input::Cancel => self.on_cancel(&mut effects),
            Input::ConnectionLost => {
                tracing::debug!(
                    target_stream = %self.target.describe(),
                    "connection lost, completing subscription"
                );
                self.complete(&mut effects);
            }
            Input::Request(n) => self.on_request(n, &mut effects),
            Input::Server(message) => self.on_server(message, &mut effects),
        }
        effects
    }

    // -------------------------------------------------------------------------
    // Consumer inputs
    // -------------------------------------------------------------------------

    fn on_cancel(&mut self, effects: &mut Vec<Effect>) {
        // A push channel may be open (or opening); tear it down politely.
        if matches!(
            self.phase,
            Phase::Subscribing { .. }
                | Phase::SubscribingFromEnd
                | Phase::CatchingUp { .. }
                | Phase::Live
        ) {
            effects.push(self.unsubscribe_request());
        }
        self.gate.clear();
        self.complete(effects);
    }

    fn on_request(&mut self, n: u64, effects: &mut Vec<Effect>) {
        self.gate.add_demand(n);
        self.drain_gate(effects);
        if matches!(self.phase, Phase::Draining) && self.gate.is_empty() {
            self.complete(effects);
        }
    }

    // -------------------------------------------------------------------------
    // Server inputs
    // -------------------------------------------------------------------------

    fn on_server(&mut self, message: Inbound<T::Pos>, effects: &mut Vec<Effect>) {
        let phase = mem::replace(&mut self.phase, Phase::Stopped);
        match phase {
            Phase::Reading { next } => self.reading(next, message, effects),
            Phase::Subscribing { next } => self.subscribing(next, message, effects),
            Phase::SubscribingFromEnd => self.subscribing_from_end(message, effects),
            Phase::CatchingUp {
                next,
                live_edge,
                stash,
            } => self.catching_up(next, live_edge, stash, message, effects),
            Phase::Live => self.live(message, effects),
            Phase::Draining => self.draining(message, effects),
            Phase::Stopped => unreachable!("step() guards the terminal phase"),
        }
    }

    fn reading(&mut self, next: T::Pos, message: Inbound<T::Pos>, effects: &mut Vec<Effect>) {
        match message {
            Inbound::ReadCompleted {
                events,
                next: next_page,
                end_of_stream,
            } => {
                self.offer(events, effects);
                if end_of_stream {
                    self.finish_history(next_page, effects);
                } else if self.gate.is_saturated() {
                    tracing::debug!(
                        target_stream = %self.target.describe(),
                        buffered = self.gate.buffered(),
                        "consumer saturated, pausing historical read"
                    );
                    self.phase = Phase::Draining;
                } else {
                    effects.push(self.read_request(next_page));
                    self.phase = Phase::Reading { next: next_page };
                }
            }
            // An absent stream reads as an empty, fully drained history.
            Inbound::Failed(Error::StreamNotFound { .. }) => {
                self.finish_history(next, effects);
            }
            Inbound::Failed(error) => self.abort(error, effects),
            Inbound::Unsubscribed => self.complete(effects),
            other => {
                tracing::warn!(
                    target_stream = %self.target.describe(),
                    message = ?message_kind(&other),
                    "unexpected message while reading, dropped"
                );
                self.phase = Phase::Reading { next };
            }
        }
    }

    fn subscribing(&mut self, next: T::Pos, message: Inbound<T::Pos>, effects: &mut Vec<Effect>) {
        match message {
            Inbound::SubscribeCompleted { last_position } => {
                let caught_up = self
                    .gate
                    .last()
                    .map(|last| last_position <= last)
                    .unwrap_or(false);
                if caught_up {
                    tracing::debug!(
                        target_stream = %self.target.describe(),
                        live_edge = %last_position,
                        "subscription confirmed at or behind delivered history, going live"
                    );
                    self.phase = Phase::Live;
                } else {
                    tracing::debug!(
                        target_stream = %self.target.describe(),
                        live_edge = %last_position,
                        "subscription confirmed ahead of history, catching up"
                    );
                    effects.push(self.read_request(next));
                    self.phase = Phase::CatchingUp {
                        next,
                        live_edge: last_position,
                        stash: VecDeque::new(),
                    };
                }
            }
            Inbound::Unsubscribed => self.complete(effects),
            Inbound::Failed(error) => self.abort(error, effects),
            other => {
                tracing::warn!(
                    target_stream = %self.target.describe(),
                    message = ?message_kind(&other),
                    "unexpected message while subscribing, dropped"
                );
                self.phase = Phase::Subscribing { next };
            }
        }
    }

    fn subscribing_from_end(&mut self, message: Inbound<T::Pos>, effects: &mut Vec<Effect>) {
        match message {
            Inbound::SubscribeCompleted { .. } => {
                // Nothing to catch up with: only events appended from now on
                // will be pushed, and the gate has no floor to enforce.
                self.phase = Phase::Live;
            }
            Inbound::Unsubscribed => self.complete(effects),
            Inbound::Failed(error) => self.abort(error, effects),
            other => {
                tracing::warn!(
                    target_stream = %self.target.describe(),
                    message = ?message_kind(&other),
                    "unexpected message while subscribing from end, dropped"
                );
                self.phase = Phase::SubscribingFromEnd;
            }
        }
    }

    fn catching_up(
        &mut self,
        next: T::Pos,
        live_edge: T::Pos,
        mut stash: VecDeque<ResolvedEvent>,
        message: Inbound<T::Pos>,
        effects: &mut Vec<Effect>,
    ) {
        match message {
            Inbound::EventAppeared(event) => {
                if stash.len() >= self.settings.max_buffered {
                    tracing::warn!(
                        target_stream = %self.target.describe(),
                        stashed = stash.len(),
                        "live events outran the catch-up stash bound"
                    );
                    self.abort(
                        Error::SubscriptionOverrun {
                            buffered: stash.len(),
                        },
                        effects,
                    );
                    return;
                }
                stash.push_back(event);
                self.phase = Phase::CatchingUp {
                    next,
                    live_edge,
                    stash,
                };
            }
            Inbound::ReadCompleted {
                events,
                next: next_page,
                ..
            } => {
                // Met when the page is empty or reaches past the position the
                // server reported at subscribe time.
                let met = events.is_empty()
                    || events
                        .iter()
                        .any(|event| self.target.position(event) > live_edge);
                self.offer(events, effects);
                if met {
                    self.go_live(stash, effects);
                } else if self.gate.is_saturated() {
                    tracing::debug!(
                        target_stream = %self.target.describe(),
                        buffered = self.gate.buffered(),
                        "consumer saturated during catch-up, unsubscribing"
                    );
                    effects.push(self.unsubscribe_request());
                    self.phase = Phase::Draining;
                } else {
                    effects.push(self.read_request(next_page));
                    self.phase = Phase::CatchingUp {
                        next: next_page,
                        live_edge,
                        stash,
                    };
                }
            }
            // The stream vanished under the read: history is as drained as it
            // will ever be, so the stash is all that remains.
            Inbound::Failed(Error::StreamNotFound { .. }) => {
                self.go_live(stash, effects);
            }
            Inbound::Failed(error) => self.abort(error, effects),
            Inbound::Unsubscribed => self.complete(effects),
            // A duplicate confirmation must not restart the catch-up read.
            Inbound::SubscribeCompleted { .. } => {
                tracing::debug!(
                    target_stream = %self.target.describe(),
                    "duplicate subscription confirmation ignored"
                );
                self.phase = Phase::CatchingUp {
                    next,
                    live_edge,
                    stash,
                };
            }
        }
    }

    fn live(&mut self, message: Inbound<T::Pos>, effects: &mut Vec<Effect>) {
        match message {
            Inbound::EventAppeared(event) => {
                let position = self.target.position(&event);
                self.gate.offer(position, event);
                self.drain_gate(effects);
                if self.gate.is_saturated() {
                    tracing::debug!(
                        target_stream = %self.target.describe(),
                        buffered = self.gate.buffered(),
                        "consumer saturated while live, unsubscribing"
                    );
                    effects.push(self.unsubscribe_request());
                    self.phase = Phase::Draining;
                } else {
                    self.phase = Phase::Live;
                }
            }
            Inbound::Unsubscribed => self.complete(effects),
            Inbound::Failed(error) => self.abort(error, effects),
            // Duplicate confirmations and stale read pages are no-ops here;
            // the gate already guards against any replay they could cause.
            Inbound::SubscribeCompleted { .. } | Inbound::ReadCompleted { .. } => {
                self.phase = Phase::Live;
            }
        }
    }

    fn draining(&mut self, message: Inbound<T::Pos>, effects: &mut Vec<Effect>) {
        match message {
            // The pipeline is shutting down; late pushes, the unsubscribe
            // acknowledgement and stale pages are absorbed silently.
            Inbound::EventAppeared(_)
            | Inbound::Unsubscribed
            | Inbound::SubscribeCompleted { .. }
            | Inbound::ReadCompleted { .. } => {
                self.phase = Phase::Draining;
            }
            Inbound::Failed(error) => self.abort(error, effects),
        }
    }

    // -------------------------------------------------------------------------
    // Shared transitions
    // -------------------------------------------------------------------------

    /// History fully read. Either hand over to the live push channel or, in
    /// finite mode, finish once the buffer is handed out.
    fn finish_history(&mut self, next: T::Pos, effects: &mut Vec<Effect>) {
        if self.settings.follow {
            effects.push(self.subscribe_request());
            self.phase = Phase::Subscribing { next };
        } else if self.gate.is_empty() {
            self.complete(effects);
        } else {
            self.phase = Phase::Draining;
        }
    }

    /// The meeting point: replay the stash through the gate and go live.
    fn go_live(&mut self, stash: VecDeque<ResolvedEvent>, effects: &mut Vec<Effect>) {
        tracing::debug!(
            target_stream = %self.target.describe(),
            stashed = stash.len(),
            "caught up with the live edge"
        );
        self.offer(stash, effects);
        self.phase = Phase::Live;
    }

    /// Runs events through the monotone gate and emits what demand allows.
    fn offer(
        &mut self,
        events: impl IntoIterator<Item = ResolvedEvent>,
        effects: &mut Vec<Effect>,
    ) {
        for event in events {
            let position = self.target.position(&event);
            self.gate.offer(position, event);
        }
        self.drain_gate(effects);
    }

    fn drain_gate(&mut self, effects: &mut Vec<Effect>) {
        effects.extend(self.gate.take_deliverable().into_iter().map(Effect::Deliver));
    }

    fn complete(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::Complete);
        self.phase = Phase::Stopped;
    }

    fn abort(&mut self, error: Error, effects: &mut Vec<Effect>) {
        tracing::debug!(
            target_stream = %self.target.describe(),
            error = %error,
            "subscription failed"
        );
        self.gate.clear();
        effects.push(Effect::Abort(error));
        self.phase = Phase::Stopped;
    }

    // -------------------------------------------------------------------------
    // Request builders
    // -------------------------------------------------------------------------

    fn read_request(&self, from: T::Pos) -> Effect {
        Effect::Send(self.target.read_request(
            from,
            self.settings.read_batch_size,
            self.settings.resolve_link_tos,
            self.settings.credentials.clone(),
        ))
    }

    fn subscribe_request(&self) -> Effect {
        Effect::Send(
            self.target
                .subscribe_request(self.settings.resolve_link_tos, self.settings.credentials.clone()),
        )
    }

    fn unsubscribe_request(&self) -> Effect {
        Effect::Send(Outbound::Unsubscribe {
            credentials: self.settings.credentials.clone(),
        })
    }
}

/// A short tag for log lines about dropped messages.
fn message_kind<P>(message: &Inbound<P>) -> &'static str {
    match message {
        Inbound::ReadCompleted { .. } => "ReadCompleted",
        Inbound::SubscribeCompleted { .. } => "SubscribeCompleted",
        Inbound::EventAppeared(_) => "EventAppeared",
        Inbound::Unsubscribed => "Unsubscribed",
        Inbound::Failed(_) => "Failed",
    }
}

// =============================================================================
// Tests
// =============================================================================
