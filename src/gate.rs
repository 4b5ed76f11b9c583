//! # Backpressure Gate
//!
//! The single chokepoint every event passes through on its way to the
//! consumer. The gate does two jobs at once:
//!
//! 1. **Monotone filter**: only events strictly beyond the last accepted
//!    position get in. Read-page overlap, stash replay and server resends
//!    all fall out of this one rule.
//! 2. **Demand accounting**: accepted events sit in a bounded buffer and
//!    leave only while the consumer has outstanding demand.
//!
//! ```text
//!             offer()                        take_deliverable()
//!  events ──▶ [ pos > last? ] ──▶ buffer ──▶ [ demand > 0? ] ──▶ consumer
//!                  │ no                            │ no
//!                  ▼                               ▼
//!               dropped                       stays buffered
//! ```
//!
//! The gate is pure state - no channels, no tasks - so the filtering and
//! demand rules are testable in isolation, and the state machine that owns
//! it stays a pure transition function.

use std::collections::VecDeque;

use crate::types::{LogPosition, ResolvedEvent};

/// Monotone position filter plus demand-bounded delivery buffer.
///
/// Owned by the subscription state machine; one per subscription.
#[derive(Debug)]
pub struct DeliveryGate<P> {
    /// Greatest position accepted so far, or the configured exclusive start.
    /// Strictly increases; events at or below it are dropped.
    last: Option<P>,

    /// Cumulative unfilled consumer demand. Saturates at `u64::MAX`,
    /// which in practice means "unbounded".
    demand: u64,

    /// Accepted events awaiting demand, in position order.
    buffer: VecDeque<ResolvedEvent>,

    /// Buffer occupancy at which the gate reports saturation.
    capacity: usize,
}

impl<P: LogPosition> DeliveryGate<P> {
    /// Creates a gate that passes only positions strictly greater than
    /// `from_exclusive` (all positions, when `None`).
    pub fn new(from_exclusive: Option<P>, capacity: usize) -> Self {
        Self {
            last: from_exclusive,
            demand: 0,
            buffer: VecDeque::new(),
            capacity,
        }
    }

    /// The greatest position accepted so far.
    pub fn last(&self) -> Option<P> {
        self.last
    }

    /// Current unfilled demand.
    pub fn demand(&self) -> u64 {
        self.demand
    }

    /// Number of accepted events waiting for demand.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing is waiting for delivery.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when the consumer has no demand and the buffer is at or past
    /// capacity - the signal to stop pulling from the server.
    ///
    /// Occupancy can overshoot `capacity` by a bounded amount (at most one
    /// read page or one stash flush) because saturation is only checked
    /// between pages, never mid-page.
    pub fn is_saturated(&self) -> bool {
        self.demand == 0 && self.buffer.len() >= self.capacity
    }

    /// Adds consumer demand.
    pub fn add_demand(&mut self, n: u64) {
        self.demand = self.demand.saturating_add(n);
    }

    /// Offers one event at `position`. Accepted (buffered, `last` advanced)
    /// only if strictly beyond the last accepted position; dropped silently
    /// otherwise.
    ///
    /// Returns whether the event was accepted.
    pub fn offer(&mut self, position: P, event: ResolvedEvent) -> bool {
        let wanted = match self.last {
            None => true,
            Some(last) => position > last,
        };
        if wanted {
            self.last = Some(position);
            self.buffer.push_back(event);
        }
        wanted
    }

    /// Pops as many buffered events as current demand allows, consuming one
    /// unit of demand per event. The caller turns these into deliveries.
    pub fn take_deliverable(&mut self) -> Vec<ResolvedEvent> {
        let mut out = Vec::new();
        while self.demand > 0 {
            match self.buffer.pop_front() {
                Some(event) => {
                    self.demand -= 1;
                    out.push(event);
                }
                None => break,
            }
        }
        out
    }

    /// Discards everything buffered. Used on cancellation; `last` and
    /// demand are left untouched since the subscription is ending anyway.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
