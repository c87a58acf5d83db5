//! Per-node arbitration state machine.
//!
//! The arbiter decides, for every incoming request, whether to answer it now or to defer it until
//! the local node has used the resource. It never performs I/O: callers hold it behind a single
//! lock, apply an event, drop the lock and only then send whatever the arbiter told them to send.
//!
//! # Invariants
//!
//! 1. **Deferred until release**: a request in the queue has not been granted yet, and it is
//!    granted exactly once, when the local node releases or withdraws.
//! 2. **Fresh count**: `received_grants` is reset to zero whenever a new request cycle begins.
//! 3. **Priority**: while wanting, a request is granted immediately iff its `(timestamp, node)`
//!    pair is smaller than the local one.

use crate::{
    clock::{Priority, Timestamp},
    NodeId,
};
use std::collections::VecDeque;

/// A request this node has deferred answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    pub requester: NodeId,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Wanting,
    Holding,
}

/// What to do with an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Grant,
    Defer,
}

#[derive(Debug, Clone)]
pub struct Arbiter {
    id: NodeId,
    nodes: u32,
    state: State,
    timestamp: Option<Timestamp>,
    received_grants: u32,
    deferred: VecDeque<RequestRecord>,
}

impl Arbiter {
    pub fn new(id: NodeId, nodes: u32) -> Self {
        Self {
            id,
            nodes,
            state: State::Idle,
            timestamp: None,
            received_grants: 0,
            deferred: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn received_grants(&self) -> u32 {
        self.received_grants
    }

    /// Grants needed before entering: one from every other node.
    pub fn needed_grants(&self) -> u32 {
        self.nodes.saturating_sub(1)
    }

    pub fn deferred(&self) -> impl Iterator<Item = &RequestRecord> {
        self.deferred.iter()
    }

    /// Idle -> wanting. Returns the priority of the new request so the caller can broadcast it.
    pub fn begin_request(&mut self, timestamp: Timestamp) -> Priority {
        self.state = State::Wanting;
        self.timestamp = Some(timestamp);
        self.received_grants = 0;
        Priority::new(timestamp, self.id)
    }

    /// Applies the priority rule to a request from `sender`.
    pub fn on_request(&mut self, sender: NodeId, timestamp: Timestamp) -> Decision {
        let decision = match (self.state, self.timestamp) {
            (State::Holding, _) => Decision::Defer,
            (State::Wanting, Some(own)) => {
                if Priority::new(timestamp, sender) < Priority::new(own, self.id) {
                    Decision::Grant
                } else {
                    Decision::Defer
                }
            }
            _ => Decision::Grant,
        };

        if decision == Decision::Defer {
            self.deferred.push_back(RequestRecord {
                requester: sender,
                timestamp,
            });
        }
        decision
    }

    /// Counts a grant. Grants are not matched against the outstanding request, so a duplicate or
    /// stale grant also counts, even while idle.
    pub fn on_grant(&mut self, _sender: NodeId) {
        self.received_grants += 1;
    }

    /// Whether a wanting node has heard from every peer.
    pub fn ready(&self) -> bool {
        self.state == State::Wanting && self.received_grants >= self.needed_grants()
    }

    /// Wanting -> holding, if every grant has arrived.
    pub fn try_enter(&mut self) -> bool {
        if self.ready() {
            self.state = State::Holding;
            true
        } else {
            false
        }
    }

    /// Holding (or an abandoned wanting) -> idle. Returns the deferred requesters in arrival order;
    /// each of them must be sent exactly one grant.
    pub fn release(&mut self) -> Vec<NodeId> {
        self.state = State::Idle;
        self.timestamp = None;
        self.deferred
            .drain(..)
            .map(|record| record.requester)
            .collect()
    }
}
