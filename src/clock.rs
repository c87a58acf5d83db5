//! Request timestamps.
//!
//! A timestamp is the wall clock in microseconds since the unix epoch, bumped so that two calls on
//! the same clock never return the same value. Timestamps of different nodes may collide; the
//! `(timestamp, node)` pair in [`Priority`] is what orders requests.
//!
//! Timestamps seen on incoming requests are folded in as well, so a request made after granting
//! another one is always ordered after it, even when the granter's wall clock lags behind.

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Total order of requests: lower timestamp first, lower node id on ties.
///
/// Field order matters, the derived `Ord` is lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority {
    pub timestamp: Timestamp,
    pub node: NodeId,
}

impl Priority {
    pub fn new(timestamp: Timestamp, node: NodeId) -> Self {
        Self { timestamp, node }
    }
}

/// Strictly increasing local clock. Nothing is persisted; a restarted node starts over from the
/// wall clock.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Timestamp {
        let wall = wall_micros();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(wall.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        Timestamp(wall.max(previous.saturating_add(1)))
    }

    /// Records a timestamp received from a peer: every later `now()` is greater than it.
    pub fn observe(&self, seen: Timestamp) {
        self.last.fetch_max(seen.0, Ordering::AcqRel);
    }
}

fn wall_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or_default()
}
