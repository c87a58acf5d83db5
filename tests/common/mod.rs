#![allow(dead_code)]

use permission_tosser::{Message, NodeId, ResourceAction, SendError, Transport};
use std::{
    error::Error,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Resource action that notices when two nodes use the resource at once.
#[derive(Default)]
pub struct Exclusive {
    holders: AtomicU32,
    max_holders: AtomicU32,
    visits: Mutex<Vec<NodeId>>,
    pub hold: Duration,
}

impl Exclusive {
    pub fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            ..Self::default()
        })
    }

    pub fn max_holders(&self) -> u32 {
        self.max_holders.load(Ordering::SeqCst)
    }

    pub fn visits(&self) -> Vec<NodeId> {
        self.visits.lock().unwrap().clone()
    }
}

impl ResourceAction for Exclusive {
    async fn perform(&self, node: NodeId) -> Result<(), Box<dyn Error + Send + Sync>> {
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_holders.fetch_max(holders, Ordering::SeqCst);
        self.visits.lock().unwrap().push(node);
        tokio::time::sleep(self.hold).await;
        self.holders.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport that only remembers what was sent, in order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<(NodeId, Message)>>>);

impl Recorder {
    pub fn sent(&self) -> Vec<(NodeId, Message)> {
        self.0.lock().unwrap().clone()
    }

    pub fn grants(&self) -> Vec<NodeId> {
        self.sent()
            .into_iter()
            .filter(|(_, message)| matches!(message, Message::Grant { .. }))
            .map(|(to, _)| to)
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl Transport for Recorder {
    async fn send(&self, to: NodeId, message: Message) -> Result<(), SendError> {
        self.0.lock().unwrap().push((to, message));
        Ok(())
    }
}

/// Polls `condition` until it holds or a second passed.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
