//! Point-to-point delivery between nodes.
//!
//! [`Transport`] is what a node needs from the network: hand one message to one peer. The TCP
//! implementation is [`crate::messenger::Messenger`]; [`LocalMesh`] connects nodes of the same
//! process through channels.

use crate::{error::SendError, message::Message, NodeId};
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    RwLock,
};

pub trait Transport: Send + Sync + 'static {
    /// Delivers `message` to node `to`. Errors are final: any retrying already happened.
    fn send(&self, to: NodeId, message: Message)
        -> impl Future<Output = Result<(), SendError>> + Send;
}

#[derive(Default)]
struct Mesh {
    inboxes: HashMap<NodeId, UnboundedSender<Message>>,
    disconnected: HashSet<NodeId>,
}

/// In-process network: every registered node gets an inbox, every endpoint can post to any inbox.
#[derive(Clone, Default)]
pub struct LocalMesh(Arc<RwLock<Mesh>>);

impl LocalMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the inbox of `node`. Registering a node twice replaces its inbox.
    pub async fn register(&self, node: NodeId) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.0.write().await.inboxes.insert(node, tx);
        rx
    }

    pub fn endpoint(&self) -> MeshEndpoint {
        MeshEndpoint(self.clone())
    }

    /// Makes every delivery to `node` fail until [`LocalMesh::reconnect`] is called.
    pub async fn disconnect(&self, node: NodeId) {
        self.0.write().await.disconnected.insert(node);
    }

    pub async fn reconnect(&self, node: NodeId) {
        self.0.write().await.disconnected.remove(&node);
    }
}

/// Sending half of a [`LocalMesh`].
#[derive(Clone)]
pub struct MeshEndpoint(LocalMesh);

impl Transport for MeshEndpoint {
    async fn send(&self, to: NodeId, message: Message) -> Result<(), SendError> {
        let mesh = (self.0).0.read().await;
        if mesh.disconnected.contains(&to) {
            return Err(SendError::Unreachable { node: to, attempts: 1 });
        }
        let inbox = mesh.inboxes.get(&to).ok_or(SendError::UnknownPeer(to))?;
        inbox
            .send(message)
            .map_err(|_| SendError::Unreachable { node: to, attempts: 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_the_registered_inbox() {
        let mesh = LocalMesh::new();
        let mut inbox = mesh.register(2).await;
        mesh.endpoint().send(2, Message::grant(1)).await.unwrap();
        assert_eq!(inbox.recv().await, Some(Message::grant(1)));
    }

    #[tokio::test]
    async fn unknown_and_disconnected_peers_fail() {
        let mesh = LocalMesh::new();
        let _inbox = mesh.register(2).await;
        let endpoint = mesh.endpoint();

        assert!(matches!(
            endpoint.send(3, Message::grant(1)).await,
            Err(SendError::UnknownPeer(3))
        ));

        mesh.disconnect(2).await;
        assert!(matches!(
            endpoint.send(2, Message::grant(1)).await,
            Err(SendError::Unreachable { node: 2, .. })
        ));

        mesh.reconnect(2).await;
        assert!(endpoint.send(2, Message::grant(1)).await.is_ok());
    }
}
