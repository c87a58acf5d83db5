use crate::{
    arbiter::{Arbiter, Decision, State},
    clock::Clock,
    config::Config,
    error::NodeError,
    log,
    message::Message,
    resource::{run_critical_section, ResourceAction},
    schedule::Pacer,
    transport::Transport,
    NodeId,
};
use color_print::cformat;
use futures::future::join_all;
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc::UnboundedReceiver, Mutex, Notify},
    task::JoinHandle,
    time::{sleep, timeout, Instant},
};

/// One member of the cluster.
///
/// Inbound messages may be handled by any number of tasks at once; acquiring and releasing the
/// resource is driven by a single task (see [`Node::request_loop`]).
pub struct Node<T: Transport> {
    pub id: NodeId,
    pub nodes: u32,
    arbiter: Mutex<Arbiter>,
    /// Only read or advanced while `arbiter` is locked.
    clock: Clock,
    grant_notify: Notify,
    transport: T,
    acquire_timeout: Option<Duration>,
}

impl<T: Transport> Node<T> {
    pub fn new(id: NodeId, nodes: u32, transport: T) -> Self {
        Self {
            id,
            nodes,
            arbiter: Mutex::new(Arbiter::new(id, nodes)),
            clock: Clock::new(),
            grant_notify: Notify::new(),
            transport,
            acquire_timeout: None,
        }
    }

    pub fn from_config(config: &Config, transport: T) -> Self {
        Self::new(config.node_id, config.nodes, transport)
            .with_acquire_timeout(config.acquire_timeout)
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Option<Duration>) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// A copy of the protocol state, taken under the lock.
    pub async fn snapshot(&self) -> Arbiter {
        self.arbiter.lock().await.clone()
    }

    fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (1..=self.nodes).filter(move |peer| *peer != self.id)
    }

    fn tag(&self) -> String {
        cformat!("<bold>[node {}]</bold>", self.id)
    }

    /// Applies one message received from a peer.
    pub async fn handle(&self, message: Message) {
        let sender = message.sender();
        if sender == self.id || !(1..=self.nodes).contains(&sender) {
            log::warn(&cformat!(
                "{} Dropping message from unknown node <bold>{sender}</bold>.",
                self.tag()
            ));
            return;
        }

        match message {
            Message::Request { sender, timestamp } => {
                let decision = {
                    let mut arbiter = self.arbiter.lock().await;
                    self.clock.observe(timestamp);
                    let decision = arbiter.on_request(sender, timestamp);
                    if decision == Decision::Defer {
                        log::info(&cformat!(
                            "{} <red>Deferring</red> node <bold>{sender}</bold> ({timestamp}), \
                             queue: {:?}",
                            self.tag(),
                            arbiter.deferred().map(|r| r.requester).collect::<Vec<_>>()
                        ));
                    }
                    decision
                };

                if decision == Decision::Grant {
                    log::debug(&format!("{} Granting node {sender} ({timestamp}).", self.tag()));
                    self.send_logged(sender, Message::grant(self.id)).await;
                }
            }
            Message::Grant { sender } => {
                let received = {
                    let mut arbiter = self.arbiter.lock().await;
                    arbiter.on_grant(sender);
                    arbiter.received_grants()
                };
                self.grant_notify.notify_one();
                log::debug(&format!(
                    "{} Grant from node {sender} ({received} received).",
                    self.tag()
                ));
            }
        }
    }

    /// Feeds every message of an inbox to [`Node::handle`], one task per message.
    pub fn serve(self: &Arc<Self>, mut inbox: UnboundedReceiver<Message>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                let node = Arc::clone(&node);
                tokio::spawn(async move { node.handle(message).await });
            }
        })
    }

    async fn send_logged(&self, to: NodeId, message: Message) {
        if let Err(e) = self.transport.send(to, message).await {
            log::error(&cformat!("{} Couldn't reach node <bold>{to}</bold>: {e}", self.tag()));
        }
    }

    /// Asks every peer for permission and waits until all of them granted it. On success the node
    /// is holding the resource and must call [`Node::release`].
    pub async fn acquire(&self) -> Result<(), NodeError> {
        let timestamp = {
            let mut arbiter = self.arbiter.lock().await;
            if arbiter.state() != State::Idle {
                return Err(NodeError::NotIdle(arbiter.state()));
            }
            let timestamp = self.clock.now();
            arbiter.begin_request(timestamp);
            timestamp
        };
        log::info(&cformat!(
            "{} <yellow>Requesting</yellow> the resource at <bold>{timestamp}</bold>.",
            self.tag()
        ));

        let request = Message::request(self.id, timestamp);
        let broadcast = self
            .peers()
            .map(|peer| self.send_logged(peer, request.clone()))
            .collect::<Vec<_>>();
        join_all(broadcast).await;

        let Some(limit) = self.acquire_timeout else {
            self.wait_for_grants().await;
            return Ok(());
        };

        let started = Instant::now();
        match timeout(limit, self.wait_for_grants()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                // Withdraw the request so the peers it deferred aren't kept waiting.
                let (received, needed, waiters) = {
                    let mut arbiter = self.arbiter.lock().await;
                    let waiters = if arbiter.state() == State::Wanting {
                        arbiter.release()
                    } else {
                        Vec::new()
                    };
                    (arbiter.received_grants(), arbiter.needed_grants(), waiters)
                };
                log::warn(&cformat!(
                    "{} <red>Gave up</red> after {:?} with {received}/{needed} grants.",
                    self.tag(),
                    limit
                ));
                self.grant_all(waiters).await;
                Err(NodeError::AcquireTimeout {
                    waited: started.elapsed(),
                    received,
                    needed,
                })
            }
        }
    }

    async fn wait_for_grants(&self) {
        loop {
            if self.arbiter.lock().await.try_enter() {
                return;
            }
            self.grant_notify.notified().await;
        }
    }

    /// Leaves the resource and answers every deferred request, oldest first.
    pub async fn release(&self) {
        let waiters = self.arbiter.lock().await.release();
        log::info(&cformat!(
            "{} <green>Released</green> the resource, granting {:?}.",
            self.tag(),
            waiters
        ));
        self.grant_all(waiters).await;
    }

    async fn grant_all(&self, waiters: Vec<NodeId>) {
        for waiter in waiters {
            self.send_logged(waiter, Message::grant(self.id)).await;
        }
    }

    /// acquire -> use the resource -> release. The resource is released even when the action
    /// fails; the failure is returned afterwards.
    pub async fn run_cycle<A: ResourceAction>(&self, action: &A) -> Result<(), NodeError> {
        self.acquire().await?;
        log::success(&cformat!("{} <green>Holding</green> the resource.", self.tag()));
        let outcome = run_critical_section(action, self.id).await;
        self.release().await;
        outcome
    }

    /// Pauses, then runs a cycle, forever or `cycles` times. Failed cycles are logged and the loop
    /// carries on.
    pub async fn request_loop<A: ResourceAction, R: Rng + ?Sized>(
        &self,
        action: &A,
        pacer: &mut Pacer<R>,
        cycles: Option<u64>,
    ) {
        let mut completed = 0;
        while cycles.map_or(true, |cycles| completed < cycles) {
            sleep(pacer.next_pause()).await;
            if let Err(e) = self.run_cycle(action).await {
                log::error(&cformat!("{} Cycle failed: {e}", self.tag()));
            }
            completed += 1;
        }
    }
}
