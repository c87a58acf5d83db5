use crate::{
    config::Config,
    error::NodeError,
    log,
    messenger::{listen, Messenger},
    node::Node,
    resource::AppendLine,
    schedule::Pacer,
};
use color_print::cformat;
use std::sync::Arc;
use tokio::{net::TcpListener, time::sleep};

/// A node running over TCP: the listener, plus the loop requesting the resource.
pub struct Server {
    pub config: Config,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, NodeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn bind(&self) -> Result<TcpListener, NodeError> {
        let port = self.config.own_port();
        TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| NodeError::Bind { port, source })
    }

    /// Runs `cycles` request cycles, or forever when `None`, then keeps answering peers: they
    /// still need this node's grants after it stopped asking for the resource.
    pub async fn run(&self, cycles: Option<u64>) -> Result<(), NodeError> {
        let listener = self.bind().await?;
        let node = Arc::new(Node::from_config(&self.config, Messenger::new(&self.config)));

        log::info(&cformat!(
            "Node <bold>{}</bold> of <bold>{}</bold> listening on port <bold>{}</bold>.",
            self.config.node_id,
            self.config.nodes,
            self.config.own_port()
        ));
        let listener_thread = tokio::spawn(listen(listener, Arc::clone(&node)));

        // give every peer time to open its listener
        sleep(self.config.warmup).await;

        let action = AppendLine::new(&self.config.resource_path, self.config.hold);
        let mut pacer = Pacer::new(self.config.schedule);
        node.request_loop(&action, &mut pacer, cycles).await;

        if listener_thread.await.is_err() {
            log::error("Listener thread failed.");
        }
        Ok(())
    }
}
