//! TCP delivery: one connection per message, one JSON line per connection.

use crate::{
    config::{port_for, AddressBook, Config},
    error::SendError,
    log,
    message::Message,
    node::Node,
    transport::Transport,
    NodeId,
};
use color_print::cformat;
use futures::{SinkExt, StreamExt};
use std::{error::Error, io, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    time::sleep,
};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

/// Longest line accepted from a peer; real messages are well below it.
pub const MAX_LINE: usize = 1024;

#[derive(Debug, Clone)]
pub struct Messenger {
    pub peers: AddressBook,
    pub base_port: u16,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Messenger {
    pub fn new(config: &Config) -> Self {
        Self {
            peers: config.peers.clone(),
            base_port: config.base_port,
            attempts: config.send_attempts,
            backoff: config.send_backoff,
        }
    }

    pub fn address_of(&self, node: NodeId) -> String {
        format!("{}:{}", self.peers.resolve(node), port_for(self.base_port, node))
    }
}

/// Errors worth another attempt: the peer isn't listening yet or dropped the connection.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::BrokenPipe
    )
}

fn into_io(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::other(other),
    }
}

async fn deliver(address: &str, line: String) -> io::Result<()> {
    let stream = TcpStream::connect(address).await?;
    let mut lines = Framed::new(stream, LinesCodec::new());
    lines.send(line).await.map_err(into_io)?;
    SinkExt::<String>::close(&mut lines).await.map_err(into_io)
}

impl Transport for Messenger {
    async fn send(&self, to: NodeId, message: Message) -> Result<(), SendError> {
        let line = message
            .to_json_string()
            .map_err(|e| SendError::Codec(e.to_string()))?;
        let address = self.address_of(to);

        for attempt in 1..=self.attempts {
            match deliver(&address, line.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if is_transient(&e) => {
                    log::warn(&cformat!(
                        "Failed to reach node <bold>{to}</bold> at {address} ({e}), \
                         attempt {attempt}/{}.",
                        self.attempts
                    ));
                    if attempt < self.attempts {
                        sleep(self.backoff).await;
                    }
                }
                Err(e) => return Err(SendError::Io(e)),
            }
        }

        Err(SendError::Unreachable {
            node: to,
            attempts: self.attempts,
        })
    }
}

/// Reads every line of one connection and hands the decoded messages to the node. Lines that
/// don't decode are logged and skipped.
pub async fn handle_connection<T: Transport>(
    stream: TcpStream,
    node: Arc<Node<T>>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE));

    while let Some(line) = lines.next().await {
        let line = line?;
        match Message::from_json_string(&line) {
            Ok(message) => node.handle(message).await,
            Err(e) => log::warn(&cformat!(
                "<bold>[node {}]</bold> Dropping malformed message {line:?}: {e}",
                node.id
            )),
        }
    }
    Ok(())
}

/// Accepts connections forever, one task per connection.
pub async fn listen<T: Transport>(listener: TcpListener, node: Arc<Node<T>>) {
    loop {
        let (stream, address) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error(&format!("Couldn't accept a connection: {e}"));
                continue;
            }
        };
        log::debug(&format!("Accepted a connection from {address}."));

        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, node).await {
                log::error(&format!("Connection from {address} failed: {e}"));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arbiter::State, transport::LocalMesh};
    use tokio::io::AsyncWriteExt;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn messenger(base_port: u16) -> Messenger {
        Messenger {
            peers: AddressBook::single_host("127.0.0.1"),
            base_port,
            attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn delivers_one_line_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_port = listener.local_addr().unwrap().port();

        let reader = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = Framed::new(stream, LinesCodec::new());
            let line = lines.next().await.unwrap().unwrap();
            assert!(lines.next().await.is_none());
            line
        });

        messenger(base_port).send(1, Message::grant(2)).await.unwrap();
        let line = reader.await.unwrap();
        assert_eq!(Message::from_json_string(&line).unwrap(), Message::grant(2));
    }

    #[tokio::test]
    async fn gives_up_after_the_last_attempt() {
        let base_port = free_port();
        let started = std::time::Instant::now();
        let result = messenger(base_port).send(1, Message::grant(2)).await;

        assert!(matches!(
            result,
            Err(SendError::Unreachable {
                node: 1,
                attempts: 3
            })
        ));
        // Two pauses between three attempts.
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn malformed_lines_leave_the_node_untouched() {
        let mesh = LocalMesh::new();
        let mut peer_inbox = mesh.register(2).await;
        let node = Arc::new(Node::new(1, 2, mesh.endpoint()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(listen(listener, Arc::clone(&node)));

        for garbage in [
            "REQUEST,2,100.5\n",
            "{\"Grant\":{\"sender\":2,\"extra\":true}}\n",
            "{\"Request\":{\"sender\":\"two\",\"timestamp\":1}}\n",
            "not json at all\n",
        ] {
            let mut stream = TcpStream::connect(address).await.unwrap();
            stream.write_all(garbage.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }

        // A well-formed request afterwards still goes through the same listener.
        messenger(address.port())
            .send(1, Message::request(2, crate::clock::Timestamp(7)))
            .await
            .unwrap();
        assert_eq!(peer_inbox.recv().await, Some(Message::grant(1)));

        let snapshot = node.snapshot().await;
        assert_eq!(snapshot.state(), State::Idle);
        assert_eq!(snapshot.received_grants(), 0);
        assert_eq!(snapshot.deferred().count(), 0);
    }
}
