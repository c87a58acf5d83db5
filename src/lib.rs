//! Distributed mutual exclusion over point-to-point messages (Ricart–Agrawala).
//!
//! A node that wants the shared resource timestamps a request and sends it to every peer. It
//! enters once every peer granted it. A peer grants at once unless it holds the resource, or
//! wants it with an earlier `(timestamp, node id)`; in that case the request waits in the peer's
//! deferred queue until the peer is done.

pub mod arbiter;
pub mod clock;
pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod messenger;
pub mod node;
pub mod resource;
pub mod schedule;
pub mod server;
pub mod transport;

/// Identity of a node, in `1..=N`.
pub type NodeId = u32;

pub use arbiter::{Arbiter, Decision, RequestRecord, State};
pub use clock::{Clock, Priority, Timestamp};
pub use config::{AddressBook, Config};
pub use error::{NodeError, SendError};
pub use message::Message;
pub use messenger::Messenger;
pub use node::Node;
pub use resource::{AppendLine, ResourceAction};
pub use schedule::{Pacer, Schedule};
pub use server::Server;
pub use transport::{LocalMesh, MeshEndpoint, Transport};
